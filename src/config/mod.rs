//! Configuration module
//!
//! Handles loading and saving the coordinator configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::protocol::DEFAULT_PORT;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listener settings
    #[serde(default)]
    pub listen: ListenConfig,

    /// Filesystem layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Fleet defaults
    #[serde(default)]
    pub fleet: FleetConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Filesystem layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Persisted port-registry document
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Directory holding server templates
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    /// Directory holding materialized instances
    #[serde(default = "default_running_dir")]
    pub running_dir: PathBuf,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("running.json")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_running_dir() -> PathBuf {
    PathBuf::from("running")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            templates_dir: default_templates_dir(),
            running_dir: default_running_dir(),
        }
    }
}

/// Fleet defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Default player capacity for new workers
    #[serde(default = "default_max_players")]
    pub default_max_players: u16,
    /// Command line that starts a worker instance
    #[serde(default = "default_worker_command")]
    pub worker_command: String,
    /// Command line that starts the proxy
    #[serde(default = "default_proxy_command")]
    pub proxy_command: String,
    /// Directory the proxy runs in
    #[serde(default = "default_proxy_dir")]
    pub proxy_dir: PathBuf,
}

fn default_max_players() -> u16 {
    20
}

fn default_worker_command() -> String {
    "./start.sh".to_string()
}

fn default_proxy_command() -> String {
    "./start.sh".to_string()
}

fn default_proxy_dir() -> PathBuf {
    PathBuf::from("proxy")
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            default_max_players: default_max_players(),
            worker_command: default_worker_command(),
            proxy_command: default_proxy_command(),
            proxy_dir: default_proxy_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("fleetnet/config.toml")),
            Some(PathBuf::from("./fleetnet.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> String {
    let config = Config {
        listen: ListenConfig {
            bind_address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        },
        fleet: FleetConfig {
            worker_command: "java -Xmx512M -jar server.jar nogui".to_string(),
            proxy_command: "java -Xmx256M -jar proxy.jar".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    toml::to_string_pretty(&config).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen.port, DEFAULT_PORT);
        assert_eq!(config.listen.bind_address, "127.0.0.1");
        assert_eq!(config.paths.state_file, PathBuf::from("running.json"));
        assert_eq!(config.fleet.default_max_players, 20);
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.listen.port = 1127;
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.listen.port, 1127);
        assert_eq!(loaded.paths.running_dir, config.paths.running_dir);
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert!(parsed.fleet.worker_command.contains("server.jar"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("[listen]\nport = 9000\n").unwrap();
        assert_eq!(parsed.listen.port, 9000);
        assert_eq!(parsed.listen.bind_address, "127.0.0.1");
        assert_eq!(parsed.fleet.default_max_players, 20);
    }
}
