//! Ephemeral port allocation backed by a persisted JSON registry
//!
//! The state document maps worker full ids to their assigned ports and is
//! read and rewritten wholesale on every allocation. There is no locking;
//! provisioning is assumed to happen from a single process instance.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest port the allocator will hand out.
pub const PORT_MIN: u16 = 128;

/// Highest port the allocator will hand out.
pub const PORT_MAX: u16 = 32767;

/// Port allocation errors
#[derive(Error, Debug)]
pub enum PortError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no free ports in 128..=32767")]
    Exhausted,
}

pub type PortResult<T> = Result<T, PortError>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PortState {
    #[serde(rename = "usedPorts", default)]
    used_ports: HashMap<String, u16>,

    /// Fields other tools keep in the state document survive rewrites.
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Assigns each new worker a port that no live or persisted worker holds.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    state_path: PathBuf,
}

impl PortAllocator {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Draw a port uniformly from the allowed range, rejecting any value
    /// already present in the persisted map, record it under `full_id` and
    /// rewrite the state document.
    pub fn allocate(&self, full_id: &str) -> PortResult<u16> {
        let mut state = self.load()?;

        let used: HashSet<u16> = state.used_ports.values().copied().collect();
        let range = usize::from(PORT_MAX - PORT_MIN) + 1;
        if used.len() >= range {
            return Err(PortError::Exhausted);
        }

        let mut rng = rand::thread_rng();
        let port = loop {
            let candidate = rng.gen_range(PORT_MIN..=PORT_MAX);
            if !used.contains(&candidate) {
                break candidate;
            }
        };

        state.used_ports.insert(full_id.to_string(), port);
        self.store(&state)?;
        Ok(port)
    }

    /// Drop the entry for a stopped worker, making its port reusable.
    /// Returns the released port if one was recorded.
    pub fn release(&self, full_id: &str) -> PortResult<Option<u16>> {
        let mut state = self.load()?;
        let released = state.used_ports.remove(full_id);
        if released.is_some() {
            self.store(&state)?;
        }
        Ok(released)
    }

    /// The persisted full-id to port map.
    pub fn used_ports(&self) -> PortResult<HashMap<String, u16>> {
        Ok(self.load()?.used_ports)
    }

    fn load(&self) -> PortResult<PortState> {
        if !self.state_path.exists() {
            return Ok(PortState::default());
        }
        let contents = std::fs::read_to_string(&self.state_path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn store(&self, state: &PortState) -> PortResult<()> {
        if let Some(parent) = self.state_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.state_path, serde_json::to_string_pretty(state)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn allocator(dir: &TempDir) -> PortAllocator {
        PortAllocator::new(dir.path().join("running.json"))
    }

    #[test]
    fn test_allocations_are_distinct_and_in_range() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator(&dir);

        let mut seen = HashSet::new();
        for i in 0..1000 {
            let port = allocator.allocate(&format!("S{:04}", i)).unwrap();
            assert!((PORT_MIN..=PORT_MAX).contains(&port));
            assert!(seen.insert(port), "port {} handed out twice", port);
        }
        assert_eq!(allocator.used_ports().unwrap().len(), 1000);
    }

    #[test]
    fn test_state_survives_reload() {
        let dir = TempDir::new().unwrap();
        let first = allocator(&dir);
        let port = first.allocate("Sabcd").unwrap();

        // A fresh allocator over the same file sees the earlier entry.
        let second = allocator(&dir);
        let used = second.used_ports().unwrap();
        assert_eq!(used.get("Sabcd"), Some(&port));
    }

    #[test]
    fn test_release_frees_entry() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator(&dir);
        let port = allocator.allocate("Sabcd").unwrap();

        assert_eq!(allocator.release("Sabcd").unwrap(), Some(port));
        assert!(allocator.used_ports().unwrap().is_empty());
        assert_eq!(allocator.release("Sabcd").unwrap(), None);
    }

    #[test]
    fn test_unknown_fields_survive_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("running.json");
        std::fs::write(&path, r#"{"usedPorts": {}, "session": "ops-7"}"#).unwrap();

        let allocator = PortAllocator::new(&path);
        allocator.allocate("Sabcd").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["session"], "ops-7");
        assert!(raw["usedPorts"]["Sabcd"].is_u64());
    }
}
