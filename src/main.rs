//! Fleetnet - control plane for an ephemeral game-server fleet
//!
//! Runs the coordinator that workers and the routing proxy talk to over a
//! compact binary protocol, and provisions new worker instances on disk.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fleetnet::config::{self, Config};
use fleetnet::dispatch::{self, Dispatcher};
use fleetnet::fleet::{Registry, Worker, WorkerOptions};
use fleetnet::materialize::DirMaterializer;
use fleetnet::notify::LogNotifier;
use fleetnet::ports::PortAllocator;
use fleetnet::protocol::RamClass;

/// Fleetnet - game-server fleet coordinator
#[derive(Parser)]
#[command(name = "fleetnet")]
#[command(author = "Fleetnet Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Coordinate a fleet of ephemeral game servers", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind to
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Provision a new worker instance on disk
    Provision {
        /// Template to materialize
        #[arg(short, long, default_value = "standard-1.8.8")]
        template: String,

        /// RAM class (tiny/small/medium/big/gigantic, prefixes accepted)
        #[arg(short, long, default_value = "small")]
        ram: String,

        /// Worker id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Display name (generated when omitted)
        #[arg(short, long)]
        name: Option<String>,

        /// Server type tag
        #[arg(long, default_value = "verify")]
        server_type: String,

        /// Start the worker process after provisioning
        #[arg(long)]
        start: bool,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    match cli.command {
        Commands::Serve { port, bind } => {
            run_serve(config, port, bind).await?;
        }
        Commands::Provision {
            template,
            ram,
            id,
            name,
            server_type,
            start,
        } => {
            run_provision(config, template, ram, id, name, server_type, start)?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config();
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Run the coordinator listener
async fn run_serve(
    config: Config,
    port: Option<u16>,
    bind: Option<String>,
) -> anyhow::Result<()> {
    let bind = bind.unwrap_or(config.listen.bind_address.clone());
    let port = port.unwrap_or(config.listen.port);
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;

    let dispatcher = Dispatcher::new(
        Registry::new(),
        PortAllocator::new(&config.paths.state_file),
        Arc::new(LogNotifier),
    );

    tracing::info!("starting fleet coordinator on {}", addr);

    tokio::select! {
        result = dispatch::run(dispatcher, addr) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}

/// Provision a worker instance on disk
fn run_provision(
    config: Config,
    template: String,
    ram: String,
    id: Option<String>,
    name: Option<String>,
    server_type: String,
    start: bool,
) -> anyhow::Result<()> {
    let ram = RamClass::from_name(&ram)
        .ok_or_else(|| anyhow::anyhow!("unknown RAM class: {}", ram))?;

    let allocator = PortAllocator::new(&config.paths.state_file);
    let materializer =
        DirMaterializer::new(&config.paths.templates_dir, &config.paths.running_dir);

    let mut worker = Worker::provision(
        &template,
        ram,
        WorkerOptions {
            id,
            name,
            server_type: Some(server_type),
            max_players: Some(config.fleet.default_max_players),
            ..Default::default()
        },
        &allocator,
        &materializer,
    )?;

    println!("Provisioned worker {}", worker.full_id());
    println!("  name:     {}", worker.name);
    println!("  template: {}", worker.version);
    println!("  type:     {}", worker.server_type);
    if let Some(port) = worker.port {
        println!("  port:     {}", port);
    }

    if start {
        worker.start_up(&config.fleet.worker_command, &config.paths.running_dir)?;
        println!("Worker process started ({})", worker.status);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["fleetnet", "serve", "--port", "1127"]);
        assert!(cli.is_ok());

        let cli = Cli::try_parse_from(["fleetnet", "provision", "--ram", "gigantic"]);
        assert!(cli.is_ok());
    }
}
