use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use iot_node::{Config, NodeDaemon, StorageDaemon};

/// IoT Node - Policy-governed data node for simulated devices
#[derive(Parser)]
#[command(name = "iot-node", version, about)]
struct Cli {
    /// Path to the config file (default: ~/.config/iot-node/config.toml)
    #[arg(short, long, env = "IOT_NODE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the data node (entitlements, devices, routing pipeline)
    Node,
    /// Run the time-series storage service
    Storage,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,iot_node=info",
        1 => "info,iot_node=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref());
    tracing::debug!(?config, "loaded configuration");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                return;
            }
            tracing::info!("received shutdown signal");
            shutdown.cancel();
        }
    });

    match cli.command {
        Command::Node => {
            tracing::info!(bind = %config.node.bind, "starting data node");
            NodeDaemon::new(config.node)?.run(shutdown).await?;
        }
        Command::Storage => {
            tracing::info!(bind = %config.storage.bind, "starting storage service");
            StorageDaemon::new(config.storage)?.run(shutdown).await?;
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}
