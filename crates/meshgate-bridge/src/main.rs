//! # meshgate
//!
//! Command-line entry point: loads the YAML config, opens the state
//! database and runs the local and remote broker sessions until SIGINT or
//! SIGTERM.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use meshgate_bridge::{Bridge, BridgeConfig};

#[derive(Debug, Parser)]
#[command(name = "meshgate", version, about = "Distance-filtered MQTT bridge for mesh radio traffic")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to the SQLite state database
    #[arg(short, long, default_value = "state.db")]
    state: PathBuf,

    /// Enable debug logging
    #[arg(short, long, env = "VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // -----------------------------------------------------------------------
    // 1. Initialize tracing (RUST_LOG overrides --verbose)
    // -----------------------------------------------------------------------
    let default_filter = if args.verbose {
        "info,meshgate_bridge=debug,meshgate_geo=debug,meshgate_store=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!("Starting meshgate v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let settings = BridgeConfig::load(&args.config)
        .and_then(BridgeConfig::validate)
        .with_context(|| format!("invalid configuration in {}", args.config.display()))?;
    info!(
        clients = settings.clients.len(),
        telemetry_channel = %settings.telemetry.channel_id,
        local = %settings.local.address,
        remote = %settings.remote.address,
        remote_subscriptions = settings.remote.subscriptions.len(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Start both sessions
    // -----------------------------------------------------------------------
    let bridge = Bridge::start(&settings, &args.state)
        .await
        .with_context(|| format!("failed to start with state {}", args.state.display()))?;

    // -----------------------------------------------------------------------
    // 4. Run until a shutdown signal arrives
    // -----------------------------------------------------------------------
    shutdown_signal().await;

    bridge.stop().await;
    bridge.wait().await?;
    info!("Shut down cleanly");

    Ok(())
}

/// Resolve on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
