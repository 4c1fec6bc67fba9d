//! Command-line entry point shared by the `pvbridged` binaries.
//!
//! # Usage
//!
//! ```bash
//! # Start the bridge on the default address (127.0.0.1:8080)
//! pvbridged start
//!
//! # Listen elsewhere
//! pvbridged start --bind 0.0.0.0:9000
//! PVBRIDGE_BIND=0.0.0.0:9000 pvbridged
//!
//! # Enable debug logging
//! RUST_LOG=pvbridged=debug pvbridged start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::BridgeConfig;
use crate::provider::LocalProvider;
use crate::server::BridgeServer;

/// pvbridged - WebSocket bridge for process variables
#[derive(Parser, Debug)]
#[command(name = "pvbridged", version, about)]
pub struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the bridge in the foreground
    Start(StartArgs),
}

#[derive(ClapArgs, Debug, Default)]
struct StartArgs {
    /// Listen address (overrides PVBRIDGE_BIND)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

impl Args {
    /// Resolves the configuration: defaults, then environment, then flags.
    pub fn config(&self) -> BridgeConfig {
        let config = BridgeConfig::from_env();
        match &self.command {
            Some(Command::Start(StartArgs { bind: Some(bind) })) => config.with_bind(bind.clone()),
            _ => config,
        }
    }
}

/// Parses arguments and runs the bridge until a shutdown signal.
pub fn main() -> Result<()> {
    let args = Args::parse();
    run(args.config())
}

/// Runs the bridge (async entry point).
#[tokio::main]
async fn run(config: BridgeConfig) -> Result<()> {
    let directives = env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "pvbridged starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let provider = Arc::new(LocalProvider::new());
    let server = BridgeServer::bind(config, provider, cancel_token)
        .await
        .context("Failed to start bridge server")?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("pvbridged stopped");
    Ok(())
}

/// Log filter used when `RUST_LOG` is unset or unparsable.
const DEFAULT_LOG_DIRECTIVES: &str = "pvbridged=info,pvbridge_core=info,pvbridge_protocol=info";

/// Builds the log filter from `RUST_LOG` directives, which replace the
/// defaults entirely when given.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_DIRECTIVES))
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
