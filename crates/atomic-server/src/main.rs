//! `atomicserver` entry point.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Parse the command line
//! 3. Load configuration from `atomic-config.yaml` (defaults if missing)
//! 4. Resolve the bind address
//! 5. Connect stores, start the harness and serve until shutdown

use atomic_server::cli::Cli;
use atomic_server::config::AppConfig;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, a store cannot be
/// reached, or the server fails to bind.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        AppConfig::from_file(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
        let mut config = AppConfig::default();
        config.apply_env_overrides()?;
        config
    };
    config.validate()?;

    let addr = cli.bind_addr(&config)?;
    info!(
        %addr,
        atomic_enabled = config.atomic.enabled,
        databases = config.databases.len(),
        "Configuration loaded"
    );

    atomic_server::run(&config, addr).await?;

    info!("atomicserver shutdown complete");
    Ok(())
}
