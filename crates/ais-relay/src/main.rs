mod broadcast;
mod config;
mod controller;
mod stats;
mod upstream;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use config::RelayConfig;
use controller::ServiceController;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "ais-relay",
    version,
    about = "Subscribe to AIS vessel telemetry and relay it as NMEA-0183"
)]
struct Options {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "ais-relay.toml")]
    config: PathBuf,

    /// Override the tracing log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override network.stream.port from the config file, for local testing
    #[arg(long)]
    stream_port: Option<u16>,

    /// Override network.datagram.port from the config file, for local testing
    #[arg(long)]
    datagram_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&options.log_level)),
        )
        .init();

    let mut relay_config = RelayConfig::load(&options.config)
        .with_context(|| format!("failed to load configuration from {}", options.config.display()))?;

    if let Some(port) = options.stream_port {
        relay_config.network.stream.port = port;
    }
    if let Some(port) = options.datagram_port {
        relay_config.network.datagram.port = port;
    }

    info!(path = %options.config.display(), "configuration loaded");

    let mut controller = ServiceController::build(relay_config).await?;
    controller.run().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    controller.shutdown().await;

    Ok(())
}
