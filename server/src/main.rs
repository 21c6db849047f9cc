//! `VoiceChat` Server - Main Entry Point
//!
//! Loads the persisted channel topology and keeps it available until
//! shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use vc_server::config::Config;
use vc_server::store::JsonFileStore;
use vc_server::topology::TopologyService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vc_server=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting VoiceChat Server"
    );

    let store = JsonFileStore::open(&config.store_path).with_context(|| {
        format!(
            "Failed to open channel store at {}",
            config.store_path.display()
        )
    })?;
    let topology = Arc::new(
        TopologyService::load(config.topology, Arc::new(store))
            .context("Failed to load channel topology")?,
    );

    info!(
        path = %config.store_path.display(),
        channels = topology.channel_count(),
        nesting_limit = config.topology.nesting_limit,
        channel_limit = config.topology.channel_count_limit,
        "Channel topology ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    Ok(())
}
