//! # dewpoint-daemon
//!
//! Runs the dewpoint polling engine against the system BlueZ adapter.
//!
//! The daemon loads its configuration, starts the engine, and runs until
//! SIGINT, then stops every worker and releases the adapter cleanly.
//!
//! ## Running
//!
//! ```bash
//! dewpoint-daemon [/etc/dewpoint/config.toml]
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use dewpoint_core::EngineConfig;

mod logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let production = std::env::var("DEWPOINT_ENV").is_ok_and(|value| value == "production");
    logging::init(production)?;

    let config_path = std::env::args()
        .nth(1)
        .map_or_else(EngineConfig::default_path, PathBuf::from);
    let config = EngineConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    info!(path = %config_path.display(), "configuration loaded");

    run(config).await
}

#[cfg(feature = "bluetooth")]
async fn run(config: EngineConfig) -> anyhow::Result<()> {
    use std::sync::Arc;

    use dewpoint_core::{BluezRadio, Engine, FileStore, LogSink};

    let store_path = config
        .store_path
        .clone()
        .unwrap_or_else(EngineConfig::default_store_path);
    let store = Arc::new(FileStore::new(store_path));

    let driver = BluezRadio::new()
        .await
        .context("opening the bluetooth adapter")?;

    let handle = Engine::new(config, Box::new(driver), store, Arc::new(LogSink)).start();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested");
    handle.shutdown().await;
    Ok(())
}

#[cfg(not(feature = "bluetooth"))]
async fn run(_config: EngineConfig) -> anyhow::Result<()> {
    anyhow::bail!("built without bluetooth support; rebuild with `--features bluetooth`")
}
