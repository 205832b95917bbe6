//! Binary entry point for the proxy.
//!
//! Argument parsing, YAML config generation, and MIDI port listing are
//! deliberately out of scope for this crate (see the module docs on
//! [`config`] and [`supervisor`]) — they are external collaborators that
//! would merely construct a [`config::Config`] and feed it to
//! [`supervisor::ProxySupervisor`]. This `main` does only that: resolve a
//! config path, load and validate it, start the supervisor, and block until
//! a shutdown signal arrives.

mod config;
mod error;
mod fx_map;
mod midi_io;
mod osc_codec;
mod remap_core;
mod supervisor;
mod throttler;

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use config::Config;
use supervisor::ProxySupervisor;

/// Mirrors the original `get_config_path()`: `~/.oscremap.yaml` unless
/// overridden by the first command-line argument.
fn config_path() -> PathBuf {
    if let Some(arg) = std::env::args().nth(1) {
        return PathBuf::from(arg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".oscremap.yaml");
    }
    PathBuf::from(".oscremap.yaml")
}

fn init_logging() {
    let mut builder = env_logger::Builder::from_default_env();
    builder.format_timestamp_millis();
    if std::env::var("RUST_LOG").is_err() {
        builder
            .filter_module(module_path!(), log::LevelFilter::Info)
            .filter_level(log::LevelFilter::Warn);
    }
    builder.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("=================================================");
    info!("oscremap-proxy starting up");
    info!("=================================================");

    let path = config_path();
    info!("loading configuration from {}", path.display());
    let config = Config::from_file(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    let supervisor = ProxySupervisor::start(config)
        .await
        .context("failed to start proxy")?;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for ctrl-c: {e}");
            return;
        }
        info!("ctrl-c received, shutting down");
        let _ = shutdown_tx.send(());
    });

    supervisor
        .run_until_shutdown(shutdown_rx)
        .await
        .context("proxy shutdown with an error")?;

    info!("oscremap-proxy stopped");
    Ok(())
}
