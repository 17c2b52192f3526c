//! ConnectedRoom Bridge - standalone headless bridge to Home Assistant.
//!
//! Logs in to ConnectedRoom, listens for live game events and drives the
//! configured Home Assistant lights, speakers and horn players through the
//! Home Assistant REST API. Designed to run as a background daemon next to
//! a Home Assistant instance.

mod config;
mod hass;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use connectedroom_core::host::LoggingEventBus;
use connectedroom_core::{
    ConnectedRoom, EntityRegistry, EventBus, Host, ServiceCaller, StateTracker,
};
use tokio::signal;

use crate::config::BridgeConfig;
use crate::hass::HassClient;

/// ConnectedRoom Bridge - live game events to Home Assistant.
#[derive(Parser, Debug)]
#[command(name = "connectedroom-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "CONNECTEDROOM_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// ConnectedRoom API key (overrides config file).
    #[arg(short = 'k', long, env = "CONNECTEDROOM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Home Assistant base URL (overrides config file).
    #[arg(long)]
    hass_url: Option<String>,

    /// Home Assistant long-lived access token (overrides config file).
    #[arg(long)]
    hass_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("ConnectedRoom Bridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        BridgeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(url) = args.hass_url {
        config.hass_url = url;
    }
    if let Some(token) = args.hass_token {
        config.hass_token = Some(token);
    }
    let api_key = args
        .api_key
        .or_else(|| config.api_key.clone())
        .context("No API key. Pass --api-key or set CONNECTEDROOM_API_KEY.")?;

    log::info!(
        "Configuration: hass_url={}, hass_timeout_ms={}, devices={}, forward_bus_events={}",
        config.hass_url,
        config.hass_timeout_ms,
        config.devices.len(),
        config.forward_bus_events
    );

    // Wire the Home Assistant adapter as the host
    let http = reqwest::Client::builder()
        .timeout(config.hass_timeout())
        .build()
        .context("Failed to create Home Assistant HTTP client")?;
    let hass = Arc::new(HassClient::new(
        http,
        &config.hass_url,
        config.hass_token.clone(),
        config.devices.clone(),
        Duration::from_millis(config.poll_interval_ms),
    ));
    let bus: Arc<dyn EventBus> = if config.forward_bus_events {
        Arc::clone(&hass) as Arc<dyn EventBus>
    } else {
        Arc::new(LoggingEventBus)
    };
    let host = Host {
        services: Arc::clone(&hass) as Arc<dyn ServiceCaller>,
        bus,
        tracker: Arc::clone(&hass) as Arc<dyn StateTracker>,
        registry: hass as Arc<dyn EntityRegistry>,
    };

    let room = ConnectedRoom::new(config.to_core_config(), host)
        .context("Failed to bootstrap ConnectedRoom")?;

    let session = room
        .connect(&api_key)
        .await
        .context("Failed to connect to ConnectedRoom")?;
    log::info!(
        "Listening for events (account {}, remote control: {})",
        session.unique_id,
        session.integration_key.is_some()
    );

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");
    room.stop().await;

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
