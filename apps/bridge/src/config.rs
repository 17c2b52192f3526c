//! Bridge configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use connectedroom_core::{EntryOptions, ReconnectConfig, SequencerConfig, ServerConfig};
use serde::Deserialize;

/// Bridge configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Stable id of this Home Assistant installation, as registered with ConnectedRoom.
    /// Override: `CONNECTEDROOM_HOME_ASSISTANT_ID`
    pub home_assistant_id: String,

    /// ConnectedRoom API key.
    /// Override: `CONNECTEDROOM_API_KEY` (handled by clap in main.rs)
    pub api_key: Option<String>,

    /// Base URL of the Home Assistant instance.
    /// Override: `CONNECTEDROOM_HASS_URL`
    pub hass_url: String,

    /// Long-lived Home Assistant access token.
    /// Override: `CONNECTEDROOM_HASS_TOKEN`
    pub hass_token: Option<String>,

    /// Device ids that receive `connectedroom_event` bus events.
    pub devices: Vec<String>,

    /// Interval between state polls for tracked media players (ms).
    pub poll_interval_ms: u64,

    /// Timeout for each Home Assistant request (ms).
    /// Override: `CONNECTEDROOM_HASS_TIMEOUT_MS`
    pub hass_timeout_ms: u64,

    /// Fire bus events on Home Assistant (false: only log them).
    pub forward_bus_events: bool,

    pub server: ServerConfig,
    pub reconnect: ReconnectConfig,
    pub sequencer: SequencerConfig,
    pub options: EntryOptions,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            home_assistant_id: String::new(),
            api_key: None,
            hass_url: "http://homeassistant.local:8123".to_string(),
            hass_token: None,
            devices: Vec::new(),
            poll_interval_ms: 500,
            hass_timeout_ms: 10_000,
            forward_bus_events: true,
            server: ServerConfig::default(),
            reconnect: ReconnectConfig::default(),
            sequencer: SequencerConfig::default(),
            options: EntryOptions::default(),
        }
    }
}

impl BridgeConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CONNECTEDROOM_HOME_ASSISTANT_ID") {
            self.home_assistant_id = val;
        }

        if let Ok(val) = std::env::var("CONNECTEDROOM_HASS_URL") {
            self.hass_url = val;
        }

        if let Ok(val) = std::env::var("CONNECTEDROOM_HASS_TOKEN") {
            self.hass_token = Some(val);
        }

        if let Ok(val) = std::env::var("CONNECTEDROOM_API_URL") {
            self.server.api_url = val;
        }

        if let Ok(val) = std::env::var("CONNECTEDROOM_WS_HOST") {
            self.server.ws_host = val;
        }

        if let Ok(val) = std::env::var("CONNECTEDROOM_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                self.poll_interval_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("CONNECTEDROOM_HASS_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.hass_timeout_ms = ms;
            }
        }

        // Note: CONNECTEDROOM_API_KEY is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Timeout applied to the Home Assistant HTTP client.
    pub fn hass_timeout(&self) -> Duration {
        Duration::from_millis(self.hass_timeout_ms)
    }

    /// Converts to connectedroom-core's Config type.
    pub fn to_core_config(&self) -> connectedroom_core::Config {
        connectedroom_core::Config {
            home_assistant_id: self.home_assistant_id.clone(),
            server: self.server.clone(),
            reconnect: self.reconnect,
            sequencer: self.sequencer,
            options: self.options.clone(),
        }
    }
}
