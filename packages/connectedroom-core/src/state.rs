//! Configuration types for a ConnectedRoom config entry.
//!
//! [`Config`] groups everything one coordinator needs: backend endpoints,
//! reconnect tuning, sequencer delays and the entry options chosen by the
//! user (which lights, speakers and horn players to drive).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::ColorRole;

/// Backend endpoints and Pusher application key.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the REST API (login, channel auth, integration endpoints).
    pub api_url: String,

    /// Host serving the Pusher WebSocket endpoint.
    pub ws_host: String,

    /// Pusher application key.
    pub app_key: String,

    /// Use `wss://` (true) or plain `ws://` (false).
    pub tls: bool,
}

impl ServerConfig {
    /// Builds the Pusher WebSocket URL for this server.
    pub fn websocket_url(&self) -> String {
        use crate::protocol_constants::{PUSHER_CLIENT_NAME, PUSHER_PROTOCOL_VERSION};

        let scheme = if self.tls { "wss" } else { "ws" };
        format!(
            "{}://{}/app/{}?protocol={}&client={}&version={}",
            scheme,
            self.ws_host.trim_end_matches('/'),
            self.app_key,
            PUSHER_PROTOCOL_VERSION,
            PUSHER_CLIENT_NAME,
            crate::protocol_constants::INTEGRATION_VERSION
        )
    }

    /// Joins a path onto the API base URL.
    pub fn api_endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.connectedroom.io".to_string(),
            ws_host: "ha.connectedroom.io".to_string(),
            app_key: "connectedroom".to_string(),
            tls: true,
        }
    }
}

/// Reconnect backoff tuning for the event stream.
///
/// The delay for attempt `n` is `base + n * step + jitter`, capped at `max`.
/// Codes in the "reconnect immediately" band skip the backoff and wait
/// `immediate_delay_ms` instead.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub step_ms: u64,
    /// Upper bound of the uniformly random jitter added to each delay.
    pub jitter_ms: u64,
    pub max_delay_ms: u64,
    pub immediate_delay_ms: u64,
}

impl ReconnectConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay_ms == 0 {
            return Err("base_delay_ms must be > 0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("max_delay_ms must be >= base_delay_ms".to_string());
        }
        Ok(())
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5_000,
            step_ms: 5_000,
            jitter_ms: 1_000,
            max_delay_ms: 300_000,
            immediate_delay_ms: 1_000,
        }
    }
}

/// Delays used by the horn/TTS sequencer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SequencerConfig {
    /// How long a deferred narration waits for its `goal_horn` event.
    pub grace_delay_ms: u64,

    /// Pause between the horn going idle and the narration starting.
    pub settle_delay_ms: u64,

    /// Hard stop for horns whose cue carries no `maxDuration`.
    pub max_horn_ms: u64,
}

impl SequencerConfig {
    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn max_horn_duration(&self) -> Duration {
        Duration::from_millis(self.max_horn_ms)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_horn_ms == 0 {
            return Err("max_horn_ms must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            grace_delay_ms: 3_000,
            settle_delay_ms: 1_000,
            max_horn_ms: 60_000,
        }
    }
}

/// User-selected options of a config entry.
///
/// Light groups hold device ids; TTS and horn targets hold media player
/// entity ids.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EntryOptions {
    /// Config entry id reported in bus events and used to list devices.
    pub entry_id: String,

    pub primary_lights: Vec<String>,
    pub secondary_lights: Vec<String>,
    pub alternate_lights: Vec<String>,

    /// Media players that speak narrations.
    pub tts_devices: Vec<String>,
    /// TTS engine entity used with `tts.speak`.
    pub tts_provider: Option<String>,
    /// Legacy `tts.<service>` name; takes precedence over `tts_provider`.
    pub tts_service: Option<String>,

    /// Media players that play the goal horn.
    pub goal_horn_devices: Vec<String>,

    /// Local entities exposed to remote control commands.
    pub command_entities: Vec<String>,
}

impl EntryOptions {
    /// Returns the light devices configured for a team color role.
    pub fn lights_for(&self, role: ColorRole) -> &[String] {
        match role {
            ColorRole::Primary => &self.primary_lights,
            ColorRole::Secondary => &self.secondary_lights,
            ColorRole::Alternate => &self.alternate_lights,
        }
    }

    /// Returns true if at least one horn player is configured.
    #[must_use]
    pub fn has_horn_devices(&self) -> bool {
        !self.goal_horn_devices.is_empty()
    }
}

/// Configuration for one ConnectedRoom coordinator.
///
/// All fields have sensible defaults except `home_assistant_id`, which
/// identifies the local installation to the backend.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Stable id of the local Home Assistant installation.
    pub home_assistant_id: String,

    pub server: ServerConfig,
    pub reconnect: ReconnectConfig,
    pub sequencer: SequencerConfig,
    pub options: EntryOptions,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.home_assistant_id.is_empty() {
            return Err("home_assistant_id must be set".to_string());
        }
        if self.server.api_url.is_empty() || self.server.ws_host.is_empty() {
            return Err("server.api_url and server.ws_host must be set".to_string());
        }
        self.reconnect.validate()?;
        self.sequencer.validate()
    }
}
