//! Pusher protocol 7 frames and error classification.
//!
//! Every frame is a JSON object `{event, channel?, data?}`. The server
//! encodes `data` as a JSON string; clients may send it as an object.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::protocol_constants::{
    DEFAULT_ACTIVITY_TIMEOUT_SECS, EVENT_PING, EVENT_PONG, EVENT_SUBSCRIBE,
    RECONNECT_IMMEDIATELY_CODES,
};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Reasons a stream session ended.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StreamError {
    /// Socket-level failure (connect refused, TLS, read/write error, pong timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// Server closed the connection, via close frame or `pusher:error`.
    #[error("connection closed (code {code:?}): {reason}")]
    Closed { code: Option<u16>, reason: String },

    /// Frame that does not follow the Pusher protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection was stopped locally.
    #[error("connection stopped")]
    Stopped,
}

/// How to wait before the next connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Fixed short delay (server asked for a plain reconnect).
    Immediate,
    /// Linear backoff with jitter.
    Backoff,
}

impl StreamError {
    /// Maps the error to a reconnect policy.
    ///
    /// Only codes 4200-4299 reconnect on the short fixed delay. Every other
    /// outcome, including 4000-4199 codes, uses the backoff.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        match self {
            Self::Closed {
                code: Some(code), ..
            } if RECONNECT_IMMEDIATELY_CODES.contains(code) => ReconnectPolicy::Immediate,
            _ => ReconnectPolicy::Backoff,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frames
// ─────────────────────────────────────────────────────────────────────────────

/// A single Pusher frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PusherFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Payload of `pusher:connection_established`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionEstablished {
    pub socket_id: String,
    #[serde(default)]
    pub activity_timeout: Option<u64>,
}

impl ConnectionEstablished {
    /// Server-requested inactivity window before a client ping, in seconds.
    pub fn activity_timeout_secs(&self) -> u64 {
        self.activity_timeout
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_ACTIVITY_TIMEOUT_SECS)
    }
}

/// Payload of `pusher:error`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PusherErrorData {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PusherFrame {
    /// Parses a text frame received from the server.
    pub fn parse(text: &str) -> Result<Self, StreamError> {
        serde_json::from_str(text).map_err(|e| StreamError::Protocol(format!("invalid frame: {e}")))
    }

    /// Returns `data` as structured JSON, decoding it if it arrived as a string.
    pub fn data_json(&self) -> Value {
        match &self.data {
            Value::String(text) => serde_json::from_str(text).unwrap_or_else(|_| self.data.clone()),
            other => other.clone(),
        }
    }

    /// Decodes the `data` field into `T`.
    pub fn data_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, StreamError> {
        T::deserialize(self.data_json())
            .map_err(|e| StreamError::Protocol(format!("invalid {} data: {e}", self.event)))
    }

    fn outbound(event: &str, data: Value) -> String {
        json!({ "event": event, "data": data }).to_string()
    }

    /// `pusher:subscribe` for a private channel.
    pub fn subscribe(channel: &str, auth: &str) -> String {
        Self::outbound(EVENT_SUBSCRIBE, json!({ "channel": channel, "auth": auth }))
    }

    pub fn ping() -> String {
        Self::outbound(EVENT_PING, json!({}))
    }

    pub fn pong() -> String {
        Self::outbound(EVENT_PONG, json!({}))
    }
}
