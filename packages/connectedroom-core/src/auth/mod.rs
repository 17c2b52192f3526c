//! Credential exchange with the ConnectedRoom backend.
//!
//! # Module Structure
//!
//! - `client` - HTTP client for login, channel auth and integration endpoints
//!
//! A successful [`AuthClient::authenticate`] yields a [`Session`]. Binding the
//! session with [`AuthClient::bind`] gives a [`SessionClient`], which
//! implements [`IntegrationApi`] for the stream connection and command relay.

mod client;

pub use client::{AuthClient, SessionClient};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::host::EntityState;

/// Errors from the auth and integration endpoints.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    /// The backend could not be reached.
    #[error("cannot connect to ConnectedRoom: {0}")]
    ConnectionFailure(String),

    /// The backend rejected the credentials or answered with garbage.
    #[error("invalid authentication: {0}")]
    InvalidAuth(String),

    /// Authorizing a private channel subscription failed.
    #[error("channel authorization failed for {channel}: {reason}")]
    ChannelAuth { channel: String, reason: String },
}

/// An authenticated session. Lives as long as the stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub api_key: String,
    /// Account id; game events arrive on `private-<unique_id>`.
    pub unique_id: String,
    /// Token sent as `x-websocket-key` when authorizing private channels.
    pub websocket_key: String,
    /// Device-control channel id, when the account has remote control enabled.
    pub integration_key: Option<String>,
}

/// A local entity exposed to remote commands, as reported to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceBinding {
    pub entity_id: String,
    pub domain: String,
    pub name: String,
    pub capabilities: Value,
}

/// Session-scoped backend calls used after login.
#[async_trait]
pub trait IntegrationApi: Send + Sync {
    /// Returns the `auth` signature for subscribing `socket_id` to `channel`.
    async fn authorize_channel(&self, socket_id: &str, channel: &str) -> Result<String, AuthError>;

    /// Publishes the entities remote commands may target.
    async fn sync_devices(&self, bindings: &[DeviceBinding]) -> Result<(), AuthError>;

    /// Answers a `get_state` request.
    async fn post_state(
        &self,
        request_id: &str,
        entity_id: &str,
        state: Option<&EntityState>,
    ) -> Result<(), AuthError>;
}
