//! HTTP client for the ConnectedRoom REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AuthError, DeviceBinding, IntegrationApi, Session};
use crate::host::EntityState;
use crate::protocol_constants::INTEGRATION_VERSION;
use crate::state::ServerConfig;

/// Body of a successful `/auth/user` response.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    success: bool,
    unique_id: Option<String>,
    websocket_key: Option<String>,
    #[serde(default)]
    integration_key: Option<String>,
}

/// Body of a `/auth/websockets` response (standard Pusher auth shape).
#[derive(Debug, Deserialize)]
struct ChannelAuthResponse {
    auth: String,
}

/// Parses a login response body into a [`Session`].
fn parse_login(api_key: &str, body: &str) -> Result<Session, AuthError> {
    let response: LoginResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::InvalidAuth(format!("unreadable response: {e}")))?;

    if !response.success {
        return Err(AuthError::InvalidAuth("backend refused credentials".into()));
    }

    match (response.unique_id, response.websocket_key) {
        (Some(unique_id), Some(websocket_key)) => Ok(Session {
            api_key: api_key.to_string(),
            unique_id,
            websocket_key,
            integration_key: response.integration_key.filter(|k| !k.is_empty()),
        }),
        _ => Err(AuthError::InvalidAuth(
            "response missing unique_id or websocket_key".into(),
        )),
    }
}

/// Client for the login endpoint. Stateless; safe to call repeatedly.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    server: ServerConfig,
    home_assistant_id: String,
}

impl AuthClient {
    /// Creates a client for `server`, identifying as `home_assistant_id`.
    pub fn new(client: Client, server: ServerConfig, home_assistant_id: impl Into<String>) -> Self {
        Self {
            client,
            server,
            home_assistant_id: home_assistant_id.into(),
        }
    }

    /// Exchanges an API key for a [`Session`].
    ///
    /// # Errors
    /// - [`AuthError::ConnectionFailure`] if the request could not be sent
    /// - [`AuthError::InvalidAuth`] if the body is not JSON, `success` is not
    ///   true, or the session keys are missing
    pub async fn authenticate(&self, api_key: &str) -> Result<Session, AuthError> {
        let url = self.server.api_endpoint("/auth/user");
        log::info!("[Auth] Authenticating against {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .form(&[
                ("home_assistant_id", self.home_assistant_id.as_str()),
                ("home_assistant_integration_version", INTEGRATION_VERSION),
            ])
            .send()
            .await
            .map_err(|e| AuthError::ConnectionFailure(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::ConnectionFailure(e.to_string()))?;

        let session = parse_login(api_key, &body).inspect_err(|e| {
            log::warn!("[Auth] Login rejected (HTTP {}): {}", status.as_u16(), e);
        })?;

        log::info!(
            "[Auth] Authenticated as {} (remote control: {})",
            session.unique_id,
            session.integration_key.is_some()
        );
        Ok(session)
    }

    /// Binds a session, producing the session-scoped API client.
    pub fn bind(&self, session: Session) -> SessionClient {
        SessionClient {
            client: self.client.clone(),
            server: self.server.clone(),
            session,
        }
    }
}

/// Backend client bound to one [`Session`].
#[derive(Clone)]
pub struct SessionClient {
    client: Client,
    server: ServerConfig,
    session: Session,
}

impl SessionClient {
    pub fn session(&self) -> &Session {
        &self.session
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<(), AuthError> {
        let url = self.server.api_endpoint(path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.session.api_key)
            .header("x-websocket-key", &self.session.websocket_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::ConnectionFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::ConnectionFailure(format!(
                "{} returned HTTP {}",
                path,
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl IntegrationApi for SessionClient {
    async fn authorize_channel(&self, socket_id: &str, channel: &str) -> Result<String, AuthError> {
        let channel_error = |reason: String| AuthError::ChannelAuth {
            channel: channel.to_string(),
            reason,
        };

        let url = self.server.api_endpoint("/auth/websockets");
        log::debug!("[Auth] Authorizing {} for socket {}", channel, socket_id);

        let response = self
            .client
            .post(&url)
            .header("x-websocket-key", &self.session.websocket_key)
            .form(&[("socket_id", socket_id), ("channel_name", channel)])
            .send()
            .await
            .map_err(|e| channel_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(channel_error(format!("HTTP {}", status.as_u16())));
        }

        let body: ChannelAuthResponse = response
            .json()
            .await
            .map_err(|e| channel_error(format!("unreadable response: {e}")))?;
        Ok(body.auth)
    }

    async fn sync_devices(&self, bindings: &[DeviceBinding]) -> Result<(), AuthError> {
        log::info!("[Auth] Syncing {} device binding(s)", bindings.len());
        self.post_json(
            "/integration/devices",
            json!({
                "unique_id": self.session.unique_id,
                "devices": bindings,
            }),
        )
        .await
    }

    async fn post_state(
        &self,
        request_id: &str,
        entity_id: &str,
        state: Option<&EntityState>,
    ) -> Result<(), AuthError> {
        self.post_json(
            "/integration/state",
            json!({
                "request_id": request_id,
                "entity_id": entity_id,
                "state": state.map(|s| s.state.as_str()),
                "attributes": state.map(|s| &s.attributes),
            }),
        )
        .await
    }
}
