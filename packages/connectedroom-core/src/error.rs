//! Centralized error types for the ConnectedRoom core library.
//!
//! Each subsystem defines its own `thiserror` enum; this module maps them to
//! machine-readable codes and folds them into [`ConnectedRoomError`] for
//! callers that only need a single error type.

use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::events::DecodeError;
use crate::host::ServiceCallError;
use crate::pusher::StreamError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for AuthError {
    fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailure(_) => "cannot_connect",
            Self::InvalidAuth(_) => "invalid_auth",
            Self::ChannelAuth { .. } => "channel_auth_failed",
        }
    }
}

impl ErrorCode for StreamError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Closed { .. } => "connection_closed",
            Self::Protocol(_) => "protocol_error",
            Self::Stopped => "stopped",
        }
    }
}

impl ErrorCode for DecodeError {
    fn code(&self) -> &'static str {
        match self {
            Self::MalformedPayload { .. } => "malformed_payload",
        }
    }
}

impl ErrorCode for ServiceCallError {
    fn code(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "service_call_failed",
            Self::Unavailable(_) => "host_unavailable",
        }
    }
}

/// Library-wide error type.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum ConnectedRoomError {
    /// Login or channel authorization failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The backend rejected the credentials. Retrying will not help.
    #[error("Invalid credentials: {0}")]
    InvalidAuth(String),

    /// Event stream failure.
    #[error("Event stream error: {0}")]
    Stream(String),

    /// Event payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Host service call failed.
    #[error("Host error: {0}")]
    Host(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error (e.g. HTTP client construction).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectedRoomError {
    /// Returns a machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth_failed",
            Self::InvalidAuth(_) => "invalid_auth",
            Self::Stream(_) => "stream_error",
            Self::Decode(_) => "decode_error",
            Self::Host(_) => "host_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Stream(_) | Self::Host(_))
    }
}

/// Convenient Result alias for library-wide operations.
pub type ConnectedRoomResult<T> = Result<T, ConnectedRoomError>;

impl From<AuthError> for ConnectedRoomError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidAuth(_) => Self::InvalidAuth(err.to_string()),
            _ => Self::Auth(err.to_string()),
        }
    }
}

impl From<StreamError> for ConnectedRoomError {
    fn from(err: StreamError) -> Self {
        Self::Stream(err.to_string())
    }
}

impl From<DecodeError> for ConnectedRoomError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<ServiceCallError> for ConnectedRoomError {
    fn from(err: ServiceCallError) -> Self {
        Self::Host(err.to_string())
    }
}
