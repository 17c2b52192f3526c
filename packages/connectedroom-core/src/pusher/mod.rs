//! Pusher event stream client.
//!
//! # Module Structure
//!
//! - `protocol` - Frames, `StreamError` and reconnect classification
//! - `backoff` - Reconnect delay calculation
//! - `transport` - `Transport`/`Connector` traits and the WebSocket connector
//! - `connection` - `StreamConnection` state machine and listen task

pub mod backoff;
pub mod connection;
pub mod protocol;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{ConnectionState, InboundMessage, StreamConnection, Subscription};
pub use protocol::{ReconnectPolicy, StreamError};
pub use transport::{Connector, Transport, TransportEvent, WsConnector};

use crate::auth::Session;
use crate::protocol_constants::PRIVATE_CHANNEL_PREFIX;

/// Private channel carrying game events for the session's account.
pub fn game_channel(session: &Session) -> String {
    format!("{}{}", PRIVATE_CHANNEL_PREFIX, session.unique_id)
}

/// Private channel carrying device commands, if remote control is enabled.
pub fn command_channel(session: &Session) -> Option<String> {
    session
        .integration_key
        .as_ref()
        .map(|key| format!("{}{}", PRIVATE_CHANNEL_PREFIX, key))
}

/// All channels a session subscribes to, game channel first.
pub fn session_channels(session: &Session) -> Vec<String> {
    std::iter::once(game_channel(session))
        .chain(command_channel(session))
        .collect()
}
