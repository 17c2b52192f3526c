//! ConnectedRoom Core - realtime game events to local lights, horns and speech.
//!
//! This crate implements the client side of ConnectedRoom: it logs in to the
//! backend, holds a Pusher WebSocket subscription to the account's private
//! channels, and turns the game events it receives into side effects on a
//! smart-home host (Home Assistant). It is used by the standalone bridge
//! binary and can be embedded by any application that implements the host
//! traits.
//!
//! # Architecture
//!
//! - [`auth`]: Login, channel authorization and integration endpoints
//! - [`pusher`]: Event stream connection with reconnect and backoff
//! - [`events`]: Game event types and the tagged-message decoder
//! - [`services`]: Dispatcher, horn/TTS sequencer, command relay, coordinator
//! - [`host`]: Host capability traits
//! - [`state`]: Configuration
//! - [`bootstrap`]: Composition root
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`ServiceCaller`](host::ServiceCaller), [`EventBus`](host::EventBus),
//!   [`StateTracker`](host::StateTracker), [`EntityRegistry`](host::EntityRegistry):
//!   what the core needs from the host
//! - [`IntegrationApi`](auth::IntegrationApi): session-scoped backend calls
//! - [`Connector`](pusher::Connector): WebSocket transport, swappable in tests

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod events;
pub mod host;
pub mod protocol_constants;
pub mod pusher;
pub mod services;
pub mod state;

// Re-export commonly used types at the crate root
pub use auth::{AuthClient, AuthError, DeviceBinding, IntegrationApi, Session, SessionClient};
pub use bootstrap::ConnectedRoom;
pub use error::{ConnectedRoomError, ConnectedRoomResult, ErrorCode};
pub use events::{decode, BusEvent, DecodeError, DecodedEvent, EventKind, GameEvent, Rgb};
pub use host::{
    EntityMetadata, EntityRegistry, EntityState, EventBus, Host, ServiceCallError, ServiceCaller,
    ServiceTarget, StateCallback, StateChange, StateTracker, WatchHandle,
};
pub use pusher::{ConnectionState, Connector, StreamConnection, StreamError, WsConnector};
pub use services::{CommandRelay, Coordinator, Dispatcher, Sequencer};
pub use state::{Config, EntryOptions, ReconnectConfig, SequencerConfig, ServerConfig};
