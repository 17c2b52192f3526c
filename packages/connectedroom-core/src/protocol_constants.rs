//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the Pusher wire protocol, the ConnectedRoom
//! backend, or the Home Assistant service names the bridge drives.

// ─────────────────────────────────────────────────────────────────────────────
// Pusher Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Pusher protocol revision requested in the connection URL.
pub const PUSHER_PROTOCOL_VERSION: u8 = 7;

/// Client name reported in the connection URL.
pub const PUSHER_CLIENT_NAME: &str = "connectedroom-rs";

/// Prefix for channels that need an auth signature before subscribing.
pub const PRIVATE_CHANNEL_PREFIX: &str = "private-";

/// Activity timeout used until the server announces its own (seconds).
pub const DEFAULT_ACTIVITY_TIMEOUT_SECS: u64 = 120;

/// Time allowed for a `pusher:pong` after we send `pusher:ping` (seconds).
pub const PONG_TIMEOUT_SECS: u64 = 30;

/// Close/error codes in this range ask the client to reconnect immediately.
pub const RECONNECT_IMMEDIATELY_CODES: std::ops::RangeInclusive<u16> = 4200..=4299;

// ─────────────────────────────────────────────────────────────────────────────
// Pusher Event Names
// ─────────────────────────────────────────────────────────────────────────────

pub const EVENT_CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
pub const EVENT_ERROR: &str = "pusher:error";
pub const EVENT_PING: &str = "pusher:ping";
pub const EVENT_PONG: &str = "pusher:pong";
pub const EVENT_SUBSCRIBE: &str = "pusher:subscribe";
pub const EVENT_SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
pub const EVENT_SUBSCRIPTION_ERROR: &str = "pusher:subscription_error";

// ─────────────────────────────────────────────────────────────────────────────
// Home Assistant
// ─────────────────────────────────────────────────────────────────────────────

/// Name of the bus event fired once per registered device for every game event.
pub const BUS_EVENT_NAME: &str = "connectedroom_event";

/// Media player state reported while audio is playing.
pub const STATE_PLAYING: &str = "playing";

/// Media player state reported once playback has finished.
pub const STATE_IDLE: &str = "idle";

/// Entity state reported by a switched-off light or switch.
pub const STATE_OFF: &str = "off";

/// Content type sent with horn `play_media` calls.
pub const HORN_MEDIA_CONTENT_TYPE: &str = "music";

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Integration version reported to the backend at login.
pub const INTEGRATION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Capacity of the coordinator's inbound queue.
pub const COORDINATOR_QUEUE_CAPACITY: usize = 256;

/// Timeout for backend HTTP requests (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 10;
