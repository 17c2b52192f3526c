//! Trait abstractions for the smart-home host.
//!
//! The core never talks to Home Assistant directly. Everything it needs from
//! the host (service calls, bus events, state tracking, entity lookups) goes
//! through these traits so the bridge binary, an embedding integration and
//! the tests can each provide their own implementation.

use async_trait::async_trait;
use serde_json::Value;

use super::types::{EntityMetadata, EntityState, ServiceCallError, ServiceTarget, StateChange};

/// Invokes named host services (`light.turn_on`, `tts.speak`, ...).
#[async_trait]
pub trait ServiceCaller: Send + Sync {
    /// Calls `domain.service` with an optional target and a data payload.
    ///
    /// # Arguments
    /// * `domain` - Service domain (e.g. `"media_player"`)
    /// * `service` - Service name within the domain (e.g. `"play_media"`)
    /// * `target` - Devices/entities addressed through the target selector
    /// * `data` - Service data; may carry `entity_id` itself
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        target: Option<&ServiceTarget>,
        data: Value,
    ) -> Result<(), ServiceCallError>;
}

/// Local publish/subscribe bus. Delivery is best-effort.
pub trait EventBus: Send + Sync {
    /// Fires a bus event with the given name and payload.
    fn fire(&self, name: &str, payload: Value) -> Result<(), ServiceCallError>;
}

/// Callback invoked for every state change of a tracked entity.
pub type StateCallback = Box<dyn Fn(StateChange) + Send + Sync>;

/// Subscribes to state changes of a set of entities.
pub trait StateTracker: Send + Sync {
    /// Starts tracking `entity_ids`; `callback` runs for each change until the
    /// returned handle is unsubscribed or dropped.
    fn track_state_change(&self, entity_ids: &[String], callback: StateCallback) -> WatchHandle;
}

/// Read access to the host's device and entity registries.
#[async_trait]
pub trait EntityRegistry: Send + Sync {
    /// Lists the device ids registered for a config entry.
    async fn devices_for_entry(&self, entry_id: &str) -> Vec<String>;

    /// Looks up domain, display name and capabilities of an entity.
    async fn metadata(&self, entity_id: &str) -> Option<EntityMetadata>;

    /// Reads the current state of an entity.
    async fn state(&self, entity_id: &str) -> Option<EntityState>;
}

/// Unsubscribe handle returned by [`StateTracker::track_state_change`].
///
/// Unsubscribes on drop, so holding at most one handle per role is enough to
/// guarantee at most one live subscription.
pub struct WatchHandle {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchHandle {
    /// Wraps the host's unsubscribe function.
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Handle for a subscription with nothing to tear down.
    pub fn noop() -> Self {
        Self { unsubscribe: None }
    }

    /// Ends the subscription.
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
