//! Stock [`EventBus`] implementation.

use serde_json::Value;

use super::traits::EventBus;
use super::types::ServiceCallError;

/// Logging bus for debugging and development.
///
/// Logs all events at debug level. Useful when no host bus exists but the
/// event flow should still be visible.
pub struct LoggingEventBus;

impl EventBus for LoggingEventBus {
    fn fire(&self, name: &str, payload: Value) -> Result<(), ServiceCallError> {
        tracing::debug!(event = name, %payload, "bus_event");
        Ok(())
    }
}
