//! Host (smart-home platform) capabilities consumed by the core.
//!
//! # Module Structure
//!
//! - `traits` - `ServiceCaller`, `EventBus`, `StateTracker`, `EntityRegistry`
//! - `types` - Targets, entity states, state changes, metadata, errors
//! - `bus` - Logging event bus

pub mod bus;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

pub use bus::LoggingEventBus;
pub use traits::{EntityRegistry, EventBus, ServiceCaller, StateCallback, StateTracker, WatchHandle};
pub use types::{EntityMetadata, EntityState, ServiceCallError, ServiceTarget, StateChange};

/// All host capabilities, bundled for injection into services.
#[derive(Clone)]
pub struct Host {
    pub services: Arc<dyn ServiceCaller>,
    pub bus: Arc<dyn EventBus>,
    pub tracker: Arc<dyn StateTracker>,
    pub registry: Arc<dyn EntityRegistry>,
}
