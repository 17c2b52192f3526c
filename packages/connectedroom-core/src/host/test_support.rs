//! Recording host used by unit tests across the crate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::traits::{EntityRegistry, EventBus, ServiceCaller, StateCallback, StateTracker, WatchHandle};
use super::types::{EntityMetadata, EntityState, ServiceCallError, ServiceTarget, StateChange};
use super::Host;

/// A service call captured by [`RecordingHost`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub domain: String,
    pub service: String,
    pub target: Option<ServiceTarget>,
    pub data: Value,
}

type SharedCallback = Arc<dyn Fn(StateChange) + Send + Sync>;
type WatchTable = Arc<Mutex<Vec<Option<(Vec<String>, SharedCallback)>>>>;

/// Host double that records every interaction.
#[derive(Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<RecordedCall>>,
    bus_events: Mutex<Vec<(String, Value)>>,
    watches: WatchTable,
    states: Mutex<HashMap<String, EntityState>>,
    metadata: Mutex<HashMap<String, EntityMetadata>>,
    devices: Mutex<Vec<String>>,
    failing_entities: Mutex<HashSet<String>>,
    failing_bus_devices: Mutex<HashSet<String>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bundles this recorder as every host capability.
    pub fn host(self: &Arc<Self>) -> Host {
        Host {
            services: Arc::clone(self) as Arc<dyn ServiceCaller>,
            bus: Arc::clone(self) as Arc<dyn EventBus>,
            tracker: Arc::clone(self) as Arc<dyn StateTracker>,
            registry: Arc::clone(self) as Arc<dyn EntityRegistry>,
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, domain: &str, service: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.domain == domain && c.service == service)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn bus_events(&self) -> Vec<(String, Value)> {
        self.bus_events.lock().clone()
    }

    pub fn active_watch_count(&self) -> usize {
        self.watches.lock().iter().filter(|w| w.is_some()).count()
    }

    pub fn set_devices(&self, devices: &[&str]) {
        *self.devices.lock() = devices.iter().map(|d| d.to_string()).collect();
    }

    pub fn set_state(&self, state: EntityState) {
        self.states.lock().insert(state.entity_id.clone(), state);
    }

    pub fn set_metadata(&self, entity_id: &str, metadata: EntityMetadata) {
        self.metadata.lock().insert(entity_id.to_string(), metadata);
    }

    /// Makes every service call whose `entity_id` data equals `entity_id` fail.
    pub fn fail_for_entity(&self, entity_id: &str) {
        self.failing_entities.lock().insert(entity_id.to_string());
    }

    /// Makes bus events addressed to `device_id` fail.
    pub fn fail_bus_for_device(&self, device_id: &str) {
        self.failing_bus_devices.lock().insert(device_id.to_string());
    }

    /// Delivers a state change to every live watch that covers the entity.
    pub fn emit_state_change(&self, entity_id: &str, old: &str, new: &str, content_id: Option<&str>) {
        let with_content = |state: &str| {
            let s = EntityState::new(entity_id, state);
            match content_id {
                Some(id) => s.with_attribute("media_content_id", Value::String(id.to_string())),
                None => s,
            }
        };
        self.emit(StateChange {
            entity_id: entity_id.to_string(),
            old_state: Some(with_content(old)),
            new_state: Some(with_content(new)),
        });
    }

    pub fn emit(&self, change: StateChange) {
        let callbacks: Vec<SharedCallback> = self
            .watches
            .lock()
            .iter()
            .flatten()
            .filter(|(entities, _)| entities.contains(&change.entity_id))
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in callbacks {
            cb(change.clone());
        }
    }
}

#[async_trait]
impl ServiceCaller for RecordingHost {
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        target: Option<&ServiceTarget>,
        data: Value,
    ) -> Result<(), ServiceCallError> {
        let failing = data
            .get("entity_id")
            .and_then(Value::as_str)
            .is_some_and(|id| self.failing_entities.lock().contains(id));

        self.calls.lock().push(RecordedCall {
            domain: domain.to_string(),
            service: service.to_string(),
            target: target.cloned(),
            data,
        });

        if failing {
            return Err(ServiceCallError::failed(domain, service, "forced failure"));
        }
        Ok(())
    }
}

impl EventBus for RecordingHost {
    fn fire(&self, name: &str, payload: Value) -> Result<(), ServiceCallError> {
        let failing = payload
            .get("device_id")
            .and_then(Value::as_str)
            .is_some_and(|id| self.failing_bus_devices.lock().contains(id));
        if failing {
            return Err(ServiceCallError::Unavailable("listener failed".to_string()));
        }
        self.bus_events.lock().push((name.to_string(), payload));
        Ok(())
    }
}

impl StateTracker for RecordingHost {
    fn track_state_change(&self, entity_ids: &[String], callback: StateCallback) -> WatchHandle {
        let mut watches = self.watches.lock();
        let index = watches.len();
        watches.push(Some((entity_ids.to_vec(), Arc::from(callback))));
        drop(watches);

        let table = Arc::clone(&self.watches);
        WatchHandle::new(move || {
            if let Some(slot) = table.lock().get_mut(index) {
                *slot = None;
            }
        })
    }
}

#[async_trait]
impl EntityRegistry for RecordingHost {
    async fn devices_for_entry(&self, _entry_id: &str) -> Vec<String> {
        self.devices.lock().clone()
    }

    async fn metadata(&self, entity_id: &str) -> Option<EntityMetadata> {
        self.metadata.lock().get(entity_id).cloned()
    }

    async fn state(&self, entity_id: &str) -> Option<EntityState> {
        self.states.lock().get(entity_id).cloned()
    }
}
