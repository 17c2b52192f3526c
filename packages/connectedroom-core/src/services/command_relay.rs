//! Remote device commands.
//!
//! The integration channel carries `execute.<entity_id>` and
//! `get_state.<entity_id>` events for the entities bound at setup. Each
//! `execute` maps to exactly one host service call; `get_state` reads the
//! local state and posts it back tagged with the request id.
//!
//! The first mutating command for an entity snapshots its state so that a
//! later `restore` can put it back.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::auth::{DeviceBinding, IntegrationApi};
use crate::events::Rgb;
use crate::host::{EntityState, Host};
use crate::protocol_constants::STATE_OFF;

/// Light attributes replayed by `restore`.
const RESTORABLE_ATTRIBUTES: [&str; 4] = ["rgb_color", "brightness", "effect", "color_temp_kelvin"];

/// An action requested through `execute.<entity_id>`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeviceAction {
    SetColor {
        #[serde(alias = "color")]
        rgb_color: Rgb,
    },
    SetEffect {
        effect: String,
    },
    SetBrightness {
        brightness: u8,
    },
    TurnOn,
    TurnOff,
    Restore,
}

impl DeviceAction {
    fn is_mutating(&self) -> bool {
        !matches!(self, Self::Restore)
    }
}

#[derive(Debug, Deserialize)]
struct StateRequest {
    request_id: String,
}

/// Command parsed from an inbound event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand<'a> {
    Execute(&'a str),
    GetState(&'a str),
}

impl<'a> RelayCommand<'a> {
    /// Splits `execute.light.kitchen` into the command and the entity id.
    pub fn parse(event: &'a str) -> Option<Self> {
        let (verb, entity_id) = event.split_once('.')?;
        if entity_id.is_empty() {
            return None;
        }
        match verb {
            "execute" => Some(Self::Execute(entity_id)),
            "get_state" => Some(Self::GetState(entity_id)),
            _ => None,
        }
    }
}

/// Relays remote commands to bound local entities.
pub struct CommandRelay {
    host: Host,
    api: Arc<dyn IntegrationApi>,
    bindings: DashMap<String, DeviceBinding>,
    snapshots: DashMap<String, EntityState>,
}

impl CommandRelay {
    pub fn new(host: Host, api: Arc<dyn IntegrationApi>) -> Self {
        Self {
            host,
            api,
            bindings: DashMap::new(),
            snapshots: DashMap::new(),
        }
    }

    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Binds `entity_ids` and reports them to the backend.
    ///
    /// Entities unknown to the host registry are skipped.
    pub async fn sync_bindings(&self, entity_ids: &[String]) {
        let mut bound = Vec::with_capacity(entity_ids.len());
        for entity_id in entity_ids {
            let Some(metadata) = self.host.registry.metadata(entity_id).await else {
                log::warn!("[Relay] Unknown entity {}, not binding", entity_id);
                continue;
            };
            let binding = DeviceBinding {
                entity_id: entity_id.clone(),
                domain: metadata.domain,
                name: metadata.name,
                capabilities: metadata.capabilities,
            };
            self.bindings.insert(entity_id.clone(), binding.clone());
            bound.push(binding);
        }

        if bound.is_empty() {
            return;
        }
        match self.api.sync_devices(&bound).await {
            Ok(()) => log::info!("[Relay] Bound {} entity(ies)", bound.len()),
            Err(e) => log::error!("[Relay] Device sync failed: {}", e),
        }
    }

    /// Handles one event from the integration channel.
    pub async fn handle(&self, event: &str, data: &Value) {
        match RelayCommand::parse(event) {
            Some(RelayCommand::Execute(entity_id)) => self.on_execute(entity_id, data).await,
            Some(RelayCommand::GetState(entity_id)) => self.on_get_state(entity_id, data).await,
            None => log::debug!("[Relay] Ignoring event {}", event),
        }
    }

    /// Executes a device action on a bound entity.
    pub async fn on_execute(&self, entity_id: &str, data: &Value) {
        let Some(domain) = self.bindings.get(entity_id).map(|b| b.domain.clone()) else {
            log::warn!("[Relay] execute for unbound entity {}", entity_id);
            return;
        };

        let action: DeviceAction = match DeviceAction::deserialize(payload_json(data)) {
            Ok(action) => action,
            Err(e) => {
                log::warn!("[Relay] Malformed execute for {}: {}", entity_id, e);
                return;
            }
        };

        if action.is_mutating() && !self.snapshots.contains_key(entity_id) {
            if let Some(state) = self.host.registry.state(entity_id).await {
                self.snapshots.insert(entity_id.to_string(), state);
            }
        }

        let Some((call_domain, service, payload)) = self.service_call(&domain, entity_id, &action) else {
            return;
        };

        log::info!("[Relay] {} -> {}.{}", entity_id, call_domain, service);
        if let Err(e) = self
            .host
            .services
            .call_service(&call_domain, service, None, Value::Object(payload))
            .await
        {
            log::warn!("[Relay] {} failed: {}", entity_id, e);
        }
    }

    /// Maps an action to `(domain, service, data)`.
    fn service_call(
        &self,
        domain: &str,
        entity_id: &str,
        action: &DeviceAction,
    ) -> Option<(String, &'static str, Map<String, Value>)> {
        let mut data = Map::new();
        data.insert("entity_id".into(), json!(entity_id));

        let call = match action {
            DeviceAction::SetColor { rgb_color } => {
                data.insert("rgb_color".into(), json!(rgb_color.to_array()));
                ("light".to_string(), "turn_on")
            }
            DeviceAction::SetEffect { effect } => {
                data.insert("effect".into(), json!(effect));
                ("light".to_string(), "turn_on")
            }
            DeviceAction::SetBrightness { brightness } => {
                data.insert("brightness".into(), json!(brightness));
                ("light".to_string(), "turn_on")
            }
            DeviceAction::TurnOn => (domain.to_string(), "turn_on"),
            DeviceAction::TurnOff => (domain.to_string(), "turn_off"),
            DeviceAction::Restore => {
                let Some((_, saved)) = self.snapshots.remove(entity_id) else {
                    log::debug!("[Relay] Nothing to restore for {}", entity_id);
                    return None;
                };
                if saved.state == STATE_OFF {
                    (domain.to_string(), "turn_off")
                } else {
                    for key in RESTORABLE_ATTRIBUTES {
                        if let Some(value) = saved.attributes.get(key).filter(|v| !v.is_null()) {
                            data.insert(key.into(), value.clone());
                        }
                    }
                    (domain.to_string(), "turn_on")
                }
            }
        };
        Some((call.0, call.1, data))
    }

    /// Posts the current state of a bound entity back to the backend.
    pub async fn on_get_state(&self, entity_id: &str, data: &Value) {
        if !self.bindings.contains_key(entity_id) {
            log::warn!("[Relay] get_state for unbound entity {}", entity_id);
            return;
        }

        let request: StateRequest = match StateRequest::deserialize(payload_json(data)) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("[Relay] Malformed get_state for {}: {}", entity_id, e);
                return;
            }
        };

        let state = self.host.registry.state(entity_id).await;
        if let Err(e) = self
            .api
            .post_state(&request.request_id, entity_id, state.as_ref())
            .await
        {
            log::error!("[Relay] State reply for {} failed: {}", entity_id, e);
        }
    }
}

/// Pusher sends `data` as a JSON string; accept objects as well.
fn payload_json(data: &Value) -> Value {
    match data {
        Value::String(text) => serde_json::from_str(text).unwrap_or(Value::Null),
        other => other.clone(),
    }
}
