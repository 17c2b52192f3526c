//! Domain types exchanged with the host.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A failed host service call or bus publication.
#[derive(Debug, Clone, Error)]
pub enum ServiceCallError {
    /// The host rejected or failed the call.
    #[error("{domain}.{service} failed: {reason}")]
    Failed {
        domain: String,
        service: String,
        reason: String,
    },

    /// The host could not be reached at all.
    #[error("host unavailable: {0}")]
    Unavailable(String),
}

impl ServiceCallError {
    pub fn failed(domain: &str, service: &str, reason: impl Into<String>) -> Self {
        Self::Failed {
            domain: domain.to_string(),
            service: service.to_string(),
            reason: reason.into(),
        }
    }
}

/// Target selector of a service call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTarget {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_id: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_id: Vec<String>,
}

impl ServiceTarget {
    /// Targets a set of devices.
    pub fn devices(ids: &[String]) -> Self {
        Self {
            device_id: ids.to_vec(),
            entity_id: Vec::new(),
        }
    }

    /// Targets a single entity.
    pub fn entity(id: impl Into<String>) -> Self {
        Self {
            device_id: Vec::new(),
            entity_id: vec![id.into()],
        }
    }
}

/// Snapshot of an entity's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
        }
    }

    /// Adds an attribute (builder style, mostly for tests and adapters).
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    /// Media content currently loaded on a media player, if reported.
    pub fn media_content_id(&self) -> Option<&str> {
        self.attributes
            .get("media_content_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// One state transition of a tracked entity.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub entity_id: String,
    pub old_state: Option<EntityState>,
    pub new_state: Option<EntityState>,
}

/// Registry metadata of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub domain: String,
    pub name: String,
    /// Supported features / color modes as reported by the host.
    #[serde(default)]
    pub capabilities: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_omits_empty_lists() {
        let target = ServiceTarget::devices(&["dev-1".to_string()]);
        assert_eq!(
            serde_json::to_value(&target).unwrap(),
            json!({ "device_id": ["dev-1"] })
        );
    }

    #[test]
    fn media_content_id_ignores_empty_strings() {
        let state = EntityState::new("media_player.den", "idle")
            .with_attribute("media_content_id", json!(""));
        assert_eq!(state.media_content_id(), None);

        let state = state.with_attribute("media_content_id", json!("siren.mp3"));
        assert_eq!(state.media_content_id(), Some("siren.mp3"));
    }
}
