//! Home Assistant REST adapter for the core host traits.
//!
//! Service calls and bus events go through `/api/services` and `/api/events`.
//! State changes are observed by polling `/api/states/<entity_id>`; the REST
//! API has no push channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use connectedroom_core::{
    EntityMetadata, EntityRegistry, EntityState, EventBus, ServiceCallError, ServiceCaller,
    ServiceTarget, StateCallback, StateChange, StateTracker, WatchHandle,
};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Attributes reported to the backend as entity capabilities.
const CAPABILITY_ATTRIBUTES: [&str; 4] = [
    "supported_color_modes",
    "supported_features",
    "effect_list",
    "device_class",
];

/// Cheaply clonable REST handle, shared with spawned tasks.
#[derive(Clone)]
struct HassApi {
    client: Client,
    base_url: Arc<str>,
    token: Option<Arc<str>>,
}

impl HassApi {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/api/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<(), String> {
        let response = self
            .request(Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", status.as_u16()))
        }
    }

    async fn fetch_state(&self, entity_id: &str) -> Result<Option<EntityState>, ServiceCallError> {
        let response = self
            .request(Method::GET, &format!("states/{}", entity_id))
            .send()
            .await
            .map_err(|e| ServiceCallError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<EntityState>()
                .await
                .map(Some)
                .map_err(|e| ServiceCallError::Unavailable(format!("bad state body: {}", e))),
            status => Err(ServiceCallError::Unavailable(format!(
                "GET states/{} returned HTTP {}",
                entity_id,
                status.as_u16()
            ))),
        }
    }
}

/// Home Assistant instance reached over its REST API.
pub struct HassClient {
    api: HassApi,
    devices: Vec<String>,
    poll_interval: Duration,
}

impl HassClient {
    pub fn new(
        client: Client,
        base_url: &str,
        token: Option<String>,
        devices: Vec<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api: HassApi {
                client,
                base_url: Arc::from(base_url.trim_end_matches('/')),
                token: token.map(Arc::from),
            },
            devices,
            poll_interval,
        }
    }
}

/// Builds the `/api/services` body: target selector fields merged into the data.
pub(crate) fn service_body(target: Option<&ServiceTarget>, data: Value) -> Value {
    let mut body = match data {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            log::warn!("[Hass] Ignoring non-object service data: {}", other);
            Map::new()
        }
    };
    if let Some(target) = target {
        if !target.device_id.is_empty() {
            body.insert("device_id".into(), Value::from(target.device_id.clone()));
        }
        if !target.entity_id.is_empty() {
            body.insert("entity_id".into(), Value::from(target.entity_id.clone()));
        }
    }
    Value::Object(body)
}

/// Derives registry metadata from a state object.
pub(crate) fn metadata_from_state(state: &EntityState) -> EntityMetadata {
    let domain = state
        .entity_id
        .split_once('.')
        .map(|(domain, _)| domain)
        .unwrap_or_default()
        .to_string();
    let name = state
        .attributes
        .get("friendly_name")
        .and_then(Value::as_str)
        .unwrap_or(state.entity_id.as_str())
        .to_string();
    let capabilities: Map<String, Value> = CAPABILITY_ATTRIBUTES
        .iter()
        .filter_map(|key| state.attributes.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect();

    EntityMetadata {
        domain,
        name,
        capabilities: Value::Object(capabilities),
    }
}

/// Whether a polled state differs in a way watchers care about.
pub(crate) fn has_changed(old: Option<&EntityState>, new: Option<&EntityState>) -> bool {
    match (old, new) {
        (None, None) => false,
        (Some(old), Some(new)) => {
            old.state != new.state || old.media_content_id() != new.media_content_id()
        }
        _ => true,
    }
}

#[async_trait]
impl ServiceCaller for HassClient {
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        target: Option<&ServiceTarget>,
        data: Value,
    ) -> Result<(), ServiceCallError> {
        let body = service_body(target, data);
        log::debug!("[Hass] {}.{} {}", domain, service, body);
        self.api
            .post(&format!("services/{}/{}", domain, service), &body)
            .await
            .map_err(|reason| ServiceCallError::failed(domain, service, reason))
    }
}

impl EventBus for HassClient {
    fn fire(&self, name: &str, payload: Value) -> Result<(), ServiceCallError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ServiceCallError::Unavailable(e.to_string()))?;

        let api = self.api.clone();
        let path = format!("events/{}", name);
        runtime.spawn(async move {
            if let Err(e) = api.post(&path, &payload).await {
                log::warn!("[Hass] Firing {} failed: {}", path, e);
            }
        });
        Ok(())
    }
}

impl StateTracker for HassClient {
    fn track_state_change(&self, entity_ids: &[String], callback: StateCallback) -> WatchHandle {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("[Hass] Cannot track state without a runtime: {}", e);
                return WatchHandle::noop();
            }
        };

        let cancel = CancellationToken::new();
        let poller = StatePoller {
            api: self.api.clone(),
            entity_ids: entity_ids.to_vec(),
            interval: self.poll_interval,
            callback,
        };
        runtime.spawn(poller.run(cancel.clone()));
        WatchHandle::new(move || cancel.cancel())
    }
}

#[async_trait]
impl EntityRegistry for HassClient {
    async fn devices_for_entry(&self, _entry_id: &str) -> Vec<String> {
        self.devices.clone()
    }

    async fn metadata(&self, entity_id: &str) -> Option<EntityMetadata> {
        self.state(entity_id).await.map(|s| metadata_from_state(&s))
    }

    async fn state(&self, entity_id: &str) -> Option<EntityState> {
        match self.api.fetch_state(entity_id).await {
            Ok(state) => state,
            Err(e) => {
                log::warn!("[Hass] Reading {} failed: {}", entity_id, e);
                None
            }
        }
    }
}

struct StatePoller {
    api: HassApi,
    entity_ids: Vec<String>,
    interval: Duration,
    callback: StateCallback,
}

impl StatePoller {
    async fn run(self, cancel: CancellationToken) {
        let mut last: HashMap<String, Option<EntityState>> = HashMap::new();
        for entity_id in &self.entity_ids {
            if let Ok(state) = self.api.fetch_state(entity_id).await {
                last.insert(entity_id.clone(), state);
            }
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            for entity_id in &self.entity_ids {
                let state = match self.api.fetch_state(entity_id).await {
                    Ok(state) => state,
                    Err(e) => {
                        log::debug!("[Hass] Poll of {} failed: {}", entity_id, e);
                        continue;
                    }
                };
                if cancel.is_cancelled() {
                    return;
                }

                let old = last.get(entity_id).cloned().flatten();
                if has_changed(old.as_ref(), state.as_ref()) {
                    last.insert(entity_id.clone(), state.clone());
                    (self.callback)(StateChange {
                        entity_id: entity_id.clone(),
                        old_state: old,
                        new_state: state,
                    });
                }
            }
        }
    }
}
