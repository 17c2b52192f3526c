//! Routing of decoded game events to local side effects.
//!
//! For every event the dispatcher fans a notification out on the local bus,
//! syncs team colors to the configured light groups and hands narration and
//! horn cues to the [`Sequencer`]. Goals already signalled by a score change
//! are dropped entirely.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;

use super::sequencer::Sequencer;
use crate::events::{BusEvent, DecodedEvent, GameEvent, TeamColors};
use crate::host::{Host, ServiceTarget};
use crate::protocol_constants::BUS_EVENT_NAME;
use crate::state::EntryOptions;

pub struct Dispatcher {
    host: Host,
    options: Arc<EntryOptions>,
}

impl Dispatcher {
    pub fn new(host: Host, options: Arc<EntryOptions>) -> Self {
        Self { host, options }
    }

    /// Applies every side effect of `decoded`.
    pub async fn dispatch(&self, decoded: &DecodedEvent, sequencer: &mut Sequencer) {
        if let GameEvent::Goal(goal) = &decoded.event {
            if goal.already_triggered_from_score_change {
                log::info!("[Dispatcher] Goal already handled from score change, skipping");
                return;
            }
        }

        log::info!("[Dispatcher] Handling {}", decoded.kind());
        self.fan_out(decoded).await;

        if let Some(team) = decoded.event.team() {
            self.sync_colors(&team.colors).await;
        }

        match &decoded.event {
            GameEvent::Goal(goal) => sequencer.on_goal(goal).await,
            GameEvent::GoalHorn(horn) => sequencer.on_goal_horn(horn).await,
            other => {
                if let Some(text) = other.natural_text() {
                    sequencer.speak(text).await;
                }
            }
        }
    }

    /// Fires one bus event per device registered for the entry.
    async fn fan_out(&self, decoded: &DecodedEvent) {
        let entry_id = &self.options.entry_id;
        let devices = self.host.registry.devices_for_entry(entry_id).await;

        for device_id in devices {
            let event = BusEvent {
                kind: decoded.kind(),
                device_id,
                entity_id: entry_id.clone(),
                payload: decoded.payload.clone(),
            };
            let payload = match serde_json::to_value(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    log::error!("[Dispatcher] Cannot encode bus event: {}", e);
                    continue;
                }
            };
            if let Err(e) = self.host.bus.fire(BUS_EVENT_NAME, payload) {
                log::warn!(
                    "[Dispatcher] Bus listener failed for device {}: {}",
                    event.device_id,
                    e
                );
            }
        }
    }

    /// Sets each configured light group to its team color.
    async fn sync_colors(&self, colors: &TeamColors) {
        let futures: Vec<_> = colors
            .iter()
            .filter_map(|(role, rgb)| {
                let lights = self.options.lights_for(role);
                (!lights.is_empty()).then(|| (role, rgb, ServiceTarget::devices(lights)))
            })
            .map(|(role, rgb, target)| async move {
                let result = self
                    .host
                    .services
                    .call_service(
                        "light",
                        "turn_on",
                        Some(&target),
                        json!({ "rgb_color": rgb.to_array() }),
                    )
                    .await;
                if let Err(e) = result {
                    log::warn!("[Dispatcher] Color sync for {:?} lights failed: {}", role, e);
                }
            })
            .collect();

        join_all(futures).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{decode, Rgb};
    use crate::host::test_support::RecordingHost;
    use crate::services::coordinator::CoordinatorMessage;
    use crate::state::SequencerConfig;
    use serde_json::Value;
    use tokio::sync::mpsc;

    fn options() -> EntryOptions {
        EntryOptions {
            entry_id: "entry-1".into(),
            primary_lights: vec!["dev-light-1".into()],
            alternate_lights: vec!["dev-light-3".into()],
            tts_devices: vec!["media_player.den".into()],
            tts_provider: Some("tts.cloud".into()),
            goal_horn_devices: vec!["media_player.arena".into()],
            ..Default::default()
        }
    }

    fn setup() -> (Arc<RecordingHost>, Dispatcher, Sequencer, mpsc::Receiver<CoordinatorMessage>) {
        let host = RecordingHost::new();
        host.set_devices(&["device-a", "device-b"]);
        let options = Arc::new(options());
        let (tx, rx) = mpsc::channel(16);
        let sequencer = Sequencer::new(host.host(), Arc::clone(&options), SequencerConfig::default(), tx);
        (Arc::clone(&host), Dispatcher::new(host.host(), options), sequencer, rx)
    }

    fn decoded(tag: &str, payload: Value) -> DecodedEvent {
        decode(tag, &payload).unwrap().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn fans_out_one_bus_event_per_device() {
        let (host, dispatcher, mut seq, _rx) = setup();

        let event = decoded("period_start", json!({ "natural_text": null }));
        dispatcher.dispatch(&event, &mut seq).await;

        let events = host.bus_events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|(name, _)| name == "connectedroom_event"));
        assert_eq!(events[0].1["type"], "period_start");
        assert_eq!(events[0].1["device_id"], "device-a");
        assert_eq!(events[0].1["entity_id"], "entry-1");
        assert_eq!(events[0].1["payload"], json!({ "natural_text": null }));
        assert_eq!(events[1].1["device_id"], "device-b");
    }

    #[tokio::test(start_paused = true)]
    async fn failing_listener_does_not_abort_fan_out() {
        let (host, dispatcher, mut seq, _rx) = setup();
        host.fail_bus_for_device("device-a");

        let event = decoded("game_end", json!({ "natural_text": "Final" }));
        dispatcher.dispatch(&event, &mut seq).await;

        let events = host.bus_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1["device_id"], "device-b");
        assert_eq!(host.calls_for("tts", "speak").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn already_triggered_goal_is_fully_suppressed() {
        let (host, dispatcher, mut seq, _rx) = setup();

        for _ in 0..3 {
            let event = decoded(
                "goal",
                json!({
                    "natural_text": "Goal!",
                    "team": { "options": {
                        "primary_color_rgb": { "r": 1, "g": 2, "b": 3 },
                        "goal_horn": "horn"
                    }},
                    "already_triggered_from_score_change": true
                }),
            );
            dispatcher.dispatch(&event, &mut seq).await;
        }

        assert!(host.bus_events().is_empty());
        assert!(host.calls().is_empty());
        assert_eq!(seq.state().pending_tts_message(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn syncs_colors_to_configured_roles_only() {
        let (host, dispatcher, mut seq, _rx) = setup();

        let event = decoded(
            "goal",
            json!({
                "natural_text": null,
                "team": { "options": {
                    "primary_color_rgb": { "r": 200, "g": 16, "b": 46 },
                    "secondary_color_rgb": { "r": 255, "g": 255, "b": 255 },
                    "alternate_color_rgb": null
                }}
            }),
        );
        dispatcher.dispatch(&event, &mut seq).await;

        let calls = host.calls_for("light", "turn_on");
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].target,
            Some(ServiceTarget::devices(&["dev-light-1".to_string()]))
        );
        assert_eq!(calls[0].data["rgb_color"], json!([200, 16, 46]));
    }

    #[tokio::test(start_paused = true)]
    async fn colors_apply_to_narration_events_too() {
        let (host, dispatcher, mut seq, _rx) = setup();

        let event = decoded(
            "game_start",
            json!({
                "natural_text": "Puck drop",
                "team": { "options": { "alternate_color_rgb": [0, 0, 255] } }
            }),
        );
        dispatcher.dispatch(&event, &mut seq).await;

        let calls = host.calls_for("light", "turn_on");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].data["rgb_color"], json!(Rgb::new(0, 0, 255).to_array()));
        assert_eq!(host.calls_for("tts", "speak").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn plain_goal_scenario_speaks_once() {
        let (host, dispatcher, mut seq, _rx) = setup();

        let event = decoded("goal", json!({ "natural_text": "Team A scores!", "team": null }));
        dispatcher.dispatch(&event, &mut seq).await;

        let spoken = host.calls_for("tts", "speak");
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].data["message"], "Team A scores!");
        assert!(host.calls_for("media_player", "play_media").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn goal_horn_is_routed_to_sequencer() {
        let (host, dispatcher, mut seq, _rx) = setup();

        let event = decoded("goal_horn", json!({ "audioFile": "siren.mp3", "maxDuration": 5 }));
        dispatcher.dispatch(&event, &mut seq).await;

        assert_eq!(host.calls_for("media_player", "play_media").len(), 1);
        assert!(seq.state().is_playing_horn());
        assert_eq!(host.bus_events().len(), 2);
    }
}
