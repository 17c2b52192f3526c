//! Horn/TTS sequencing.
//!
//! Serializes goal horn playback and spoken narration so they never overlap.
//! Narration that arrives together with a horn cue is parked as pending and
//! spoken once the horn finishes (naturally, or by its hard-stop timer), or
//! when the grace timer runs out because no horn cue arrived.
//!
//! All state lives in [`PlaybackState`] and is mutated only through the
//! [`Sequencer`] transition methods, which run on the coordinator task.
//! Timer expiries and horn state changes come back through the coordinator
//! queue as [`SequencerEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use super::call_per_entity;
use super::coordinator::CoordinatorMessage;
use super::timer::TimerSlot;
use crate::events::{GoalEvent, GoalHornEvent, TeamOptions};
use crate::host::{EntityState, Host, StateChange, WatchHandle};
use crate::protocol_constants::{HORN_MEDIA_CONTENT_TYPE, STATE_IDLE, STATE_PLAYING};
use crate::state::{EntryOptions, SequencerConfig};

/// Timer roles owned by the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Waits for the horn cue that should follow a goal.
    Grace,
    /// Pause between the horn going idle and the narration.
    Settle,
    /// Maximum horn duration.
    HardStop,
}

/// Asynchronous inputs fed back to the sequencer through the coordinator queue.
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    TimerExpired { kind: TimerKind, generation: u64 },
    HornStateChanged { watch: u64, change: StateChange },
}

/// Narration waiting for a horn. `horn` is the horn it will follow, or `None`
/// while its horn cue has not arrived yet.
#[derive(Debug, Clone, PartialEq)]
struct PendingNarration {
    text: String,
    horn: Option<u64>,
}

/// Mutable state of the horn/TTS sequence.
#[derive(Debug, Default)]
pub struct PlaybackState {
    is_playing_horn: bool,
    pending_tts_message: Option<PendingNarration>,
    suppress_next_completion: bool,
    /// Number of horns started so far; identifies the current horn.
    horn: u64,
    active_horn_timeout: TimerSlot,
    active_state_watch: Option<WatchHandle>,
    watch_generation: u64,
    grace: TimerSlot,
    settle: TimerSlot,
}

impl PlaybackState {
    #[must_use]
    pub fn is_playing_horn(&self) -> bool {
        self.is_playing_horn
    }

    #[must_use]
    pub fn pending_tts_message(&self) -> Option<&str> {
        self.pending_tts_message.as_ref().map(|p| p.text.as_str())
    }

    #[must_use]
    pub fn suppress_next_completion(&self) -> bool {
        self.suppress_next_completion
    }

    #[must_use]
    pub fn has_state_watch(&self) -> bool {
        self.active_state_watch.is_some()
    }

    fn slot_mut(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::Grace => &mut self.grace,
            TimerKind::Settle => &mut self.settle,
            TimerKind::HardStop => &mut self.active_horn_timeout,
        }
    }

    /// Drops the completion watch; queued callbacks from it become stale.
    fn cancel_watch(&mut self) {
        self.active_state_watch = None;
        self.watch_generation = self.watch_generation.wrapping_add(1);
    }

    fn pending_belongs_to_current_horn(&self) -> bool {
        self.pending_tts_message
            .as_ref()
            .is_some_and(|p| p.horn == Some(self.horn))
    }
}

/// Returns true if a goal should wait for a horn cue before narrating.
///
/// The team must announce a horn (`goal_horn` or `goal_horn_with_music`)
/// and at least one horn player must be configured.
pub fn horn_expected(team: Option<&TeamOptions>, options: &EntryOptions) -> bool {
    team.is_some_and(TeamOptions::announces_horn) && options.has_horn_devices()
}

/// A horn completion: `playing` to `idle`, with matching content ids when
/// both sides report one.
fn is_completion(old: &EntityState, new: &EntityState) -> bool {
    if old.state != STATE_PLAYING || new.state != STATE_IDLE {
        return false;
    }
    match (old.media_content_id(), new.media_content_id()) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Playback of a new media item: entering `playing`, or a content change
/// while already playing.
fn is_playback_start(old: &EntityState, new: &EntityState) -> bool {
    new.state == STATE_PLAYING
        && (old.state != STATE_PLAYING || old.media_content_id() != new.media_content_id())
}

/// Drives horn playback and narration for one config entry.
pub struct Sequencer {
    host: Host,
    options: Arc<EntryOptions>,
    config: SequencerConfig,
    queue: mpsc::Sender<CoordinatorMessage>,
    state: PlaybackState,
}

impl Sequencer {
    pub fn new(
        host: Host,
        options: Arc<EntryOptions>,
        config: SequencerConfig,
        queue: mpsc::Sender<CoordinatorMessage>,
    ) -> Self {
        Self {
            host,
            options,
            config,
            queue,
            state: PlaybackState::default(),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    fn arm(&mut self, kind: TimerKind, delay: Duration) {
        self.state.slot_mut(kind).arm(delay, &self.queue, move |generation| {
            CoordinatorMessage::Sequencer(SequencerEvent::TimerExpired { kind, generation })
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event entry points
    // ─────────────────────────────────────────────────────────────────────────

    /// A goal was scored (already de-duplicated by the dispatcher).
    pub async fn on_goal(&mut self, goal: &GoalEvent) {
        let Some(text) = goal.natural_text.as_deref() else {
            return;
        };

        if !horn_expected(goal.team.as_ref(), &self.options) {
            self.speak(text).await;
            return;
        }

        log::info!(
            "[Sequencer] Horn expected, deferring narration for {}ms",
            self.config.grace_delay_ms
        );
        self.state.grace.cancel();
        self.state.settle.cancel();
        self.state.pending_tts_message = Some(PendingNarration {
            text: text.to_string(),
            horn: None,
        });
        self.arm(TimerKind::Grace, self.config.grace_delay());
    }

    /// The horn cue for the latest goal arrived.
    pub async fn on_goal_horn(&mut self, horn: &GoalHornEvent) {
        self.state.grace.cancel();

        let options = Arc::clone(&self.options);
        let audio = match horn.audio_file.as_deref() {
            Some(audio) if options.has_horn_devices() => audio,
            _ => {
                log::info!("[Sequencer] Horn cue without audio or players, releasing narration");
                self.release_pending().await;
                return;
            }
        };

        self.state.cancel_watch();
        self.state.settle.cancel();

        if self.state.is_playing_horn {
            log::info!("[Sequencer] New horn pre-empts the one still playing");
            self.state.suppress_next_completion = true;
        }
        // Narration tied to an earlier horn is superseded by this one.
        if self
            .state
            .pending_tts_message
            .as_ref()
            .is_some_and(|p| p.horn.is_some())
        {
            self.state.pending_tts_message = None;
        }

        self.state.horn = self.state.horn.wrapping_add(1);
        let current = self.state.horn;
        if let Some(pending) = self.state.pending_tts_message.as_mut() {
            pending.horn = Some(current);
        }
        self.state.is_playing_horn = true;

        self.start_watch(&options.goal_horn_devices);

        log::info!(
            "[Sequencer] Playing horn {} on {} player(s)",
            audio,
            options.goal_horn_devices.len()
        );
        let failed = call_per_entity(
            self.host.services.as_ref(),
            "Sequencer",
            "media_player",
            "play_media",
            &options.goal_horn_devices,
            |device| {
                json!({
                    "media_content_type": HORN_MEDIA_CONTENT_TYPE,
                    "media_content_id": audio,
                    "entity_id": device,
                })
            },
        )
        .await;

        if failed == options.goal_horn_devices.len() {
            log::warn!("[Sequencer] Horn failed on every player, releasing narration");
            self.state.is_playing_horn = false;
            self.state.suppress_next_completion = false;
            self.state.active_horn_timeout.cancel();
            self.state.cancel_watch();
            self.release_pending().await;
            return;
        }

        // Without a reported duration the configured ceiling still ends the horn.
        let limit = horn.max_duration.unwrap_or(self.config.max_horn_duration());
        self.arm(TimerKind::HardStop, limit);
    }

    /// Handles a timer expiry or horn state change from the queue.
    pub async fn handle(&mut self, event: SequencerEvent) {
        match event {
            SequencerEvent::TimerExpired { kind, generation } => {
                if !self.state.slot_mut(kind).take_expired(generation) {
                    log::debug!("[Sequencer] Ignoring stale {:?} timer", kind);
                    return;
                }
                match kind {
                    TimerKind::Grace => {
                        log::info!("[Sequencer] No horn cue within grace period");
                        self.release_pending().await;
                    }
                    TimerKind::Settle => {
                        if let Some(pending) = self.state.pending_tts_message.take() {
                            self.speak(&pending.text).await;
                        }
                    }
                    TimerKind::HardStop => self.hard_stop().await,
                }
            }
            SequencerEvent::HornStateChanged { watch, change } => {
                if watch != self.state.watch_generation || !self.state.has_state_watch() {
                    return;
                }
                self.on_horn_state_changed(&change);
            }
        }
    }

    /// Speaks `text` on every TTS player, unless a horn is playing.
    pub async fn speak(&mut self, text: &str) {
        if self.state.is_playing_horn {
            log::debug!("[Sequencer] Horn playing, not speaking");
            return;
        }

        self.state.grace.cancel();
        self.state.settle.cancel();
        self.state.cancel_watch();
        self.state.pending_tts_message = None;

        let options = Arc::clone(&self.options);
        if options.tts_devices.is_empty() {
            return;
        }

        let services = self.host.services.as_ref();
        if let Some(service) = options.tts_service.as_deref() {
            log::info!("[Sequencer] Speaking via tts.{}", service);
            call_per_entity(services, "Sequencer", "tts", service, &options.tts_devices, |device| {
                json!({ "cache": true, "entity_id": device, "message": text })
            })
            .await;
        } else if let Some(provider) = options.tts_provider.as_deref() {
            log::info!("[Sequencer] Speaking via {}", provider);
            call_per_entity(services, "Sequencer", "tts", "speak", &options.tts_devices, |device| {
                json!({
                    "cache": true,
                    "media_player_entity_id": device,
                    "entity_id": provider,
                    "message": text,
                })
            })
            .await;
        } else {
            log::debug!("[Sequencer] No TTS engine configured");
        }
    }

    /// Cancels every timer and the completion watch.
    pub fn shutdown(&mut self) {
        self.state.grace.cancel();
        self.state.settle.cancel();
        self.state.active_horn_timeout.cancel();
        self.state.cancel_watch();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Speaks pending narration now, or hands it to the horn still playing.
    async fn release_pending(&mut self) {
        if self.state.is_playing_horn {
            let current = self.state.horn;
            if let Some(pending) = self.state.pending_tts_message.as_mut() {
                pending.horn.get_or_insert(current);
            }
            return;
        }
        if let Some(pending) = self.state.pending_tts_message.take() {
            self.speak(&pending.text).await;
        }
    }

    fn start_watch(&mut self, devices: &[String]) {
        self.state.cancel_watch();
        let watch = self.state.watch_generation;
        let queue = self.queue.clone();
        let handle = self.host.tracker.track_state_change(
            devices,
            Box::new(move |change| {
                let event = SequencerEvent::HornStateChanged { watch, change };
                if let Err(e) = queue.try_send(CoordinatorMessage::Sequencer(event)) {
                    log::warn!("[Sequencer] Dropped horn state change: {}", e);
                }
            }),
        );
        self.state.active_state_watch = Some(handle);
    }

    fn on_horn_state_changed(&mut self, change: &StateChange) {
        if !self.state.is_playing_horn {
            return;
        }
        let (Some(old), Some(new)) = (&change.old_state, &change.new_state) else {
            return;
        };

        if is_playback_start(old, new) {
            if self.state.suppress_next_completion {
                log::debug!("[Sequencer] New horn started on {}", change.entity_id);
                self.state.suppress_next_completion = false;
            }
            return;
        }

        if !is_completion(old, new) {
            return;
        }

        if self.state.suppress_next_completion {
            log::info!("[Sequencer] Ignoring completion of the pre-empted horn");
            self.state.suppress_next_completion = false;
            return;
        }

        log::info!("[Sequencer] Horn finished on {}", change.entity_id);
        self.finish_horn();
    }

    /// Clears the horn and schedules its narration after the settle delay.
    fn finish_horn(&mut self) {
        self.state.is_playing_horn = false;
        self.state.suppress_next_completion = false;
        self.state.active_horn_timeout.cancel();
        self.state.cancel_watch();

        if self.state.pending_belongs_to_current_horn() {
            self.arm(TimerKind::Settle, self.config.settle_delay());
        }
    }

    async fn hard_stop(&mut self) {
        log::info!("[Sequencer] Horn reached its maximum duration, stopping");
        self.finish_horn();

        let options = Arc::clone(&self.options);
        call_per_entity(
            self.host.services.as_ref(),
            "Sequencer",
            "media_player",
            "media_stop",
            &options.goal_horn_devices,
            |device| json!({ "entity_id": device }),
        )
        .await;
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::RecordingHost;
    use serde_json::Value;
    use tokio::time::Instant;

    const DEN: &str = "media_player.den";
    const ARENA: &str = "media_player.arena";

    fn options() -> EntryOptions {
        EntryOptions {
            entry_id: "entry-1".into(),
            tts_devices: vec![DEN.into()],
            tts_provider: Some("tts.cloud".into()),
            goal_horn_devices: vec![ARENA.into()],
            ..Default::default()
        }
    }

    fn setup(options: EntryOptions) -> (Arc<RecordingHost>, Sequencer, mpsc::Receiver<CoordinatorMessage>) {
        let host = RecordingHost::new();
        let (tx, rx) = mpsc::channel(64);
        let sequencer = Sequencer::new(host.host(), Arc::new(options), SequencerConfig::default(), tx);
        (host, sequencer, rx)
    }

    fn plain_goal(text: &str) -> GoalEvent {
        GoalEvent {
            natural_text: Some(text.into()),
            ..Default::default()
        }
    }

    fn horn_goal(text: &str) -> GoalEvent {
        GoalEvent {
            natural_text: Some(text.into()),
            team: Some(TeamOptions {
                goal_horn: Some(Value::String("default".into())),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn horn(audio: &str, max_secs: Option<u64>) -> GoalHornEvent {
        GoalHornEvent {
            audio_file: Some(audio.into()),
            max_duration: max_secs.map(Duration::from_secs),
        }
    }

    /// Processes sequencer messages for `duration` of (paused) time.
    async fn pump(seq: &mut Sequencer, rx: &mut mpsc::Receiver<CoordinatorMessage>, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Some(CoordinatorMessage::Sequencer(event)) => seq.handle(event).await,
                    Some(_) => {}
                    None => return,
                },
                _ = tokio::time::sleep_until(deadline) => return,
            }
        }
    }

    fn spoken(host: &RecordingHost) -> Vec<String> {
        host.calls_for("tts", "speak")
            .into_iter()
            .map(|c| c.data["message"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn goal_without_horn_speaks_immediately() {
        let (host, mut seq, _rx) = setup(options());

        seq.on_goal(&plain_goal("Team A scores!")).await;

        assert_eq!(spoken(&host), vec!["Team A scores!"]);
        let call = &host.calls_for("tts", "speak")[0];
        assert_eq!(call.data["media_player_entity_id"], DEN);
        assert_eq!(call.data["entity_id"], "tts.cloud");
        assert_eq!(call.data["cache"], true);
        assert!(host.calls_for("media_player", "play_media").is_empty());
        assert!(host.calls_for("media_player", "media_stop").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn horn_team_without_horn_players_speaks_immediately() {
        let (host, mut seq, _rx) = setup(EntryOptions {
            goal_horn_devices: Vec::new(),
            ..options()
        });

        seq.on_goal(&horn_goal("Goal!")).await;
        assert_eq!(spoken(&host), vec!["Goal!"]);
    }

    #[tokio::test(start_paused = true)]
    async fn grace_timer_speaks_when_no_horn_cue_arrives() {
        let (host, mut seq, mut rx) = setup(options());

        seq.on_goal(&horn_goal("Team A scores!")).await;
        assert!(spoken(&host).is_empty());
        assert_eq!(seq.state().pending_tts_message(), Some("Team A scores!"));

        pump(&mut seq, &mut rx, Duration::from_millis(2_900)).await;
        assert!(spoken(&host).is_empty());

        pump(&mut seq, &mut rx, Duration::from_millis(200)).await;
        assert_eq!(spoken(&host), vec!["Team A scores!"]);
        assert_eq!(seq.state().pending_tts_message(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn narration_follows_natural_horn_completion() {
        let (host, mut seq, mut rx) = setup(options());

        seq.on_goal(&horn_goal("Team A scores!")).await;
        pump(&mut seq, &mut rx, Duration::from_millis(500)).await;
        seq.on_goal_horn(&horn("siren.mp3", Some(5))).await;

        let plays = host.calls_for("media_player", "play_media");
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].data["media_content_id"], "siren.mp3");
        assert_eq!(plays[0].data["media_content_type"], "music");
        assert_eq!(plays[0].data["entity_id"], ARENA);
        assert!(seq.state().is_playing_horn());

        // Grace period passes without narration while the horn plays.
        pump(&mut seq, &mut rx, Duration::from_secs(3)).await;
        assert!(spoken(&host).is_empty());

        host.emit_state_change(ARENA, "playing", "idle", Some("siren.mp3"));
        pump(&mut seq, &mut rx, Duration::from_millis(1_500)).await;
        assert_eq!(spoken(&host), vec!["Team A scores!"]);
        assert!(!seq.state().is_playing_horn());

        pump(&mut seq, &mut rx, Duration::from_secs(10)).await;
        assert_eq!(spoken(&host).len(), 1);
        assert!(host.calls_for("media_player", "media_stop").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hard_stop_fires_once_without_natural_completion() {
        let (host, mut seq, mut rx) = setup(options());

        seq.on_goal(&horn_goal("Team A scores!")).await;
        seq.on_goal_horn(&horn("siren.mp3", Some(5))).await;

        pump(&mut seq, &mut rx, Duration::from_millis(5_100)).await;
        let stops = host.calls_for("media_player", "media_stop");
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].data["entity_id"], ARENA);
        assert!(!seq.state().is_playing_horn());
        assert!(!seq.state().has_state_watch());

        pump(&mut seq, &mut rx, Duration::from_secs(2)).await;
        assert_eq!(spoken(&host), vec!["Team A scores!"]);

        // The player reporting idle after the stop is not a second completion.
        host.emit_state_change(ARENA, "playing", "idle", None);
        pump(&mut seq, &mut rx, Duration::from_secs(10)).await;
        assert_eq!(host.calls_for("media_player", "media_stop").len(), 1);
        assert_eq!(spoken(&host).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn horn_failing_on_every_player_releases_narration() {
        let (host, mut seq, mut rx) = setup(options());
        host.fail_for_entity(ARENA);

        seq.on_goal(&horn_goal("Team A scores!")).await;
        seq.on_goal_horn(&horn("siren.mp3", None)).await;

        assert_eq!(host.calls_for("media_player", "play_media").len(), 1);
        assert!(!seq.state().is_playing_horn());
        assert!(!seq.state().has_state_watch());
        assert_eq!(host.active_watch_count(), 0);
        assert_eq!(spoken(&host), vec!["Team A scores!"]);

        pump(&mut seq, &mut rx, Duration::from_secs(600)).await;
        seq.speak("End of the first").await;
        assert_eq!(spoken(&host), vec!["Team A scores!", "End of the first"]);
        assert!(host.calls_for("media_player", "media_stop").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn horn_without_max_duration_is_stopped_by_fallback() {
        let (host, mut seq, mut rx) = setup(options());
        let limit = SequencerConfig::default().max_horn_duration();

        seq.on_goal(&horn_goal("Team A scores!")).await;
        seq.on_goal_horn(&horn("siren.mp3", None)).await;

        pump(&mut seq, &mut rx, limit - Duration::from_millis(100)).await;
        assert!(seq.state().is_playing_horn());
        assert!(host.calls_for("media_player", "media_stop").is_empty());

        pump(&mut seq, &mut rx, Duration::from_millis(200)).await;
        let stops = host.calls_for("media_player", "media_stop");
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].data["entity_id"], ARENA);
        assert!(!seq.state().is_playing_horn());

        pump(&mut seq, &mut rx, Duration::from_secs(2)).await;
        assert_eq!(spoken(&host), vec!["Team A scores!"]);
    }

    #[tokio::test(start_paused = true)]
    async fn speak_is_noop_while_horn_plays() {
        let (host, mut seq, mut rx) = setup(options());

        seq.on_goal_horn(&horn("siren.mp3", None)).await;
        seq.speak("Period ends").await;
        assert!(spoken(&host).is_empty());
        assert!(seq.state().is_playing_horn());

        host.emit_state_change(ARENA, "playing", "idle", None);
        pump(&mut seq, &mut rx, Duration::from_secs(2)).await;
        assert!(spoken(&host).is_empty());
        assert!(!seq.state().is_playing_horn());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_horn_discards_previous_narration_and_watch() {
        let (host, mut seq, mut rx) = setup(options());

        seq.on_goal(&horn_goal("First goal")).await;
        seq.on_goal_horn(&horn("one.mp3", None)).await;
        assert_eq!(host.active_watch_count(), 1);

        seq.on_goal_horn(&horn("one.mp3", None)).await;
        assert_eq!(host.active_watch_count(), 1);
        assert_eq!(seq.state().pending_tts_message(), None);
        assert!(seq.state().suppress_next_completion());

        // The pre-empted horn's completion is swallowed.
        host.emit_state_change(ARENA, "playing", "idle", Some("one.mp3"));
        pump(&mut seq, &mut rx, Duration::from_millis(100)).await;
        assert!(seq.state().is_playing_horn());
        assert!(!seq.state().suppress_next_completion());

        host.emit_state_change(ARENA, "playing", "idle", Some("one.mp3"));
        pump(&mut seq, &mut rx, Duration::from_secs(2)).await;
        assert!(!seq.state().is_playing_horn());
        assert!(spoken(&host).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn only_latest_narration_survives_back_to_back_goals() {
        let (host, mut seq, mut rx) = setup(options());

        seq.on_goal(&horn_goal("First goal")).await;
        seq.on_goal_horn(&horn("one.mp3", None)).await;
        seq.on_goal(&horn_goal("Second goal")).await;
        seq.on_goal_horn(&horn("two.mp3", None)).await;

        host.emit_state_change(ARENA, "playing", "idle", Some("one.mp3"));
        pump(&mut seq, &mut rx, Duration::from_millis(100)).await;
        host.emit_state_change(ARENA, "idle", "playing", Some("two.mp3"));
        host.emit_state_change(ARENA, "playing", "idle", Some("two.mp3"));
        pump(&mut seq, &mut rx, Duration::from_secs(2)).await;

        assert_eq!(spoken(&host), vec!["Second goal"]);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_content_ids_are_not_a_completion() {
        let (host, mut seq, mut rx) = setup(options());

        seq.on_goal(&horn_goal("Goal!")).await;
        seq.on_goal_horn(&horn("siren.mp3", None)).await;

        host.emit_state_change(ARENA, "playing", "playing", Some("siren.mp3"));
        host.emit(StateChange {
            entity_id: ARENA.into(),
            old_state: Some(
                EntityState::new(ARENA, "playing").with_attribute("media_content_id", json!("radio")),
            ),
            new_state: Some(
                EntityState::new(ARENA, "idle").with_attribute("media_content_id", json!("siren.mp3")),
            ),
        });
        pump(&mut seq, &mut rx, Duration::from_secs(5)).await;
        assert!(seq.state().is_playing_horn());
        assert!(spoken(&host).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn grace_expiry_during_previous_horn_waits_for_its_completion() {
        let (host, mut seq, mut rx) = setup(options());

        seq.on_goal_horn(&horn("one.mp3", None)).await;
        seq.on_goal(&horn_goal("Late narration")).await;

        pump(&mut seq, &mut rx, Duration::from_secs(4)).await;
        assert!(spoken(&host).is_empty());
        assert_eq!(seq.state().pending_tts_message(), Some("Late narration"));

        host.emit_state_change(ARENA, "playing", "idle", None);
        pump(&mut seq, &mut rx, Duration::from_secs(2)).await;
        assert_eq!(spoken(&host), vec!["Late narration"]);
    }

    #[tokio::test(start_paused = true)]
    async fn horn_cue_without_audio_releases_narration() {
        let (host, mut seq, _rx) = setup(options());

        seq.on_goal(&horn_goal("Goal!")).await;
        seq.on_goal_horn(&GoalHornEvent::default()).await;

        assert_eq!(spoken(&host), vec!["Goal!"]);
        assert!(host.calls_for("media_player", "play_media").is_empty());
        assert!(!seq.state().is_playing_horn());
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_player_does_not_stop_the_others() {
        let (host, mut seq, _rx) = setup(EntryOptions {
            tts_devices: vec![DEN.into(), "media_player.kitchen".into()],
            tts_provider: None,
            tts_service: Some("google_translate_say".into()),
            ..options()
        });
        host.fail_for_entity(DEN);

        seq.speak("Puck drop").await;

        let calls = host.calls_for("tts", "google_translate_say");
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().any(|c| c.data["entity_id"] == "media_player.kitchen"));
        assert!(calls.iter().all(|c| c.data["message"] == "Puck drop"));
    }

    #[tokio::test(start_paused = true)]
    async fn speaking_cancels_deferred_narration() {
        let (host, mut seq, mut rx) = setup(options());

        seq.on_goal(&horn_goal("Deferred")).await;
        seq.speak("Period ends").await;
        pump(&mut seq, &mut rx, Duration::from_secs(5)).await;

        assert_eq!(spoken(&host), vec!["Period ends"]);
    }

    #[test]
    fn horn_expected_needs_team_cue_and_players() {
        let team = TeamOptions {
            goal_horn_with_music: Some(json!(true)),
            ..Default::default()
        };
        assert!(horn_expected(Some(&team), &options()));
        assert!(!horn_expected(None, &options()));
        assert!(!horn_expected(Some(&TeamOptions::default()), &options()));
        let no_players = EntryOptions {
            goal_horn_devices: Vec::new(),
            ..options()
        };
        assert!(!horn_expected(Some(&team), &no_players));
    }
}
