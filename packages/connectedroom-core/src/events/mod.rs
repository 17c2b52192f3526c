//! Game events delivered by the ConnectedRoom push service.
//!
//! This module provides:
//! - [`GameEvent`] and its per-kind payloads
//! - [`decode`] to turn a tagged Pusher message into a [`DecodedEvent`]
//! - [`BusEvent`], the notification fanned out on the local bus

mod decoder;

pub use decoder::{decode, DecodeError};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kinds of game events the service pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Goal,
    GoalHorn,
    PeriodStart,
    PeriodEnd,
    GameStart,
    GameEnd,
}

impl EventKind {
    /// All kinds, in the order their handlers are registered.
    pub const ALL: [EventKind; 6] = [
        EventKind::Goal,
        EventKind::GoalHorn,
        EventKind::PeriodStart,
        EventKind::PeriodEnd,
        EventKind::GameStart,
        EventKind::GameEnd,
    ];

    /// Wire name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Goal => "goal",
            Self::GoalHorn => "goal_horn",
            Self::PeriodStart => "period_start",
            Self::PeriodEnd => "period_end",
            Self::GameStart => "game_start",
            Self::GameEnd => "game_end",
        }
    }

    /// Maps a wire name to a kind. Unknown names return `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An RGB triple. Accepts `{"r":..,"g":..,"b":..}` or `[r, g, b]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RgbRepr")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RgbRepr {
    Object { r: u8, g: u8, b: u8 },
    Array([u8; 3]),
}

impl From<RgbRepr> for Rgb {
    fn from(repr: RgbRepr) -> Self {
        match repr {
            RgbRepr::Object { r, g, b } => Rgb { r, g, b },
            RgbRepr::Array([r, g, b]) => Rgb { r, g, b },
        }
    }
}

/// Light group roles a team color can be applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorRole {
    Primary,
    Secondary,
    Alternate,
}

/// Team colors carried by an event. Any role may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamColors {
    pub primary: Option<Rgb>,
    pub secondary: Option<Rgb>,
    pub alternate: Option<Rgb>,
}

impl TeamColors {
    /// Present colors with their role, primary first.
    pub fn iter(&self) -> impl Iterator<Item = (ColorRole, Rgb)> {
        [
            (ColorRole::Primary, self.primary),
            (ColorRole::Secondary, self.secondary),
            (ColorRole::Alternate, self.alternate),
        ]
        .into_iter()
        .filter_map(|(role, rgb)| rgb.map(|c| (role, c)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Per-team options attached to scoring and narration events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamOptions {
    pub colors: TeamColors,
    /// Set when the team has a horn cue configured.
    pub goal_horn: Option<Value>,
    /// Set when the team has a horn-with-music cue configured.
    pub goal_horn_with_music: Option<Value>,
}

impl TeamOptions {
    /// Returns true if the team announces a horn cue for its goals.
    pub fn announces_horn(&self) -> bool {
        self.goal_horn.is_some() || self.goal_horn_with_music.is_some()
    }
}

/// A goal was scored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalEvent {
    pub natural_text: Option<String>,
    pub team: Option<TeamOptions>,
    /// The same goal was already signalled by an earlier score-change event.
    pub already_triggered_from_score_change: bool,
}

/// The horn cue for the latest goal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalHornEvent {
    pub audio_file: Option<String>,
    pub max_duration: Option<Duration>,
}

/// Period and game boundary events; they only carry narration and colors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NarrationEvent {
    pub natural_text: Option<String>,
    pub team: Option<TeamOptions>,
}

/// A decoded game event.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Goal(GoalEvent),
    GoalHorn(GoalHornEvent),
    PeriodStart(NarrationEvent),
    PeriodEnd(NarrationEvent),
    GameStart(NarrationEvent),
    GameEnd(NarrationEvent),
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Goal(_) => EventKind::Goal,
            Self::GoalHorn(_) => EventKind::GoalHorn,
            Self::PeriodStart(_) => EventKind::PeriodStart,
            Self::PeriodEnd(_) => EventKind::PeriodEnd,
            Self::GameStart(_) => EventKind::GameStart,
            Self::GameEnd(_) => EventKind::GameEnd,
        }
    }

    /// Narration text, if the event carries any.
    pub fn natural_text(&self) -> Option<&str> {
        match self {
            Self::Goal(e) => e.natural_text.as_deref(),
            Self::GoalHorn(_) => None,
            Self::PeriodStart(e) | Self::PeriodEnd(e) | Self::GameStart(e) | Self::GameEnd(e) => {
                e.natural_text.as_deref()
            }
        }
    }

    /// Team options, if the event carries any.
    pub fn team(&self) -> Option<&TeamOptions> {
        match self {
            Self::Goal(e) => e.team.as_ref(),
            Self::GoalHorn(_) => None,
            Self::PeriodStart(e) | Self::PeriodEnd(e) | Self::GameStart(e) | Self::GameEnd(e) => {
                e.team.as_ref()
            }
        }
    }
}

/// A decoded event together with its raw payload (forwarded on the bus).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub event: GameEvent,
    pub payload: Value,
}

impl DecodedEvent {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

/// Notification fired on the local bus, once per registered device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub device_id: String,
    /// Id of the originating config entry.
    pub entity_id: String,
    pub payload: Value,
}
