//! Decoding of tagged Pusher messages into [`GameEvent`]s.
//!
//! Pusher delivers the `data` field as a JSON-encoded string; inline objects
//! are accepted as well. Keys listed as required must be present but may be
//! `null`. Unknown event tags decode to `Ok(None)`.

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use super::{
    DecodedEvent, EventKind, GameEvent, GoalEvent, GoalHornEvent, NarrationEvent, Rgb, TeamColors,
    TeamOptions,
};

/// Errors produced while decoding an event payload.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// The payload is not valid JSON or misses a field the event requires.
    #[error("malformed {event} payload: {reason}")]
    MalformedPayload { event: String, reason: String },
}

impl DecodeError {
    fn malformed(kind: EventKind, reason: impl ToString) -> Self {
        Self::MalformedPayload {
            event: kind.as_str().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Present-but-nullable field. Without `#[serde(default)]` a missing key fails.
fn required<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

#[derive(Deserialize)]
struct RawGoal {
    #[serde(deserialize_with = "required")]
    natural_text: Option<String>,
    #[serde(deserialize_with = "required")]
    team: Option<RawTeam>,
    #[serde(default)]
    already_triggered_from_score_change: Option<bool>,
}

#[derive(Deserialize)]
struct RawGoalHorn {
    #[serde(rename = "audioFile", deserialize_with = "required")]
    audio_file: Option<String>,
    #[serde(rename = "maxDuration", default)]
    max_duration: Option<f64>,
}

#[derive(Deserialize)]
struct RawNarration {
    #[serde(deserialize_with = "required")]
    natural_text: Option<String>,
    #[serde(default)]
    team: Option<RawTeam>,
}

#[derive(Deserialize)]
struct RawTeam {
    #[serde(default)]
    options: Option<RawTeamOptions>,
}

#[derive(Deserialize)]
struct RawTeamOptions {
    #[serde(default)]
    primary_color_rgb: Option<Rgb>,
    #[serde(default)]
    secondary_color_rgb: Option<Rgb>,
    #[serde(default)]
    alternate_color_rgb: Option<Rgb>,
    #[serde(default)]
    goal_horn: Option<Value>,
    #[serde(default)]
    goal_horn_with_music: Option<Value>,
}

impl RawTeam {
    fn into_options(self) -> Option<TeamOptions> {
        self.options.map(|o| TeamOptions {
            colors: TeamColors {
                primary: o.primary_color_rgb,
                secondary: o.secondary_color_rgb,
                alternate: o.alternate_color_rgb,
            },
            goal_horn: o.goal_horn,
            goal_horn_with_music: o.goal_horn_with_music,
        })
    }
}

/// Converts a duration in seconds, ignoring zero, negative and non-finite values.
fn seconds(value: f64) -> Option<Duration> {
    if value > 0.0 {
        Duration::try_from_secs_f64(value).ok()
    } else {
        None
    }
}

/// Decodes the `data` of a Pusher event tagged `tag`.
///
/// # Returns
/// `Ok(None)` for unknown tags, the decoded event otherwise.
///
/// # Errors
/// [`DecodeError::MalformedPayload`] if the payload is not a JSON object or a
/// required key is missing.
pub fn decode(tag: &str, data: &Value) -> Result<Option<DecodedEvent>, DecodeError> {
    let Some(kind) = EventKind::from_tag(tag) else {
        log::debug!("[Decoder] Ignoring unknown event '{}'", tag);
        return Ok(None);
    };

    let payload = match data {
        Value::String(text) => {
            serde_json::from_str::<Value>(text).map_err(|e| DecodeError::malformed(kind, e))?
        }
        other => other.clone(),
    };

    if !payload.is_object() {
        return Err(DecodeError::malformed(kind, "payload is not an object"));
    }

    let event = match kind {
        EventKind::Goal => {
            let raw: RawGoal = parse(kind, &payload)?;
            GameEvent::Goal(GoalEvent {
                natural_text: raw.natural_text,
                team: raw.team.and_then(RawTeam::into_options),
                already_triggered_from_score_change: raw
                    .already_triggered_from_score_change
                    .unwrap_or(false),
            })
        }
        EventKind::GoalHorn => {
            let raw: RawGoalHorn = parse(kind, &payload)?;
            GameEvent::GoalHorn(GoalHornEvent {
                audio_file: raw.audio_file.filter(|f| !f.is_empty()),
                max_duration: raw.max_duration.and_then(seconds),
            })
        }
        EventKind::PeriodStart => GameEvent::PeriodStart(narration(kind, &payload)?),
        EventKind::PeriodEnd => GameEvent::PeriodEnd(narration(kind, &payload)?),
        EventKind::GameStart => GameEvent::GameStart(narration(kind, &payload)?),
        EventKind::GameEnd => GameEvent::GameEnd(narration(kind, &payload)?),
    };

    Ok(Some(DecodedEvent { event, payload }))
}

fn parse<T: for<'de> Deserialize<'de>>(kind: EventKind, payload: &Value) -> Result<T, DecodeError> {
    T::deserialize(payload).map_err(|e| DecodeError::malformed(kind, e))
}

fn narration(kind: EventKind, payload: &Value) -> Result<NarrationEvent, DecodeError> {
    let raw: RawNarration = parse(kind, payload)?;
    Ok(NarrationEvent {
        natural_text: raw.natural_text,
        team: raw.team.and_then(RawTeam::into_options),
    })
}
