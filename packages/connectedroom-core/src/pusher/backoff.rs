//! Reconnect delay calculation.

use std::time::Duration;

use rand::Rng;

use super::protocol::ReconnectPolicy;
use crate::state::ReconnectConfig;

/// Delay before reconnect attempt `attempt` (0-based), with random jitter.
pub fn reconnect_delay(config: &ReconnectConfig, policy: ReconnectPolicy, attempt: u32) -> Duration {
    let jitter_ms = if config.jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=config.jitter_ms)
    };
    delay_with_jitter(config, policy, attempt, jitter_ms)
}

/// Deterministic part of [`reconnect_delay`]: `base + attempt * step + jitter`,
/// capped at `max_delay_ms`.
pub(crate) fn delay_with_jitter(
    config: &ReconnectConfig,
    policy: ReconnectPolicy,
    attempt: u32,
    jitter_ms: u64,
) -> Duration {
    if policy == ReconnectPolicy::Immediate {
        return Duration::from_millis(config.immediate_delay_ms);
    }

    let ms = config
        .base_delay_ms
        .saturating_add(u64::from(attempt).saturating_mul(config.step_ms))
        .saturating_add(jitter_ms)
        .min(config.max_delay_ms);
    Duration::from_millis(ms)
}
