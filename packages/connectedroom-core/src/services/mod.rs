//! Per-entry services driven by the coordinator.
//!
//! # Module Structure
//!
//! - `coordinator` - Single-consumer queue owning all per-entry state
//! - `dispatcher` - Bus fan-out, de-duplication and light color sync
//! - `sequencer` - Horn/TTS playback sequencing
//! - `command_relay` - Remote `execute`/`get_state` device commands
//! - `timer` - Single-occupancy timer slots

pub mod command_relay;
pub mod coordinator;
pub mod dispatcher;
pub mod sequencer;
pub mod timer;

pub use command_relay::{CommandRelay, DeviceAction};
pub use coordinator::{Coordinator, CoordinatorMessage};
pub use dispatcher::Dispatcher;
pub use sequencer::{PlaybackState, Sequencer, SequencerEvent, TimerKind};
pub use timer::TimerSlot;

use futures::future::join_all;
use serde_json::Value;

use crate::host::ServiceCaller;

/// Calls `domain.service` once per entity, concurrently.
///
/// A failure for one entity is logged and never affects the others.
/// Returns the number of failed calls.
pub(crate) async fn call_per_entity<F>(
    services: &dyn ServiceCaller,
    component: &str,
    domain: &str,
    service: &str,
    entities: &[String],
    data: F,
) -> usize
where
    F: Fn(&str) -> Value,
{
    let futures: Vec<_> = entities
        .iter()
        .map(|entity| {
            let payload = data(entity);
            async move {
                services
                    .call_service(domain, service, None, payload)
                    .await
                    .map_err(|e| (entity.as_str(), e))
            }
        })
        .collect();

    let failures: Vec<_> = join_all(futures)
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect();

    for (entity, error) in &failures {
        log::warn!("[{}] {}.{} failed for {}: {}", component, domain, service, entity, error);
    }
    failures.len()
}
