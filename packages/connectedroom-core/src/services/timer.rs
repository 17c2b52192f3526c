//! Single-occupancy timer slots.
//!
//! A [`TimerSlot`] holds at most one live timer. Arming it cancels whatever
//! was armed before. Expiry is delivered as a message on the owner's queue,
//! tagged with the slot generation; the owner hands that generation back to
//! [`TimerSlot::take_expired`], which rejects expiries of timers that were
//! cancelled or replaced after their message was already queued.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

#[derive(Debug, Default)]
pub struct TimerSlot {
    generation: u64,
    handle: Option<AbortHandle>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Arms the slot. After `delay`, `make(generation)` is sent to `queue`.
    pub fn arm<M, F>(&mut self, delay: Duration, queue: &mpsc::Sender<M>, make: F)
    where
        M: Send + 'static,
        F: FnOnce(u64) -> M + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let queue = queue.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the owner shut down.
            let _ = queue.send(make(generation)).await;
        });
        self.handle = Some(task.abort_handle());
    }

    /// Cancels the live timer, if any. Queued expiries become stale.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Accepts an expiry if it belongs to the live timer, disarming the slot.
    pub fn take_expired(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && generation == self.generation {
            self.handle = None;
            true
        } else {
            false
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
