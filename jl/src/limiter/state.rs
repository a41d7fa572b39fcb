//! Snapshot types for observing the limiter

/// Counters kept by the limiter over its lifetime
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LimiterStats {
    pub total_submitted: u64,
    pub total_dispatched: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_aborted: u64,
    pub peak_in_flight: usize,
    pub peak_queue_depth: usize,
}

/// A snapshot of the state of the [`Limiter`](super::Limiter).
///
/// May be stale as soon as it is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterState {
    pub(crate) capacity: Option<usize>,
    pub(crate) in_flight: usize,
    pub(crate) queued: usize,
}

impl LimiterState {
    /// The concurrency limit, `None` when unlimited
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// The number of jobs in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// The number of jobs waiting for a slot
    pub fn queued(&self) -> usize {
        self.queued
    }

    /// Free slots, `None` when unlimited
    pub fn available(&self) -> Option<usize> {
        self.capacity.map(|c| c.saturating_sub(self.in_flight))
    }
}
