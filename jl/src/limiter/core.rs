//! Limiter implementation

use std::collections::VecDeque;
use std::fmt;
use std::fmt::Display;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::config::LimiterConfig;
use super::job::{Job, JobHandle, JobOutcome, QueuedJob, Rejection};
use super::state::{LimiterState, LimiterStats};

/// Internal state protected by mutex
struct LimiterInner {
    /// Jobs dispatched and not yet finished
    outstanding: usize,

    /// Jobs waiting for a slot, oldest first
    pending: VecDeque<Box<dyn QueuedJob>>,

    /// Statistics
    stats: LimiterStats,
}

struct Shared {
    capacity: Option<NonZeroUsize>,
    abort_on_error: bool,
    inner: Mutex<LimiterInner>,

    /// Mirror of `pending.len()`, readable without the lock
    queue_depth: AtomicUsize,

    next_id: AtomicU64,
}

/// Limits the number of async jobs running at once.
///
/// Jobs submitted while every slot is taken wait in a FIFO queue and are
/// started, oldest first, as running jobs finish. A limiter built with a
/// concurrency of 0 never queues and starts every job immediately.
///
/// `Limiter` is a cheap handle: clones share the same slots and queue.
/// Jobs are spawned onto the current Tokio runtime.
#[derive(Clone)]
pub struct Limiter {
    shared: Arc<Shared>,
}

impl Limiter {
    /// Create a limiter allowing `concurrency` jobs in flight (0 = unlimited)
    pub fn new(concurrency: usize) -> Self {
        Self::with_config(LimiterConfig::from(concurrency))
    }

    /// Create a limiter that never queues
    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Create a limiter from a full configuration
    pub fn with_config(config: LimiterConfig) -> Self {
        debug!(?config, "Limiter::with_config: called");
        Self {
            shared: Arc::new(Shared {
                capacity: config.capacity(),
                abort_on_error: config.abort_on_error,
                inner: Mutex::new(LimiterInner {
                    outstanding: 0,
                    pending: VecDeque::new(),
                    stats: LimiterStats::default(),
                }),
                queue_depth: AtomicUsize::new(0),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Submit a job, starting it now if a slot is free and queueing it otherwise.
    ///
    /// `job` is called with no arguments when the job is dispatched and must
    /// return the future to run. The returned handle resolves to that future's
    /// output, with its error wrapped in [`LimitError::Job`](crate::LimitError::Job).
    /// A panic in `job` or in its future is reported through the handle as well.
    pub fn submit<F, Fut, T, E>(&self, job: F) -> JobHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, "Limiter::submit: called");
        let (job, handle) = Job::new(id, job);
        let job: Box<dyn QueuedJob> = Box::new(job);

        if Handle::try_current().is_err() {
            warn!(id, "Limiter::submit: no Tokio runtime, rejecting job");
            job.reject(Rejection::NoRuntime);
            return handle;
        }

        let mut inner = self.lock();
        inner.stats.total_submitted += 1;

        if inner.pending.is_empty() && self.has_capacity(&inner) {
            debug!(id, outstanding = inner.outstanding, "Limiter::submit: slot free, dispatching");
            self.take_slot(&mut inner);
            drop(inner);
            self.dispatch(job);
        } else {
            debug!(id, "Limiter::submit: queuing");
            inner.pending.push_back(job);
            // Slots abandoned during a runtime shutdown leave free capacity behind a queue
            let ready = self.promote(&mut inner);
            self.publish_depth(&mut inner);
            drop(inner);
            for job in ready {
                self.dispatch(job);
            }
        }

        handle
    }

    /// Number of jobs waiting for a slot
    ///
    /// A point-in-time reading, useful for pausing an upstream producer.
    pub fn queue_depth(&self) -> usize {
        self.shared.queue_depth.load(Ordering::Acquire)
    }

    /// The concurrency limit, `None` when unlimited
    pub fn capacity(&self) -> Option<usize> {
        self.shared.capacity.map(NonZeroUsize::get)
    }

    /// Whether jobs run without a concurrency limit
    pub fn is_unlimited(&self) -> bool {
        self.shared.capacity.is_none()
    }

    /// Whether a failed job rejects everything still queued
    pub fn abort_on_error(&self) -> bool {
        self.shared.abort_on_error
    }

    /// Current slot usage
    pub fn state(&self) -> LimiterState {
        let inner = self.lock();
        LimiterState {
            capacity: self.capacity(),
            in_flight: inner.outstanding,
            queued: inner.pending.len(),
        }
    }

    /// Lifetime statistics
    pub fn stats(&self) -> LimiterStats {
        self.lock().stats.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LimiterInner> {
        // User code never runs under this lock, so a poisoned guard still holds consistent state
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_capacity(&self, inner: &LimiterInner) -> bool {
        match self.shared.capacity {
            Some(capacity) => inner.outstanding < capacity.get(),
            None => true,
        }
    }

    fn take_slot(&self, inner: &mut LimiterInner) {
        inner.outstanding += 1;
        inner.stats.total_dispatched += 1;
        inner.stats.peak_in_flight = inner.stats.peak_in_flight.max(inner.outstanding);
    }

    fn publish_depth(&self, inner: &mut LimiterInner) {
        let depth = inner.pending.len();
        self.shared.queue_depth.store(depth, Ordering::Release);
        inner.stats.peak_queue_depth = inner.stats.peak_queue_depth.max(depth);
    }

    /// Take slots for queued jobs, oldest first, while capacity allows
    fn promote(&self, inner: &mut LimiterInner) -> Vec<Box<dyn QueuedJob>> {
        let mut ready = Vec::new();
        while self.has_capacity(inner) {
            let Some(job) = inner.pending.pop_front() else {
                break;
            };
            self.take_slot(inner);
            ready.push(job);
        }
        ready
    }

    /// Start a job whose slot has already been taken. Must not hold the lock.
    fn dispatch(&self, job: Box<dyn QueuedJob>) {
        let id = job.id();
        let running = job.start(Slot::new(self.clone()));
        debug!(id, "Limiter::dispatch: spawning job");
        tokio::spawn(running);
    }

    /// Return a finished job's slot and refill free slots from the queue
    fn release(&self, outcome: JobOutcome) {
        let (ready, purged) = {
            let mut inner = self.lock();
            inner.outstanding = inner.outstanding.saturating_sub(1);
            inner.stats.total_completed += 1;

            let mut purged = None;
            if let JobOutcome::Failed(cause) = &outcome {
                inner.stats.total_failed += 1;
                if self.shared.abort_on_error && !inner.pending.is_empty() {
                    let jobs: Vec<_> = inner.pending.drain(..).collect();
                    inner.stats.total_aborted += jobs.len() as u64;
                    purged = Some((Arc::clone(cause), jobs));
                }
            }

            let ready = self.promote(&mut inner);
            self.publish_depth(&mut inner);

            debug!(
                outstanding = inner.outstanding,
                queued = inner.pending.len(),
                promoted = ready.len(),
                "Limiter::release: slot returned"
            );
            (ready, purged)
        };

        if let Some((cause, jobs)) = purged {
            warn!(count = jobs.len(), %cause, "Limiter::release: job failed, rejecting queued jobs");
            for job in jobs {
                job.reject(Rejection::Aborted(Arc::clone(&cause)));
            }
        }

        for job in ready {
            debug!(id = job.id(), "Limiter::release: promoting from queue");
            self.dispatch(job);
        }
    }

    /// Return the slot of a job whose task was dropped mid-flight.
    ///
    /// Only happens while the runtime shuts down, so the queue is left alone
    /// rather than spawning onto a dying runtime. The job never completed and
    /// is not counted in the stats. Anything still queued starts on the next
    /// `submit`.
    fn abandon(&self) {
        let mut inner = self.lock();
        inner.outstanding = inner.outstanding.saturating_sub(1);
        debug!(outstanding = inner.outstanding, "Limiter::abandon: job task dropped before finishing");
    }
}

impl fmt::Debug for Limiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Limiter")
            .field("capacity", &self.capacity())
            .field("abort_on_error", &self.abort_on_error())
            .field("queue_depth", &self.queue_depth())
            .finish()
    }
}

/// One unit of `outstanding`, handed back to the limiter exactly once
pub(crate) struct Slot {
    limiter: Option<Limiter>,
}

impl Slot {
    fn new(limiter: Limiter) -> Self {
        Self { limiter: Some(limiter) }
    }

    /// Release the slot with the job's outcome, draining the queue
    pub(crate) fn finish(mut self, outcome: JobOutcome) {
        if let Some(limiter) = self.limiter.take() {
            limiter.release(outcome);
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(limiter) = self.limiter.take() {
            limiter.abandon();
        }
    }
}
