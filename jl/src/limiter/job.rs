//! Queue entries and completion handles

use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{LimitError, panic_message};

use super::core::Slot;

/// How a dispatched job ended, as far as the drain loop cares
#[derive(Debug, Clone)]
pub(crate) enum JobOutcome {
    Succeeded,
    Failed(Arc<str>),
}

/// Why a job is completed without ever running
#[derive(Debug, Clone)]
pub(crate) enum Rejection {
    Aborted(Arc<str>),
    NoRuntime,
}

/// A submitted job with its value and error types erased so that jobs of any
/// type can wait in the same queue
pub(crate) trait QueuedJob: Send {
    fn id(&self) -> u64;

    /// Invoke the callable now and return the future that drives it.
    ///
    /// The slot is released before the result reaches the handle.
    fn start(self: Box<Self>, slot: Slot) -> BoxFuture<'static, ()>;

    /// Complete the handle without running the callable
    fn reject(self: Box<Self>, rejection: Rejection);
}

pub(crate) struct Job<F, T, E> {
    id: u64,
    make: F,
    tx: oneshot::Sender<Result<T, LimitError<E>>>,
}

impl<F, T, E> Job<F, T, E> {
    pub(crate) fn new(id: u64, make: F) -> (Self, JobHandle<T, E>) {
        let (tx, rx) = oneshot::channel();
        (Self { id, make, tx }, JobHandle { id, rx })
    }
}

impl<F, Fut, T, E> QueuedJob for Job<F, T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    fn id(&self) -> u64 {
        self.id
    }

    fn start(self: Box<Self>, slot: Slot) -> BoxFuture<'static, ()> {
        let Job { id, make, tx } = *self;

        // A panic here is the synchronous fault case: treat it like a failed future.
        let built = panic::catch_unwind(AssertUnwindSafe(make));

        async move {
            let result = match built {
                Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(LimitError::Job(e)),
                    Err(payload) => Err(LimitError::Panicked {
                        message: panic_message(payload),
                    }),
                },
                Err(payload) => Err(LimitError::Panicked {
                    message: panic_message(payload),
                }),
            };

            let outcome = match &result {
                Ok(_) => JobOutcome::Succeeded,
                Err(e) => JobOutcome::Failed(Arc::from(e.to_string())),
            };
            slot.finish(outcome);

            if tx.send(result).is_err() {
                debug!(id, "Job::start: handle dropped, result discarded");
            }
        }
        .boxed()
    }

    fn reject(self: Box<Self>, rejection: Rejection) {
        let Job { id, tx, .. } = *self;
        let err = match rejection {
            Rejection::Aborted(cause) => LimitError::Aborted { cause },
            Rejection::NoRuntime => LimitError::NoRuntime,
        };
        if tx.send(Err(err)).is_err() {
            debug!(id, "Job::reject: handle dropped");
        }
    }
}

/// Completion handle for a submitted job
///
/// Resolves to the job's value or to a [`LimitError`]. Dropping the handle
/// does not cancel the job; it still runs and its result is discarded.
#[derive(Debug)]
pub struct JobHandle<T, E> {
    id: u64,
    rx: oneshot::Receiver<Result<T, LimitError<E>>>,
}

impl<T, E> JobHandle<T, E> {
    /// Submission sequence number, unique per limiter
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T, E> Future for JobHandle<T, E> {
    type Output = Result<T, LimitError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(LimitError::Cancelled)))
    }
}
