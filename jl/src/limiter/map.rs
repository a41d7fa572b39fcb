//! Batch mapping through a limiter

use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tracing::debug;

use crate::error::LimitError;

use super::core::Limiter;

impl Limiter {
    /// Apply `mapper` to every item, at most `capacity` invocations at a time.
    ///
    /// Results come back in input order. The first failure (in the order
    /// failures happen, not by index) fails the whole batch: items that have
    /// not started by then are skipped without calling `mapper`, and items
    /// already running finish with their results discarded. A panicking
    /// `mapper` counts as a failure. The skip flag is local to this call, so
    /// the limiter stays usable afterwards.
    ///
    /// With `abort_on_error`, the batch still returns the failing item's own
    /// error rather than the `Aborted` rejections of the items it purged.
    pub async fn map<I, F, Fut, U, E>(&self, items: I, mapper: F) -> Result<Vec<U>, LimitError<E>>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        F: Fn(I::Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, E>> + Send + 'static,
        U: Send + 'static,
        E: Display + Send + 'static,
    {
        let failed = Arc::new(AtomicBool::new(false));
        let mapper = Arc::new(mapper);

        let handles: Vec<_> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let failed = Arc::clone(&failed);
                let mapper = Arc::clone(&mapper);
                self.submit(move || {
                    let running = if failed.load(Ordering::Acquire) {
                        debug!(index, "Limiter::map: batch already failed, skipping item");
                        None
                    } else {
                        // Mark the batch failed before the panic reaches the limiter
                        match panic::catch_unwind(AssertUnwindSafe(|| mapper(item))) {
                            Ok(running) => Some(running),
                            Err(payload) => {
                                failed.store(true, Ordering::Release);
                                panic::resume_unwind(payload);
                            }
                        }
                    };
                    async move {
                        let Some(running) = running else {
                            return Ok(None);
                        };
                        match AssertUnwindSafe(running).catch_unwind().await {
                            Ok(Ok(value)) => Ok(Some(value)),
                            Ok(Err(e)) => {
                                failed.store(true, Ordering::Release);
                                Err(e)
                            }
                            Err(payload) => {
                                failed.store(true, Ordering::Release);
                                panic::resume_unwind(payload)
                            }
                        }
                    }
                })
            })
            .collect();

        let total = handles.len();
        debug!(total, "Limiter::map: submitted batch");

        let mut settling: FuturesUnordered<_> = handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| handle.map(move |result| (index, result)))
            .collect();

        let mut slots: Vec<Option<U>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut aborted = None;
        while let Some((index, result)) = settling.next().await {
            match result {
                Ok(value) => slots[index] = value,
                // This batch's own failure purged the queue; its error settles right after
                Err(e @ LimitError::Aborted { .. }) if failed.load(Ordering::Acquire) => {
                    debug!(index, "Limiter::map: item aborted, waiting for the failing item");
                    aborted.get_or_insert(e);
                }
                Err(e) => {
                    failed.store(true, Ordering::Release);
                    debug!(index, error = %e, "Limiter::map: batch failed");
                    return Err(e);
                }
            }
        }

        if let Some(e) = aborted {
            return Err(e);
        }

        // Items are only skipped after a failure, and a failure returns above
        Ok(slots.into_iter().flatten().collect())
    }
}
