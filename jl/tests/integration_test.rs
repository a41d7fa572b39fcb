//! Integration tests for joblimit
//!
//! These drive the limiter the way a caller would, measuring real
//! concurrency from inside the jobs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use joblimit::{Limiter, LimiterConfig};
use proptest::prelude::*;
use tokio::sync::Notify;

/// Counts jobs that are between start and finish
#[derive(Clone, Default)]
struct Tracker {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Tracker {
    async fn job<T>(self, value: T, ms: u64) -> Result<T, String> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(value)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

async fn run_tracked(limiter: &Limiter, jobs: usize, ms: u64) -> (Vec<String>, usize, usize) {
    let tracker = Tracker::default();
    let mut max_depth = 0;

    let handles: Vec<_> = (1..=jobs)
        .map(|i| {
            let tracker = tracker.clone();
            let handle = limiter.submit(move || tracker.job(format!("job {}", i), ms));
            max_depth = max_depth.max(limiter.queue_depth());
            handle
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.expect("job should succeed"));
    }
    (results, tracker.peak(), max_depth)
}

// =============================================================================
// Concurrency limits
// =============================================================================

#[tokio::test]
async fn test_limits_outstanding_jobs() {
    let limiter = Limiter::new(5);

    let (results, peak, _) = run_tracked(&limiter, 9, 50).await;

    assert_eq!(peak, 5);
    let expected: Vec<_> = (1..=9).map(|i| format!("job {}", i)).collect();
    assert_eq!(results, expected);
    assert_eq!(limiter.stats().peak_in_flight, 5);
}

#[tokio::test]
async fn test_no_queueing_at_exactly_the_limit() {
    let limiter = Limiter::new(5);

    let (_, peak, max_depth) = run_tracked(&limiter, 5, 30).await;

    assert_eq!(peak, 5);
    assert_eq!(max_depth, 0);
}

#[tokio::test]
async fn test_no_queueing_below_the_limit() {
    let limiter = Limiter::new(5);

    let (_, peak, max_depth) = run_tracked(&limiter, 4, 30).await;

    assert_eq!(peak, 4);
    assert_eq!(max_depth, 0);
}

#[tokio::test]
async fn test_zero_means_no_limit() {
    let limiter = Limiter::new(0);

    let (_, peak, max_depth) = run_tracked(&limiter, 9, 30).await;

    assert_eq!(peak, 9);
    assert_eq!(max_depth, 0);
    assert_eq!(limiter.capacity(), None);

    let tracker = Tracker::default();
    let mapped = limiter
        .map(0..9, {
            let tracker = tracker.clone();
            move |i| tracker.clone().job(i, 30)
        })
        .await
        .unwrap();
    assert_eq!(mapped, (0..9).collect::<Vec<_>>());
    assert_eq!(tracker.peak(), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_limit_holds_on_multi_thread_runtime() {
    let limiter = Limiter::new(3);

    let (results, peak, _) = run_tracked(&limiter, 24, 10).await;

    assert_eq!(results.len(), 24);
    assert!(peak <= 3, "peak {} exceeded capacity", peak);
    assert_eq!(limiter.state().in_flight(), 0);
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_queued_jobs_start_in_submission_order() {
    let limiter = Limiter::new(2);
    let gate = Arc::new(Notify::new());
    let started = Arc::new(Mutex::new(Vec::new()));

    // Two blockers hold both slots until released
    let blockers: Vec<_> = (0..2)
        .map(|_| {
            let gate = Arc::clone(&gate);
            limiter.submit(move || async move {
                gate.notified().await;
                Ok::<_, String>(0)
            })
        })
        .collect();

    let queued: Vec<_> = (1..=6)
        .map(|i| {
            let started = Arc::clone(&started);
            limiter.submit(move || {
                started.lock().unwrap().push(i);
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok::<_, String>(i)
                }
            })
        })
        .collect();
    assert_eq!(limiter.queue_depth(), 6);
    assert!(started.lock().unwrap().is_empty());

    // Let the blockers register before waking them
    tokio::time::sleep(Duration::from_millis(10)).await;
    gate.notify_waiters();

    for handle in blockers {
        handle.await.unwrap();
    }
    for handle in queued {
        handle.await.unwrap();
    }

    assert_eq!(*started.lock().unwrap(), vec![1, 2, 3, 4, 5, 6]);
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_sync_panic_keeps_limiter_usable() {
    let limiter = Limiter::new(1);

    let handle = limiter.submit(|| -> futures::future::Ready<Result<(), String>> { panic!("uh oh") });
    let err = handle.await.unwrap_err();
    assert_eq!(err.to_string(), "Job panicked: uh oh");

    let state = limiter.state();
    assert_eq!(state.in_flight(), 0);
    assert_eq!(state.available(), Some(1));

    let (results, _, _) = run_tracked(&limiter, 3, 1).await;
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn test_abort_on_error_through_map() {
    let limiter = Limiter::with_config(LimiterConfig::from(1).abort_on_error(true));

    let err = limiter
        .map(0..5u32, |n| async move {
            if n == 0 {
                Err("first item broke".to_string())
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap_err();

    assert_eq!(err.into_job().as_deref(), Some("first item broke"));
    assert_eq!(limiter.queue_depth(), 0);
    assert_eq!(limiter.stats().total_aborted, 4);
}

#[tokio::test]
async fn test_reuse_after_failed_map() {
    let limiter = Limiter::new(2);

    let failed = limiter
        .map(vec![0u32, 1, 2, 3], |n| async move {
            if n == 1 {
                Err(format!("rejecting number {}", n))
            } else {
                Ok(n)
            }
        })
        .await;
    assert_eq!(failed.unwrap_err().into_job().as_deref(), Some("rejecting number 1"));

    let ok = limiter
        .map(vec![0u32, 1, 2, 3], |n| async move { Ok::<_, String>(n * 2) })
        .await
        .unwrap();
    assert_eq!(ok, vec![0, 2, 4, 6]);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_in_flight_never_exceeds_capacity(capacity in 1usize..6, jobs in 0usize..24, ms in 0u64..4) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        let (results, peak, max_depth) = runtime.block_on(async {
            let limiter = Limiter::new(capacity);
            run_tracked(&limiter, jobs, ms).await
        });

        prop_assert_eq!(results.len(), jobs);
        prop_assert!(peak <= capacity);
        prop_assert_eq!(max_depth, jobs.saturating_sub(capacity));
    }
}
