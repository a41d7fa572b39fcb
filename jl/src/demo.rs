//! Simulated workload for the `jl` binary
//!
//! Each job sleeps for a fixed delay and reports when it starts and finishes,
//! so the limiter's queueing can be watched from the command line.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::LimitError;
use crate::limiter::Limiter;

/// Progress notification from a simulated job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemoEvent {
    Started { job: usize, queued: usize },
    Finished { job: usize, ok: bool, queued: usize },
}

/// Callback receiving [`DemoEvent`]s
pub type Observer = Arc<dyn Fn(DemoEvent) + Send + Sync>;

/// What to simulate
#[derive(Debug, Clone)]
pub struct DemoPlan {
    /// Number of jobs, named `job 1` through `job N`
    pub jobs: usize,

    /// Time each job takes
    pub delay: Duration,

    /// 1-based job numbers that fail instead of succeeding
    pub fail: Vec<usize>,
}

impl DemoPlan {
    fn fails(&self, job: usize) -> bool {
        self.fail.contains(&job)
    }
}

/// Outcome of [`run_jobs`]
#[derive(Debug, Clone)]
pub struct DemoReport {
    /// Per-job results in submission order
    pub results: Vec<Result<String, String>>,
    pub peak_in_flight: usize,
    pub peak_queue_depth: usize,
}

async fn simulated_job(
    limiter: Limiter,
    job: usize,
    delay: Duration,
    fail: bool,
    observer: Observer,
) -> Result<String, String> {
    observer(DemoEvent::Started {
        job,
        queued: limiter.queue_depth(),
    });
    tokio::time::sleep(delay).await;
    observer(DemoEvent::Finished {
        job,
        ok: !fail,
        queued: limiter.queue_depth(),
    });

    if fail {
        Err(format!("job {} failed", job))
    } else {
        Ok(format!("job {}", job))
    }
}

/// Submit every job individually and wait for all of them
pub async fn run_jobs(limiter: &Limiter, plan: &DemoPlan, observer: Observer) -> DemoReport {
    debug!(?plan, "run_jobs: called");

    let handles: Vec<_> = (1..=plan.jobs)
        .map(|job| {
            let limiter_for_job = limiter.clone();
            let observer = Arc::clone(&observer);
            let delay = plan.delay;
            let fail = plan.fails(job);
            limiter.submit(move || simulated_job(limiter_for_job, job, delay, fail, observer))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.map_err(|e| e.to_string()));
    }

    let stats = limiter.stats();
    DemoReport {
        results,
        peak_in_flight: stats.peak_in_flight,
        peak_queue_depth: stats.peak_queue_depth,
    }
}

/// Run the jobs through [`Limiter::map`], failing fast on the first error
pub async fn map_jobs(
    limiter: &Limiter,
    plan: &DemoPlan,
    observer: Observer,
) -> Result<Vec<String>, LimitError<String>> {
    debug!(?plan, "map_jobs: called");

    let limiter_for_jobs = limiter.clone();
    let plan_for_jobs = plan.clone();
    limiter
        .map(1..=plan.jobs, move |job| {
            simulated_job(
                limiter_for_jobs.clone(),
                job,
                plan_for_jobs.delay,
                plan_for_jobs.fails(job),
                Arc::clone(&observer),
            )
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_observer() -> (Observer, Arc<Mutex<Vec<DemoEvent>>>) {
        let events: Arc<Mutex<Vec<DemoEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let observer: Observer = Arc::new(move |event: DemoEvent| sink.lock().unwrap().push(event));
        (observer, events)
    }

    #[tokio::test]
    async fn test_run_jobs_reports_results_in_order() {
        let limiter = Limiter::new(5);
        let plan = DemoPlan {
            jobs: 9,
            delay: Duration::from_millis(20),
            fail: vec![],
        };
        let (observer, events) = recording_observer();

        let report = run_jobs(&limiter, &plan, observer).await;

        let expected: Vec<Result<String, String>> = (1..=9).map(|i| Ok(format!("job {}", i))).collect();
        assert_eq!(report.results, expected);
        assert_eq!(report.peak_in_flight, 5);
        assert_eq!(report.peak_queue_depth, 4);
        assert_eq!(events.lock().unwrap().len(), 18);
    }

    #[tokio::test]
    async fn test_run_jobs_keeps_going_after_failure() {
        let limiter = Limiter::new(2);
        let plan = DemoPlan {
            jobs: 4,
            delay: Duration::from_millis(5),
            fail: vec![2],
        };
        let (observer, _events) = recording_observer();

        let report = run_jobs(&limiter, &plan, observer).await;

        assert_eq!(report.results[1], Err("job 2 failed".to_string()));
        assert_eq!(report.results[3], Ok("job 4".to_string()));
    }

    #[tokio::test]
    async fn test_map_jobs_fails_fast() {
        let limiter = Limiter::new(2);
        let plan = DemoPlan {
            jobs: 10,
            delay: Duration::from_millis(5),
            fail: vec![1],
        };
        let (observer, events) = recording_observer();

        let err = map_jobs(&limiter, &plan, observer).await.unwrap_err();
        assert_eq!(err.to_string(), "job 1 failed");

        tokio::time::sleep(Duration::from_millis(30)).await;
        let started = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, DemoEvent::Started { .. }))
            .count();
        assert!(started < plan.jobs);
    }
}
