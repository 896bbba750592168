//! Worker pools: run a batch of jobs across up to K workers and hand the
//! records back in submission order.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::error::DispatchError;
use crate::worker::job::{Job, JobRecord};

/// Capability to execute independent jobs on parallel workers.
///
/// Implementations must return exactly one record per job, in the order the
/// jobs were given, whatever order they finish in.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Execute every job on at most `workers` concurrent workers.
    async fn execute_all(
        &self,
        jobs: Vec<Job>,
        workers: NonZeroUsize,
    ) -> Result<Vec<JobRecord>, DispatchError>;
}

/// Pool backed by tokio's blocking thread pool.
///
/// Each job is moved onto its own blocking thread and holds one of `workers`
/// semaphore permits until it reaches a terminal state.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingPool;

impl BlockingPool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkerPool for BlockingPool {
    fn name(&self) -> &str {
        "blocking"
    }

    async fn execute_all(
        &self,
        jobs: Vec<Job>,
        workers: NonZeroUsize,
    ) -> Result<Vec<JobRecord>, DispatchError> {
        let permits = Arc::new(Semaphore::new(workers.get()));
        let mut slots = Vec::with_capacity(jobs.len());
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            // `permits` is never closed, so acquiring only ever waits.
            let permit = permits.clone().acquire_owned().await.ok();

            slots.push((job.job_id(), job.label().map(str::to_string)));
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job.execute()
            }));
        }

        // join_all yields outputs in the order of `handles`, which is submission order.
        let outcomes = join_all(handles).await;

        let records = slots
            .into_iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, ((job_id, label), outcome))| match outcome {
                Ok(record) => record,
                Err(e) => {
                    let err = DispatchError::WorkerLost {
                        index,
                        reason: e.to_string(),
                    };
                    tracing::error!(job_id = %job_id, "{err}");
                    JobRecord::lost(job_id, label, err.to_string())
                }
            })
            .collect();

        Ok(records)
    }
}

/// Deterministic pool that runs every job on the calling task, one after the
/// other, and remembers the worker counts it was asked for.
#[derive(Debug, Default)]
pub struct InlinePool {
    requests: Mutex<Vec<usize>>,
}

impl InlinePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker counts received so far, one entry per `execute_all` call.
    pub fn requested_workers(&self) -> Vec<usize> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WorkerPool for InlinePool {
    fn name(&self) -> &str {
        "inline"
    }

    async fn execute_all(
        &self,
        jobs: Vec<Job>,
        workers: NonZeroUsize,
    ) -> Result<Vec<JobRecord>, DispatchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(workers.get());
        }
        Ok(jobs.into_iter().map(Job::execute).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::worker::state::JobState;
    use crate::worker::task::Callable;

    fn sleeper(millis: u64) -> Job {
        let mut job = Job::labeled(format!("sleep-{millis}"));
        job.append_normal_task(
            Callable::new("sleep", |args| {
                let millis = args.first().and_then(Value::as_u64).unwrap_or_default();
                std::thread::sleep(Duration::from_millis(millis));
                Ok(json!(millis))
            }),
            vec![json!(millis)],
        );
        job
    }

    fn workers(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_pool_preserves_submission_order() {
        let jobs = vec![sleeper(60), sleeper(5), sleeper(30), sleeper(0)];
        let ids: Vec<_> = jobs.iter().map(Job::job_id).collect();

        let records = BlockingPool::new()
            .execute_all(jobs, workers(4))
            .await
            .unwrap();

        let returned: Vec<_> = records.iter().map(JobRecord::job_id).collect();
        assert_eq!(returned, ids);
        let results: Vec<_> = records
            .iter()
            .map(|r| r.normal_results()[0].cloned())
            .collect();
        assert_eq!(
            results,
            vec![Some(json!(60)), Some(json!(5)), Some(json!(30)), Some(json!(0))]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_pool_bounds_concurrency() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<Job> = (0..6)
            .map(|_| {
                let active = active.clone();
                let peak = peak.clone();
                let mut job = Job::new();
                job.append_normal_task(
                    Callable::new("track", move |_| {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(Value::Null)
                    }),
                    Vec::new(),
                );
                job
            })
            .collect();

        let records = BlockingPool::new()
            .execute_all(jobs, workers(2))
            .await
            .unwrap();

        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| r.state() == JobState::CompletedAllNormal));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_permit_runs_every_job_in_turn() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<Job> = (0..5)
            .map(|i| {
                let active = active.clone();
                let peak = peak.clone();
                let mut job = Job::labeled(format!("turn-{i}"));
                job.append_normal_task(
                    Callable::new("turn", move |_| {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(5));
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(json!(i))
                    }),
                    Vec::new(),
                );
                job
            })
            .collect();

        let records = BlockingPool::new()
            .execute_all(jobs, workers(1))
            .await
            .unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        let results: Vec<_> = records
            .iter()
            .map(|r| r.normal_results()[0].cloned())
            .collect();
        assert_eq!(results, (0..5).map(|i| Some(json!(i))).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn inline_pool_records_requests() {
        let pool = InlinePool::new();
        let records = pool
            .execute_all(vec![sleeper(0), sleeper(1)], workers(3))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label(), Some("sleep-0"));
        assert_eq!(pool.requested_workers(), vec![3]);
        assert_eq!(pool.name(), "inline");
    }

    #[tokio::test]
    async fn empty_batch_yields_no_records() {
        let records = BlockingPool::new()
            .execute_all(Vec::new(), workers(1))
            .await
            .unwrap();
        assert!(records.is_empty());
    }
}
