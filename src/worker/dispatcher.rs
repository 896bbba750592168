//! Dual-mode dispatcher.
//!
//! The same batch of jobs can run on a worker pool or inline in the caller's
//! context. Both modes return one record per job, in submission order, with
//! the same outcomes and task results; only timing and thread identity differ.

use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::worker::job::{Job, JobRecord};
use crate::worker::pool::{BlockingPool, WorkerPool};

/// Stateless job dispatcher over an injected worker pool.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<dyn WorkerPool>,
}

impl Dispatcher {
    /// Dispatcher backed by [`BlockingPool`].
    pub fn new() -> Self {
        Self::with_pool(Arc::new(BlockingPool::new()))
    }

    /// Dispatcher backed by a custom pool.
    pub fn with_pool(pool: Arc<dyn WorkerPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<dyn WorkerPool> {
        &self.pool
    }

    /// Execute every job and return their records in submission order.
    ///
    /// With `parallelize` and more than one job, jobs go to the pool with
    /// `worker_count` workers (0 means all available hardware threads).
    /// Otherwise they run one after the other on the calling task. A failed
    /// job never stops its siblings; inspect each record's state.
    pub async fn run(
        &self,
        jobs: Vec<Job>,
        parallelize: bool,
        worker_count: usize,
    ) -> Result<Vec<JobRecord>, DispatchError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let expected = jobs.len();
        let records = if parallelize && expected > 1 {
            let workers = resolve_worker_count(worker_count);
            tracing::info!(
                jobs = expected,
                workers = workers.get(),
                pool = self.pool.name(),
                "Dispatching jobs in parallel"
            );
            let records = self.pool.execute_all(jobs, workers).await?;
            if records.len() != expected {
                return Err(DispatchError::RecordCountMismatch {
                    pool: self.pool.name().to_string(),
                    expected,
                    actual: records.len(),
                });
            }
            records
        } else {
            tracing::info!(jobs = expected, "Running jobs sequentially");
            jobs.into_iter().map(Job::execute).collect::<Vec<_>>()
        };

        let failed = records.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            tracing::warn!(jobs = expected, failed, "Dispatch finished with failed jobs");
        } else {
            tracing::info!(jobs = expected, "Dispatch finished");
        }

        Ok(records)
    }

    /// [`Dispatcher::run`] with settings taken from a [`DispatchConfig`].
    pub async fn run_with_config(
        &self,
        jobs: Vec<Job>,
        config: &DispatchConfig,
    ) -> Result<Vec<JobRecord>, DispatchError> {
        self.run(jobs, config.parallelize, config.worker_count).await
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pool", &self.pool.name())
            .finish()
    }
}

/// Effective worker count: `worker_count` itself, or every available hardware
/// thread when it is 0.
pub fn resolve_worker_count(worker_count: usize) -> NonZeroUsize {
    NonZeroUsize::new(worker_count).unwrap_or_else(|| {
        std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
    })
}
