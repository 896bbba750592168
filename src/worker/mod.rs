//! Worker system: job execution and dual-mode dispatch.
//!
//! Core components:
//! - `failure`: Tagged task failures (`FailureKind`, `TaskFailure`)
//! - `task`: Named callables, tasks and their records
//! - `state`: Job state machine (Pending → Running → Forgiving → terminal)
//! - `job`: Job description, catch policy and the resulting `JobRecord`
//! - `pool`: Worker pool capability (blocking thread pool, inline stub)
//! - `dispatcher`: Runs a batch in parallel or sequentially with identical results

pub mod dispatcher;
pub mod failure;
pub mod job;
pub mod pool;
pub mod state;
pub mod task;

pub use dispatcher::{Dispatcher, resolve_worker_count};
pub use failure::{FailureKind, TaskFailure};
pub use job::{Job, JobFailure, JobRecord, TaskPhase};
pub use pool::{BlockingPool, InlinePool, WorkerPool};
pub use state::{JobState, StateTransition};
pub use task::{Callable, Task, TaskRecord, TaskStatus};
