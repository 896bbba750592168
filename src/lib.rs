//! Multiproc: run batches of independent jobs on a worker pool or inline,
//! with identical results either way.

pub mod config;
pub mod error;
pub mod worker;

pub use config::DispatchConfig;
pub use error::{ConfigError, DispatchError, Error, JobError};
pub use worker::{
    Callable, Dispatcher, FailureKind, Job, JobRecord, JobState, TaskFailure, WorkerPool,
};
