//! Error types for multiproc.

use uuid::Uuid;

use crate::worker::failure::TaskFailure;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Job-related errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error("Invalid failure kind: {reason}")]
    InvalidFailureKind { reason: String },

    #[error("Job {id} failed with an unhandled failure: {failure}")]
    Unhandled { id: Uuid, failure: TaskFailure },

    #[error("Job {id} failed while asking forgiveness: {failure}")]
    ForgivenessFailed { id: Uuid, failure: TaskFailure },
}

/// Errors raised by the dispatcher or its worker pool.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Worker for job #{index} was lost: {reason}")]
    WorkerLost { index: usize, reason: String },

    #[error("Worker pool {pool} returned {actual} records for {expected} jobs")]
    RecordCountMismatch {
        pool: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::failure::FailureKind;

    #[test]
    fn job_error_converts_into_top_level() {
        let err: Error = JobError::InvalidFailureKind {
            reason: "blank".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Job(_)));
        assert_eq!(err.to_string(), "Job error: Invalid failure kind: blank");
    }

    #[test]
    fn unhandled_error_mentions_failure() {
        let id = Uuid::new_v4();
        let err = JobError::Unhandled {
            id,
            failure: TaskFailure::new(FailureKind::Io, "disk gone"),
        };
        assert_eq!(
            err.to_string(),
            format!("Job {id} failed with an unhandled failure: io: disk gone")
        );
    }

    #[test]
    fn dispatch_error_display() {
        let err: Error = DispatchError::WorkerLost {
            index: 2,
            reason: "panicked".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Dispatch error: Worker for job #2 was lost: panicked"
        );

        let err = DispatchError::RecordCountMismatch {
            pool: "inline".to_string(),
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Worker pool inline returned 2 records for 3 jobs"
        );
    }
}
