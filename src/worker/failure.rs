//! Tagged failures raised by task callables.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Kind of a task failure.
///
/// Jobs intercept failures by kind: a failure is caught when its kind is in the
/// job's catchable set. `Custom` covers application-specific kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Division or remainder by zero.
    ZeroDivision,
    /// Arithmetic overflow or a capacity limit was hit.
    Overflow,
    /// An argument had the wrong shape or value.
    InvalidArgument,
    /// A looked-up item does not exist.
    NotFound,
    /// An I/O operation failed.
    Io,
    /// Input could not be parsed.
    Parse,
    /// The callable panicked.
    Panic,
    /// The worker running the job disappeared before reporting back.
    WorkerLost,
    /// Application-defined kind.
    Custom(String),
}

impl FailureKind {
    /// Build a custom kind.
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// Check that the kind can be registered as catchable.
    pub fn validate(&self) -> Result<(), JobError> {
        match self {
            Self::Custom(name) if name.trim().is_empty() => Err(JobError::InvalidFailureKind {
                reason: "custom failure kinds need a non-blank name".to_string(),
            }),
            Self::WorkerLost => Err(JobError::InvalidFailureKind {
                reason: "worker_lost is raised by the dispatcher, never by a task".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ZeroDivision => "zero_division",
            Self::Overflow => "overflow",
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::Io => "io",
            Self::Parse => "parse",
            Self::Panic => "panic",
            Self::WorkerLost => "worker_lost",
            Self::Custom(name) => name.as_str(),
        };
        write!(f, "{s}")
    }
}

/// A failure raised by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TaskFailure {
    /// What went wrong, used for catch matching.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ZeroDivision, message)
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Overflow, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidArgument, message)
    }

    /// Failure for a callable that panicked. Extracts the panic message when
    /// it is a string.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "callable panicked".to_string()
        };
        Self::new(FailureKind::Panic, message)
    }
}

impl From<serde_json::Error> for TaskFailure {
    fn from(e: serde_json::Error) -> Self {
        Self::new(FailureKind::Parse, e.to_string())
    }
}

impl From<std::io::Error> for TaskFailure {
    fn from(e: std::io::Error) -> Self {
        Self::new(FailureKind::Io, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_custom_kind_rejected() {
        assert!(FailureKind::custom("  ").validate().is_err());
        assert!(FailureKind::custom("quota").validate().is_ok());
        assert!(FailureKind::ZeroDivision.validate().is_ok());
    }

    #[test]
    fn worker_lost_not_catchable() {
        assert!(matches!(
            FailureKind::WorkerLost.validate(),
            Err(JobError::InvalidFailureKind { .. })
        ));
    }

    #[test]
    fn failure_display() {
        let failure = TaskFailure::zero_division("1 / 0");
        assert_eq!(failure.to_string(), "zero_division: 1 / 0");
        let custom = TaskFailure::new(FailureKind::custom("quota"), "over limit");
        assert_eq!(custom.to_string(), "quota: over limit");
    }

    #[test]
    fn panic_payload_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        let failure = TaskFailure::from_panic(payload.as_ref());
        assert_eq!(failure.kind, FailureKind::Panic);
        assert_eq!(failure.message, "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(TaskFailure::from_panic(payload.as_ref()).message, "bang");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(
            TaskFailure::from_panic(payload.as_ref()).message,
            "callable panicked"
        );
    }

    #[test]
    fn kind_serde_roundtrip() {
        let json = serde_json::to_string(&FailureKind::ZeroDivision).unwrap();
        assert_eq!(json, "\"zero_division\"");
        let parsed: FailureKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, FailureKind::ZeroDivision);
    }
}
