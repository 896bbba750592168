//! Task types: a named callable, its positional arguments, and the record it
//! leaves behind once executed.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::worker::failure::TaskFailure;

/// Signature shared by every task callable.
pub type TaskFn = dyn Fn(&[Value]) -> Result<Value, TaskFailure> + Send + Sync;

/// A named, shareable reference to invocable code.
///
/// Cloning is cheap; clones point at the same function.
#[derive(Clone)]
pub struct Callable {
    name: Arc<str>,
    func: Arc<TaskFn>,
}

impl Callable {
    /// Wrap a function under a display name.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, TaskFailure> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    /// Name used in logs and records.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function. A panic is turned into a `FailureKind::Panic`
    /// failure so it stays inside the task that raised it.
    pub fn invoke(&self, arguments: &[Value]) -> Result<Value, TaskFailure> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.func)(arguments))) {
            Ok(result) => result,
            Err(payload) => Err(TaskFailure::from_panic(payload.as_ref())),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callable").field(&self.name).finish()
    }
}

/// One unit of work: a callable plus the positional arguments it gets.
#[derive(Debug, Clone)]
pub struct Task {
    callable: Callable,
    arguments: Vec<Value>,
}

impl Task {
    pub fn new(callable: Callable, arguments: Vec<Value>) -> Self {
        Self {
            callable,
            arguments,
        }
    }

    pub fn callable_name(&self) -> &str {
        self.callable.name()
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Run the task. Consumes it, so a task runs at most once.
    ///
    /// Failures are never handled here: they are recorded and handed back to
    /// the owning job, which applies its catch policy.
    pub fn execute(self) -> TaskRecord {
        tracing::trace!(task = %self.callable.name(), "Executing task");
        let status = match self.callable.invoke(&self.arguments) {
            Ok(value) => TaskStatus::Returned { value },
            Err(failure) => TaskStatus::Raised { failure },
        };
        TaskRecord {
            name: self.callable.name().to_string(),
            arguments: self.arguments,
            status,
        }
    }

    /// Record for a task that was never reached.
    pub fn skip(self) -> TaskRecord {
        TaskRecord {
            name: self.callable.name().to_string(),
            arguments: self.arguments,
            status: TaskStatus::NotRun,
        }
    }
}

/// What happened to a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task was never executed.
    NotRun,
    /// The callable returned normally. `Value::Null` stands for "no value".
    Returned { value: Value },
    /// The callable raised.
    Raised { failure: TaskFailure },
}

/// Read-only outcome of a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    name: String,
    arguments: Vec<Value>,
    #[serde(flatten)]
    status: TaskStatus,
}

impl TaskRecord {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    /// The returned value, unset when the task raised or never ran.
    pub fn result(&self) -> Option<&Value> {
        match &self.status {
            TaskStatus::Returned { value } => Some(value),
            _ => None,
        }
    }

    /// The failure the task raised, if any.
    pub fn failure(&self) -> Option<&TaskFailure> {
        match &self.status {
            TaskStatus::Raised { failure } => Some(failure),
            _ => None,
        }
    }

    pub fn was_executed(&self) -> bool {
        !matches!(self.status, TaskStatus::NotRun)
    }
}
