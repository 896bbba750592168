//! Jobs: ordered normal tasks, a catch policy, and forgiveness tasks that
//! replace the rest of the normal sequence when a caught failure occurs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::JobError;
use crate::worker::failure::{FailureKind, TaskFailure};
use crate::worker::state::{JobState, StateTracker, StateTransition};
use crate::worker::task::{Callable, Task, TaskRecord};

/// Build-time description of a job.
///
/// A job is populated through the `append_*` calls and then consumed by
/// [`Job::execute`], which returns a read-only [`JobRecord`]. Cloning a job
/// gives an independent copy with the same id, which is how the same batch can
/// be run twice and compared.
#[derive(Debug, Clone)]
pub struct Job {
    job_id: Uuid,
    label: Option<String>,
    normal_tasks: Vec<Task>,
    catch_policy: CatchPolicy,
    forgiveness_tasks: Vec<Task>,
}

/// Failure kinds that send a job into forgiveness.
#[derive(Debug, Clone, Default)]
struct CatchPolicy {
    kinds: Vec<FailureKind>,
    every: bool,
}

impl CatchPolicy {
    /// Add an already validated kind, ignoring duplicates.
    fn insert(&mut self, kind: FailureKind) {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
    }

    fn catches(&self, kind: &FailureKind) -> bool {
        self.every || self.kinds.contains(kind)
    }
}

impl Job {
    /// Create an empty job.
    pub fn new() -> Self {
        Self {
            job_id: Uuid::new_v4(),
            label: None,
            normal_tasks: Vec::new(),
            catch_policy: CatchPolicy::default(),
            forgiveness_tasks: Vec::new(),
        }
    }

    /// Create an empty job with a human-readable label.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new()
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn append_normal_task(&mut self, callable: Callable, arguments: Vec<Value>) {
        self.normal_tasks.push(Task::new(callable, arguments));
    }

    pub fn clear_normal_tasks(&mut self) {
        self.normal_tasks.clear();
    }

    pub fn append_forgiveness_task(&mut self, callable: Callable, arguments: Vec<Value>) {
        self.forgiveness_tasks.push(Task::new(callable, arguments));
    }

    pub fn clear_forgiveness_tasks(&mut self) {
        self.forgiveness_tasks.clear();
    }

    /// Register a failure kind the job intercepts. Registering a kind twice is
    /// a no-op.
    pub fn append_exception_to_catch(&mut self, kind: FailureKind) -> Result<(), JobError> {
        kind.validate()?;
        self.catch_policy.insert(kind);
        Ok(())
    }

    /// Register several kinds at once. Nothing is registered if any kind is
    /// invalid.
    pub fn append_exceptions_to_catch(
        &mut self,
        kinds: impl IntoIterator<Item = FailureKind>,
    ) -> Result<(), JobError> {
        let kinds: Vec<FailureKind> = kinds.into_iter().collect();
        for kind in &kinds {
            kind.validate()?;
        }
        for kind in kinds {
            self.catch_policy.insert(kind);
        }
        Ok(())
    }

    /// Intercept every failure raised by a normal task, whatever its kind.
    pub fn catch_every_failure(&mut self) {
        self.catch_policy.every = true;
    }

    /// Forget all registered kinds, including a previous `catch_every_failure`.
    pub fn clear_exceptions(&mut self) {
        self.catch_policy = CatchPolicy::default();
    }

    /// Whether a failure of this kind would trigger forgiveness.
    pub fn is_catchable(&self, kind: &FailureKind) -> bool {
        self.catch_policy.catches(kind)
    }

    pub fn normal_tasks(&self) -> &[Task] {
        &self.normal_tasks
    }

    pub fn forgiveness_tasks(&self) -> &[Task] {
        &self.forgiveness_tasks
    }

    pub fn exceptions_to_catch(&self) -> &[FailureKind] {
        &self.catch_policy.kinds
    }

    /// Run the job to a terminal state.
    ///
    /// Normal tasks run in order. The first failure stops them: if its kind is
    /// catchable the forgiveness tasks run in order in place of the remaining
    /// normal tasks, otherwise the job fails. A failing forgiveness task is
    /// never caught.
    pub fn execute(self) -> JobRecord {
        let Job {
            job_id,
            label,
            normal_tasks,
            catch_policy,
            forgiveness_tasks,
        } = self;
        let mut tracker = StateTracker::new();

        tracker.transition_to(JobState::Running, None);
        tracing::debug!(
            job_id = %job_id,
            normal_tasks = normal_tasks.len(),
            forgiveness_tasks = forgiveness_tasks.len(),
            "Job starting"
        );

        let (normal_records, interrupted) = run_in_order(TaskPhase::Normal, normal_tasks);

        let mut caught = None;
        let mut failure = None;
        let forgiveness_records = match interrupted {
            None => {
                tracker.transition_to(JobState::CompletedAllNormal, None);
                skip_all(forgiveness_tasks)
            }
            Some(interruption) if catch_policy.catches(&interruption.failure.kind) => {
                tracing::warn!(
                    job_id = %job_id,
                    task = interruption.task_name.as_deref().unwrap_or_default(),
                    error = %interruption.failure,
                    "Caught failure, running forgiveness tasks"
                );
                tracker.transition_to(JobState::Forgiving, Some(interruption.failure.to_string()));
                caught = Some(interruption);

                let (records, forgiveness_failure) =
                    run_in_order(TaskPhase::Forgiveness, forgiveness_tasks);
                match forgiveness_failure {
                    None => tracker.transition_to(JobState::CompletedWithForgiveness, None),
                    Some(fatal) => {
                        tracing::error!(
                            job_id = %job_id,
                            task = fatal.task_name.as_deref().unwrap_or_default(),
                            error = %fatal.failure,
                            "Forgiveness task failed"
                        );
                        tracker.transition_to(
                            JobState::FailedUnhandled,
                            Some(fatal.failure.to_string()),
                        );
                        failure = Some(fatal);
                    }
                }
                records
            }
            Some(unhandled) => {
                tracing::error!(
                    job_id = %job_id,
                    task = unhandled.task_name.as_deref().unwrap_or_default(),
                    error = %unhandled.failure,
                    "Unhandled failure"
                );
                tracker.transition_to(
                    JobState::FailedUnhandled,
                    Some(unhandled.failure.to_string()),
                );
                failure = Some(unhandled);
                skip_all(forgiveness_tasks)
            }
        };

        tracing::debug!(job_id = %job_id, state = %tracker.state, "Job finished");

        JobRecord {
            job_id,
            label,
            state: tracker.state,
            normal_tasks: normal_records,
            forgiveness_tasks: forgiveness_records,
            caught,
            failure,
            transitions: tracker.transitions,
            started_at: tracker.started_at,
            completed_at: tracker.completed_at,
        }
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

/// Run tasks in order until one raises. Tasks after the failing one are
/// recorded as not run.
fn run_in_order(phase: TaskPhase, tasks: Vec<Task>) -> (Vec<TaskRecord>, Option<JobFailure>) {
    let mut records = Vec::with_capacity(tasks.len());
    let mut failure = None;
    let mut tasks = tasks.into_iter().enumerate();

    for (index, task) in tasks.by_ref() {
        let record = task.execute();
        if let Some(raised) = record.failure() {
            failure = Some(JobFailure {
                phase,
                task_index: Some(index),
                task_name: Some(record.name().to_string()),
                failure: raised.clone(),
            });
            records.push(record);
            break;
        }
        records.push(record);
    }

    records.extend(tasks.map(|(_, task)| task.skip()));
    (records, failure)
}

fn skip_all(tasks: Vec<Task>) -> Vec<TaskRecord> {
    tasks.into_iter().map(Task::skip).collect()
}

/// Where in a job a failure was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// A normal task.
    Normal,
    /// A forgiveness task.
    Forgiveness,
    /// Outside any task: the worker running the job was lost.
    Dispatch,
}

/// A failure together with the task that raised it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFailure {
    pub phase: TaskPhase,
    /// Index within the phase's task list; unset for dispatch failures.
    pub task_index: Option<usize>,
    pub task_name: Option<String>,
    pub failure: TaskFailure,
}

/// Immutable outcome of one job execution.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    job_id: Uuid,
    label: Option<String>,
    state: JobState,
    normal_tasks: Vec<TaskRecord>,
    forgiveness_tasks: Vec<TaskRecord>,
    caught: Option<JobFailure>,
    failure: Option<JobFailure>,
    transitions: Vec<StateTransition>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Record for a job whose worker disappeared before reporting back.
    pub(crate) fn lost(job_id: Uuid, label: Option<String>, reason: String) -> Self {
        let mut tracker = StateTracker::new();
        tracker.transition_to(JobState::Running, None);
        tracker.transition_to(JobState::FailedUnhandled, Some(reason.clone()));

        Self {
            job_id,
            label,
            state: tracker.state,
            normal_tasks: Vec::new(),
            forgiveness_tasks: Vec::new(),
            caught: None,
            failure: Some(JobFailure {
                phase: TaskPhase::Dispatch,
                task_index: None,
                task_name: None,
                failure: TaskFailure::new(FailureKind::WorkerLost, reason),
            }),
            transitions: tracker.transitions,
            started_at: tracker.started_at,
            completed_at: tracker.completed_at,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }

    pub fn normal_tasks(&self) -> &[TaskRecord] {
        &self.normal_tasks
    }

    pub fn forgiveness_tasks(&self) -> &[TaskRecord] {
        &self.forgiveness_tasks
    }

    /// Return values of the normal tasks, in order.
    pub fn normal_results(&self) -> Vec<Option<&Value>> {
        self.normal_tasks.iter().map(TaskRecord::result).collect()
    }

    /// Return values of the forgiveness tasks, in order.
    pub fn forgiveness_results(&self) -> Vec<Option<&Value>> {
        self.forgiveness_tasks.iter().map(TaskRecord::result).collect()
    }

    /// The failure that triggered forgiveness, if any.
    pub fn caught(&self) -> Option<&JobFailure> {
        self.caught.as_ref()
    }

    /// The failure that made the job fail, if any.
    pub fn failure(&self) -> Option<&JobFailure> {
        self.failure.as_ref()
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Wall-clock time the job took.
    pub fn elapsed(&self) -> Option<Duration> {
        let (start, end) = (self.started_at?, self.completed_at?);
        end.signed_duration_since(start).to_std().ok()
    }

    /// Surface an unhandled failure as an error.
    pub fn check(&self) -> Result<&Self, JobError> {
        match &self.failure {
            None => Ok(self),
            Some(f) if f.phase == TaskPhase::Forgiveness => Err(JobError::ForgivenessFailed {
                id: self.job_id,
                failure: f.failure.clone(),
            }),
            Some(f) => Err(JobError::Unhandled {
                id: self.job_id,
                failure: f.failure.clone(),
            }),
        }
    }

    /// Owned variant of [`JobRecord::check`].
    pub fn into_result(self) -> Result<Self, JobError> {
        self.check()?;
        Ok(self)
    }

    /// True when both records describe the same job with the same outcome and
    /// the same per-task results. Timestamps are ignored.
    pub fn results_match(&self, other: &JobRecord) -> bool {
        self.job_id == other.job_id
            && self.state == other.state
            && self.normal_tasks == other.normal_tasks
            && self.forgiveness_tasks == other.forgiveness_tasks
            && self.caught == other.caught
            && self.failure == other.failure
    }
}
