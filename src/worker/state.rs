//! Job state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job has not run yet.
    Pending,
    /// Normal tasks are executing.
    Running,
    /// A catchable failure stopped the normal tasks; forgiveness tasks are executing.
    Forgiving,
    /// Every normal task returned.
    CompletedAllNormal,
    /// A caught failure was recovered by the forgiveness tasks.
    CompletedWithForgiveness,
    /// A failure was not caught, or a forgiveness task raised.
    FailedUnhandled,
}

impl JobState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, target),
            (Pending, Running) |
            (Running, CompletedAllNormal) | (Running, Forgiving) | (Running, FailedUnhandled) |
            (Forgiving, CompletedWithForgiveness) | (Forgiving, FailedUnhandled)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CompletedAllNormal | Self::CompletedWithForgiveness | Self::FailedUnhandled
        )
    }

    /// Terminal and not failed.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::CompletedAllNormal | Self::CompletedWithForgiveness)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Forgiving => "forgiving",
            Self::CompletedAllNormal => "completed_all_normal",
            Self::CompletedWithForgiveness => "completed_with_forgiveness",
            Self::FailedUnhandled => "failed_unhandled",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state.
    pub from: JobState,
    /// New state.
    pub to: JobState,
    /// When the transition occurred.
    pub timestamp: DateTime<Utc>,
    /// Reason for the transition.
    pub reason: Option<String>,
}

/// Tracks the state of one job execution along with its history.
#[derive(Debug, Clone)]
pub(crate) struct StateTracker {
    pub(crate) state: JobState,
    pub(crate) transitions: Vec<StateTransition>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
}

impl StateTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: JobState::Pending,
            transitions: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to `new_state`, recording the transition.
    ///
    /// Callers only ever request edges allowed by
    /// [`JobState::can_transition_to`].
    pub(crate) fn transition_to(&mut self, new_state: JobState, reason: Option<String>) {
        debug_assert!(
            self.state.can_transition_to(new_state),
            "cannot transition from {} to {new_state}",
            self.state
        );

        let now = Utc::now();
        self.transitions.push(StateTransition {
            from: self.state,
            to: new_state,
            timestamp: now,
            reason,
        });
        self.state = new_state;

        match new_state {
            JobState::Running => self.started_at = Some(now),
            s if s.is_terminal() => self.completed_at = Some(now),
            _ => {}
        }
    }
}
