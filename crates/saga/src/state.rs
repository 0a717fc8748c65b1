//! Saga execution state machine.

use serde::{Deserialize, Serialize};

/// The state of a saga execution, derived from its log records.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          └──► Compensating ──► Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// No record has been appended for the execution.
    #[default]
    NotStarted,

    /// Forward steps are being executed.
    Running,

    /// A step failed and the compensation cascade is running.
    Compensating,

    /// All steps ran forward successfully (terminal state).
    Completed,

    /// The cascade finished after a failure (terminal state).
    Aborted,
}

impl SagaState {
    /// Returns true while the execution still has work to do.
    pub fn is_active(&self) -> bool {
        matches!(self, SagaState::Running | SagaState::Compensating)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Aborted => "Aborted",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
