use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ExecutionId;

/// Phase a log record signals for its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogState {
    /// Run step `step_number` forward.
    StepExec,
    /// Compensate step `step_number`.
    StepCompensate,
    /// The execution finished; `step_error` carries the failure, if any.
    Complete,
    /// The compensation cascade reached step 0; the execution is rolled back.
    Abort,
}

impl LogState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogState::StepExec => "STEP_EXEC",
            LogState::StepCompensate => "STEP_COMPENSATE",
            LogState::Complete => "COMPLETE",
            LogState::Abort => "ABORT",
        }
    }

    /// Returns true for records that end an execution.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LogState::Complete)
    }
}

impl std::fmt::Display for LogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LogState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STEP_EXEC" => Ok(LogState::StepExec),
            "STEP_COMPENSATE" => Ok(LogState::StepCompensate),
            "COMPLETE" => Ok(LogState::Complete),
            "ABORT" => Ok(LogState::Abort),
            other => Err(format!("unknown log state: {other}")),
        }
    }
}

/// Uniqueness key of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogKey {
    pub execution_id: ExecutionId,
    pub step_number: u32,
    pub state: LogState,
}

impl std::fmt::Display for LogKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.execution_id, self.step_number, self.state)
    }
}

/// A single append-only record of saga progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// The saga execution this record belongs to.
    pub execution_id: ExecutionId,

    /// Name of the saga definition that owns the execution.
    pub saga_name: String,

    /// Step the record refers to. `Complete` records use the step count.
    pub step_number: u32,

    /// What the record signals.
    pub state: LogState,

    /// When the record was appended.
    pub time: DateTime<Utc>,

    /// Error produced by the step, carried forward through compensation.
    pub step_error: Option<String>,
}

impl LogRecord {
    pub fn new(
        execution_id: ExecutionId,
        saga_name: impl Into<String>,
        step_number: u32,
        state: LogState,
    ) -> Self {
        Self {
            execution_id,
            saga_name: saga_name.into(),
            step_number,
            state,
            time: Utc::now(),
            step_error: None,
        }
    }

    pub fn step_exec(execution_id: ExecutionId, saga_name: &str, step: u32) -> Self {
        Self::new(execution_id, saga_name, step, LogState::StepExec)
    }

    pub fn step_compensate(
        execution_id: ExecutionId,
        saga_name: &str,
        step: u32,
        error: Option<String>,
    ) -> Self {
        Self::new(execution_id, saga_name, step, LogState::StepCompensate).with_error(error)
    }

    pub fn abort(
        execution_id: ExecutionId,
        saga_name: &str,
        step: u32,
        error: Option<String>,
    ) -> Self {
        Self::new(execution_id, saga_name, step, LogState::Abort).with_error(error)
    }

    pub fn complete(
        execution_id: ExecutionId,
        saga_name: &str,
        step_count: u32,
        error: Option<String>,
    ) -> Self {
        Self::new(execution_id, saga_name, step_count, LogState::Complete).with_error(error)
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.step_error = error;
        self
    }

    pub fn key(&self) -> LogKey {
        LogKey {
            execution_id: self.execution_id,
            step_number: self.step_number,
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_round_trip_through_from_str() {
        for state in [
            LogState::StepExec,
            LogState::StepCompensate,
            LogState::Complete,
            LogState::Abort,
        ] {
            assert_eq!(state.as_str().parse::<LogState>().unwrap(), state);
        }
        assert!("NOPE".parse::<LogState>().is_err());
    }

    #[test]
    fn test_only_complete_is_terminal() {
        assert!(LogState::Complete.is_terminal());
        assert!(!LogState::Abort.is_terminal());
        assert!(!LogState::StepExec.is_terminal());
    }

    #[test]
    fn test_key_matches_record_fields() {
        let id = ExecutionId::new();
        let record = LogRecord::step_compensate(id, "transfer", 2, Some("boom".into()));
        let key = record.key();

        assert_eq!(key.execution_id, id);
        assert_eq!(key.step_number, 2);
        assert_eq!(key.state, LogState::StepCompensate);
        assert_eq!(record.step_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_serialized_state_uses_screaming_case() {
        let json = serde_json::to_string(&LogState::StepCompensate).unwrap();
        assert_eq!(json, "\"STEP_COMPENSATE\"");
    }
}
