//! Saga execution state, folded from log records.

use chrono::{DateTime, Utc};
use common::ExecutionId;
use journal::{LogRecord, LogState};
use serde::{Deserialize, Serialize};

use crate::state::SagaState;

/// Read model of one saga execution.
///
/// Built by replaying the execution's log records in order; it is never
/// persisted on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaExecution {
    execution_id: Option<ExecutionId>,
    saga_name: String,
    state: SagaState,
    /// Step of the most recent exec/compensate signal.
    current_step: u32,
    /// Steps whose forward action has been signalled, in order.
    executed_steps: Vec<u32>,
    /// Steps whose compensation has been signalled, in order.
    compensated_steps: Vec<u32>,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl SagaExecution {
    /// Replays records into a fresh execution.
    pub fn from_records(records: impl IntoIterator<Item = LogRecord>) -> Self {
        let mut execution = Self::default();
        for record in records {
            execution.apply(record);
        }
        execution
    }

    pub fn apply(&mut self, record: LogRecord) {
        if self.execution_id.is_none() {
            self.execution_id = Some(record.execution_id);
            self.saga_name = record.saga_name.clone();
            self.started_at = Some(record.time);
        }

        match record.state {
            LogState::StepExec => {
                self.state = SagaState::Running;
                self.current_step = record.step_number;
                self.executed_steps.push(record.step_number);
            }
            LogState::StepCompensate => {
                self.state = SagaState::Compensating;
                self.current_step = record.step_number;
                self.compensated_steps.push(record.step_number);
                if self.error.is_none() {
                    self.error = record.step_error;
                }
            }
            LogState::Abort => {
                // State changes on COMPLETE
            }
            LogState::Complete => {
                self.state = if record.step_error.is_some() {
                    SagaState::Aborted
                } else {
                    SagaState::Completed
                };
                self.error = record.step_error;
                self.finished_at = Some(record.time);
            }
        }
    }
}

// Query methods
impl SagaExecution {
    pub fn execution_id(&self) -> Option<ExecutionId> {
        self.execution_id
    }

    pub fn saga_name(&self) -> &str {
        &self.saga_name
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn executed_steps(&self) -> &[u32] {
        &self.executed_steps
    }

    pub fn compensated_steps(&self) -> &[u32] {
        &self.compensated_steps
    }

    /// Returns the first step error, if the execution failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
}
