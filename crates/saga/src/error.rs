//! Saga error types.

use std::time::Duration;

use common::ExecutionId;
use journal::JournalError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step failed; the execution was compensated and aborted.
    #[error("Saga execution {execution_id} aborted: {reason}")]
    Aborted {
        execution_id: ExecutionId,
        reason: String,
    },

    /// No `COMPLETE` record arrived within the play timeout.
    #[error("Saga execution {execution_id} did not complete within {timeout:?}")]
    Timeout {
        execution_id: ExecutionId,
        timeout: Duration,
    },

    /// The execution has no records in the log.
    #[error("Saga execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    /// The coordinator stopped waiting before the execution completed.
    #[error("Saga execution {0} was abandoned by the coordinator")]
    Abandoned(ExecutionId),

    /// A log record refers to a step the definition does not have.
    #[error("Saga '{saga}' has no step {step}")]
    UnknownStep { saga: String, step: u32 },

    /// Saga log error.
    #[error("Saga log error: {0}")]
    Journal(#[from] JournalError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
