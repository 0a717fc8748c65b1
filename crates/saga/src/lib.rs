//! Generic saga coordinator.
//!
//! A saga is an ordered list of steps, each with a forward action and a
//! compensating action. Progress is recorded exclusively as append-only
//! records in a [`journal::SagaLog`]:
//!
//! ```text
//! STEP_EXEC(0) ──► STEP_EXEC(1) ──► ... ──► COMPLETE
//!      │                │
//!      └── error ──► STEP_COMPENSATE(i) ──► STEP_COMPENSATE(i-1) ──► ... ──► ABORT ──► COMPLETE(error)
//! ```
//!
//! Every appended record is handed to a task pool which runs the matching
//! step action and appends the next record. The coordinator keeps no other
//! durable state, so an execution can be resumed from its last record.

pub mod coordinator;
pub mod error;
pub mod execution;
pub mod state;
pub mod step;

pub use coordinator::{DEFAULT_PLAY_TIMEOUT, SagaCoordinator};
pub use error::SagaError;
pub use execution::SagaExecution;
pub use state::SagaState;
pub use step::{FnAction, SagaDefinition, Step, StepAction, StepContext, StepError, action};
