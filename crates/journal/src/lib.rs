pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::ExecutionId;
pub use error::{JournalError, Result};
pub use memory::InMemorySagaLog;
pub use postgres::PostgresSagaLog;
pub use record::{LogKey, LogRecord, LogState};
pub use store::{SagaLog, SagaLogExt};
