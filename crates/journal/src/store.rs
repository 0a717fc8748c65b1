use async_trait::async_trait;

use crate::{ExecutionId, LogKey, LogRecord, LogState, Result};

/// Core trait for saga log implementations.
///
/// The log is append-only. Records are unique per (execution, step, state);
/// appending a second record with the same key fails with
/// `DuplicateRecord`, which is how a signal is consumed at most once.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait SagaLog: Send + Sync {
    /// Appends a record.
    async fn append(&self, record: LogRecord) -> Result<()>;

    /// Retrieves all records of an execution in append order.
    async fn records_for_execution(&self, execution_id: ExecutionId) -> Result<Vec<LogRecord>>;

    /// Retrieves the record stored under `key`, if any.
    async fn find(&self, key: LogKey) -> Result<Option<LogRecord>>;

    /// Lists executions of a saga that have no `Complete` record yet.
    async fn unfinished_executions(&self, saga_name: &str) -> Result<Vec<ExecutionId>>;
}

/// Extension trait providing convenience methods for saga logs.
#[async_trait]
pub trait SagaLogExt: SagaLog {
    /// Returns the most recently appended record of an execution.
    async fn last_record(&self, execution_id: ExecutionId) -> Result<Option<LogRecord>> {
        Ok(self.records_for_execution(execution_id).await?.pop())
    }

    /// Returns the `Complete` record of an execution, if it finished.
    async fn completion(&self, execution_id: ExecutionId) -> Result<Option<LogRecord>> {
        Ok(self
            .records_for_execution(execution_id)
            .await?
            .into_iter()
            .find(|r| r.state == LogState::Complete))
    }
}

// Blanket implementation for all SagaLog implementations
impl<T: SagaLog + ?Sized> SagaLogExt for T {}
