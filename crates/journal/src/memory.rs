use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    ExecutionId, JournalError, LogKey, LogRecord, LogState, Result, store::SagaLog,
};

#[derive(Default)]
struct LogInner {
    records: Vec<LogRecord>,
    keys: HashSet<LogKey>,
}

/// In-memory saga log implementation for testing.
///
/// Provides the same interface and key uniqueness as the PostgreSQL
/// implementation.
#[derive(Clone, Default)]
pub struct InMemorySagaLog {
    inner: Arc<RwLock<LogInner>>,
}

impl InMemorySagaLog {
    /// Creates a new empty in-memory saga log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Clears every record.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.records.clear();
        inner.keys.clear();
    }
}

#[async_trait]
impl SagaLog for InMemorySagaLog {
    async fn append(&self, record: LogRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        let key = record.key();

        if !inner.keys.insert(key) {
            return Err(JournalError::DuplicateRecord(key));
        }
        inner.records.push(record);
        metrics::counter!("saga_log_records_appended").increment(1);
        Ok(())
    }

    async fn records_for_execution(&self, execution_id: ExecutionId) -> Result<Vec<LogRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn find(&self, key: LogKey) -> Result<Option<LogRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.records.iter().find(|r| r.key() == key).cloned())
    }

    async fn unfinished_executions(&self, saga_name: &str) -> Result<Vec<ExecutionId>> {
        let inner = self.inner.read().await;

        let finished: HashSet<ExecutionId> = inner
            .records
            .iter()
            .filter(|r| r.state == LogState::Complete)
            .map(|r| r.execution_id)
            .collect();

        let mut seen = HashSet::new();
        Ok(inner
            .records
            .iter()
            .filter(|r| r.saga_name == saga_name && !finished.contains(&r.execution_id))
            .filter(|r| seen.insert(r.execution_id))
            .map(|r| r.execution_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SagaLogExt;

    #[tokio::test]
    async fn append_and_read_back_in_order() {
        let log = InMemorySagaLog::new();
        let id = ExecutionId::new();

        log.append(LogRecord::step_exec(id, "transfer", 0)).await.unwrap();
        log.append(LogRecord::step_exec(id, "transfer", 1)).await.unwrap();

        let records = log.records_for_execution(id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].step_number, 0);
        assert_eq!(records[1].step_number, 1);
        assert_eq!(log.record_count().await, 2);
    }

    #[tokio::test]
    async fn duplicate_key_is_rejected() {
        let log = InMemorySagaLog::new();
        let id = ExecutionId::new();

        log.append(LogRecord::step_exec(id, "transfer", 0)).await.unwrap();
        let result = log.append(LogRecord::step_exec(id, "transfer", 0)).await;

        assert!(matches!(result, Err(JournalError::DuplicateRecord(_))));
        assert_eq!(log.record_count().await, 1);
    }

    #[tokio::test]
    async fn same_step_different_phase_is_allowed() {
        let log = InMemorySagaLog::new();
        let id = ExecutionId::new();

        log.append(LogRecord::step_exec(id, "transfer", 0)).await.unwrap();
        log.append(LogRecord::step_compensate(id, "transfer", 0, Some("x".into())))
            .await
            .unwrap();

        let found = log
            .find(LogKey {
                execution_id: id,
                step_number: 0,
                state: LogState::StepCompensate,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.step_error.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn executions_are_isolated() {
        let log = InMemorySagaLog::new();
        let a = ExecutionId::new();
        let b = ExecutionId::new();

        log.append(LogRecord::step_exec(a, "transfer", 0)).await.unwrap();
        log.append(LogRecord::step_exec(b, "transfer", 0)).await.unwrap();

        assert_eq!(log.records_for_execution(a).await.unwrap().len(), 1);
        assert_eq!(log.records_for_execution(b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unfinished_executions_skip_completed_ones() {
        let log = InMemorySagaLog::new();
        let done = ExecutionId::new();
        let running = ExecutionId::new();
        let other_saga = ExecutionId::new();

        log.append(LogRecord::step_exec(done, "transfer", 0)).await.unwrap();
        log.append(LogRecord::complete(done, "transfer", 1, None)).await.unwrap();
        log.append(LogRecord::step_exec(running, "transfer", 0)).await.unwrap();
        log.append(LogRecord::step_exec(running, "transfer", 1)).await.unwrap();
        log.append(LogRecord::step_exec(other_saga, "refund", 0)).await.unwrap();

        let unfinished = log.unfinished_executions("transfer").await.unwrap();
        assert_eq!(unfinished, vec![running]);
    }

    #[tokio::test]
    async fn ext_helpers() {
        let log = InMemorySagaLog::new();
        let id = ExecutionId::new();

        assert!(log.last_record(id).await.unwrap().is_none());

        log.append(LogRecord::step_exec(id, "transfer", 0)).await.unwrap();
        assert!(log.completion(id).await.unwrap().is_none());

        log.append(LogRecord::complete(id, "transfer", 1, Some("failed".into())))
            .await
            .unwrap();

        let last = log.last_record(id).await.unwrap().unwrap();
        assert_eq!(last.state, LogState::Complete);
        let completion = log.completion(id).await.unwrap().unwrap();
        assert_eq!(completion.step_error.as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn clear_removes_keys_too() {
        let log = InMemorySagaLog::new();
        let id = ExecutionId::new();

        log.append(LogRecord::step_exec(id, "transfer", 0)).await.unwrap();
        log.clear().await;
        assert_eq!(log.record_count().await, 0);
        log.append(LogRecord::step_exec(id, "transfer", 0)).await.unwrap();
    }
}
