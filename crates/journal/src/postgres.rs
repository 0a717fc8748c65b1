use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    ExecutionId, JournalError, LogKey, LogRecord, LogState, Result, store::SagaLog,
};

/// PostgreSQL-backed saga log implementation.
#[derive(Clone)]
pub struct PostgresSagaLog {
    pool: PgPool,
}

impl PostgresSagaLog {
    /// Creates a new PostgreSQL saga log.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<LogRecord> {
        let state: String = row.try_get("state")?;
        let step_number: i32 = row.try_get("step_number")?;

        Ok(LogRecord {
            execution_id: ExecutionId::from_uuid(row.try_get::<Uuid, _>("execution_id")?),
            saga_name: row.try_get("saga_name")?,
            step_number: u32::try_from(step_number)
                .map_err(|_| JournalError::Corrupt(format!("negative step {step_number}")))?,
            state: state.parse().map_err(JournalError::Corrupt)?,
            time: row.try_get("time")?,
            step_error: row.try_get("step_error")?,
        })
    }
}

#[async_trait]
impl SagaLog for PostgresSagaLog {
    async fn append(&self, record: LogRecord) -> Result<()> {
        let key = record.key();

        sqlx::query(
            r#"
            INSERT INTO saga_log (execution_id, saga_name, step_number, state, time, step_error)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.execution_id.as_uuid())
        .bind(&record.saga_name)
        .bind(record.step_number as i32)
        .bind(record.state.as_str())
        .bind(record.time)
        .bind(&record.step_error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            // A unique constraint violation means the signal was already consumed
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_execution_step_state")
            {
                return JournalError::DuplicateRecord(key);
            }
            JournalError::Database(e)
        })?;

        metrics::counter!("saga_log_records_appended").increment(1);
        Ok(())
    }

    async fn records_for_execution(&self, execution_id: ExecutionId) -> Result<Vec<LogRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT execution_id, saga_name, step_number, state, time, step_error
            FROM saga_log
            WHERE execution_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(execution_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn find(&self, key: LogKey) -> Result<Option<LogRecord>> {
        let row = sqlx::query(
            r#"
            SELECT execution_id, saga_name, step_number, state, time, step_error
            FROM saga_log
            WHERE execution_id = $1 AND step_number = $2 AND state = $3
            "#,
        )
        .bind(key.execution_id.as_uuid())
        .bind(key.step_number as i32)
        .bind(key.state.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn unfinished_executions(&self, saga_name: &str) -> Result<Vec<ExecutionId>> {
        let rows = sqlx::query(
            r#"
            SELECT execution_id, MIN(id) AS first_id
            FROM saga_log
            WHERE saga_name = $1
            GROUP BY execution_id
            HAVING COUNT(*) FILTER (WHERE state = $2) = 0
            ORDER BY first_id ASC
            "#,
        )
        .bind(saga_name)
        .bind(LogState::Complete.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Ok(ExecutionId::from_uuid(row.try_get::<Uuid, _>("execution_id")?)))
            .collect()
    }
}
