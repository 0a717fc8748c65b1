//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p journal --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use journal::{
    ExecutionId, JournalError, LogKey, LogRecord, LogState, PostgresSagaLog, SagaLog, SagaLogExt,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_saga_log_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh log with its own pool and a cleared table
async fn get_test_log() -> PostgresSagaLog {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE saga_log")
        .execute(&pool)
        .await
        .unwrap();

    PostgresSagaLog::new(pool)
}

#[tokio::test]
async fn append_and_retrieve_records() {
    let log = get_test_log().await;
    let id = ExecutionId::new();

    log.append(LogRecord::step_exec(id, "transfer", 0)).await.unwrap();
    log.append(LogRecord::step_exec(id, "transfer", 1)).await.unwrap();

    let records = log.records_for_execution(id).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].state, LogState::StepExec);
    assert_eq!(records[0].step_number, 0);
    assert_eq!(records[1].step_number, 1);
    assert_eq!(records[0].saga_name, "transfer");
}

#[tokio::test]
async fn duplicate_signal_is_rejected() {
    let log = get_test_log().await;
    let id = ExecutionId::new();

    log.append(LogRecord::step_exec(id, "transfer", 0)).await.unwrap();
    let result = log.append(LogRecord::step_exec(id, "transfer", 0)).await;

    assert!(matches!(result, Err(JournalError::DuplicateRecord(_))));
    assert_eq!(log.records_for_execution(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn step_error_is_persisted() {
    let log = get_test_log().await;
    let id = ExecutionId::new();

    log.append(LogRecord::step_compensate(
        id,
        "transfer",
        1,
        Some("provider declined".to_string()),
    ))
    .await
    .unwrap();

    let record = log
        .find(LogKey {
            execution_id: id,
            step_number: 1,
            state: LogState::StepCompensate,
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.step_error.as_deref(), Some("provider declined"));

    let missing = log
        .find(LogKey {
            execution_id: id,
            step_number: 0,
            state: LogState::StepCompensate,
        })
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn unfinished_executions_exclude_completed() {
    let log = get_test_log().await;
    let done = ExecutionId::new();
    let running = ExecutionId::new();

    log.append(LogRecord::step_exec(done, "transfer", 0)).await.unwrap();
    log.append(LogRecord::complete(done, "transfer", 1, None))
        .await
        .unwrap();
    log.append(LogRecord::step_exec(running, "transfer", 0))
        .await
        .unwrap();

    let unfinished = log.unfinished_executions("transfer").await.unwrap();
    assert_eq!(unfinished, vec![running]);

    let completion = log.completion(done).await.unwrap().unwrap();
    assert!(completion.step_error.is_none());
}
