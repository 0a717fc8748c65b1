//! Saga coordinator driving executions through the log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::{ExecutionId, TaskPool};
use futures_util::future::BoxFuture;
use journal::{JournalError, LogRecord, LogState, SagaLog};
use tokio::sync::oneshot;

use crate::error::SagaError;
use crate::execution::SagaExecution;
use crate::step::{SagaDefinition, StepContext};

/// How long `play` waits for the `COMPLETE` record by default.
pub const DEFAULT_PLAY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

type Waiters = Mutex<HashMap<ExecutionId, oneshot::Sender<Option<String>>>>;

struct Inner<L: SagaLog> {
    log: L,
    definition: SagaDefinition,
    pool: TaskPool,
    timeout: Duration,
    waiters: Waiters,
}

/// Executes a [`SagaDefinition`] using a [`SagaLog`] as its only state.
///
/// Each appended record is a signal. The coordinator hands every signal to
/// the task pool, where the matching action runs and the follow-up signal
/// is appended. A failing forward step triggers compensation of that step
/// and of every earlier step in reverse order.
pub struct SagaCoordinator<L: SagaLog> {
    inner: Arc<Inner<L>>,
}

impl<L: SagaLog> Clone for SagaCoordinator<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L: SagaLog + 'static> SagaCoordinator<L> {
    /// Creates a coordinator with the default play timeout.
    pub fn new(log: L, definition: SagaDefinition, pool: TaskPool) -> Self {
        Self::with_timeout(log, definition, pool, DEFAULT_PLAY_TIMEOUT)
    }

    pub fn with_timeout(
        log: L,
        definition: SagaDefinition,
        pool: TaskPool,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                log,
                definition,
                pool,
                timeout,
                waiters: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn definition(&self) -> &SagaDefinition {
        &self.inner.definition
    }

    pub fn log(&self) -> &L {
        &self.inner.log
    }

    /// Starts a new execution and waits for it to complete.
    ///
    /// Returns the execution ID on success, or `Aborted` carrying the first
    /// step error once compensation has finished.
    #[tracing::instrument(skip(self), fields(saga = %self.inner.definition.name()))]
    pub async fn play(&self) -> Result<ExecutionId, SagaError> {
        metrics::counter!("saga_executions_total").increment(1);
        let started = Instant::now();
        let execution_id = ExecutionId::new();
        let rx = self.inner.register(execution_id);

        let first = if self.inner.definition.is_empty() {
            self.inner.complete_record(execution_id, None)
        } else {
            LogRecord::step_exec(execution_id, self.inner.definition.name(), 0)
        };

        if let Err(e) = self.inner.signal(first).await {
            self.inner.unregister(execution_id);
            return Err(e.into());
        }

        let result = self.inner.wait(execution_id, rx).await;
        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    /// Continues an execution from its last log record and waits for it.
    ///
    /// The action of the last recorded signal runs again, which is why
    /// step actions must be idempotent.
    #[tracing::instrument(skip(self), fields(saga = %self.inner.definition.name()))]
    pub async fn resume(&self, execution_id: ExecutionId) -> Result<ExecutionId, SagaError> {
        let records = self.inner.log.records_for_execution(execution_id).await?;

        if let Some(done) = records.iter().find(|r| r.state == LogState::Complete) {
            return match &done.step_error {
                None => Ok(execution_id),
                Some(reason) => Err(SagaError::Aborted {
                    execution_id,
                    reason: reason.clone(),
                }),
            };
        }

        let last = records
            .last()
            .cloned()
            .ok_or(SagaError::ExecutionNotFound(execution_id))?;

        tracing::info!(%execution_id, step = last.step_number, state = %last.state, "resuming saga");
        let rx = self.inner.register(execution_id);
        self.inner.dispatch(last);
        self.inner.wait(execution_id, rx).await
    }

    /// Re-dispatches every unfinished execution of this saga without
    /// waiting for them. Returns the executions that were resumed.
    pub async fn recover(&self) -> Result<Vec<ExecutionId>, SagaError> {
        let unfinished = self
            .inner
            .log
            .unfinished_executions(self.inner.definition.name())
            .await?;

        for execution_id in &unfinished {
            let records = self.inner.log.records_for_execution(*execution_id).await?;
            if let Some(last) = records.last().cloned() {
                self.inner.dispatch(last);
            }
        }

        if !unfinished.is_empty() {
            tracing::info!(count = unfinished.len(), "recovered unfinished sagas");
        }
        Ok(unfinished)
    }

    /// Loads the current state of an execution from the log.
    pub async fn execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<SagaExecution>, SagaError> {
        let records = self.inner.log.records_for_execution(execution_id).await?;
        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(SagaExecution::from_records(records)))
    }
}

impl<L: SagaLog + 'static> Inner<L> {
    fn register(&self, execution_id: ExecutionId) -> oneshot::Receiver<Option<String>> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(execution_id, tx);
        rx
    }

    fn unregister(&self, execution_id: ExecutionId) {
        self.waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&execution_id);
    }

    async fn wait(
        &self,
        execution_id: ExecutionId,
        rx: oneshot::Receiver<Option<String>>,
    ) -> Result<ExecutionId, SagaError> {
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(None)) => {
                metrics::counter!("saga_completed").increment(1);
                tracing::info!(%execution_id, "saga completed successfully");
                Ok(execution_id)
            }
            Ok(Ok(Some(reason))) => {
                metrics::counter!("saga_aborted").increment(1);
                tracing::warn!(%execution_id, %reason, "saga aborted");
                Err(SagaError::Aborted {
                    execution_id,
                    reason,
                })
            }
            Ok(Err(_)) => Err(SagaError::Abandoned(execution_id)),
            Err(_) => {
                self.unregister(execution_id);
                metrics::counter!("saga_timeouts").increment(1);
                tracing::error!(%execution_id, timeout = ?self.timeout, "saga timed out");
                Err(SagaError::Timeout {
                    execution_id,
                    timeout: self.timeout,
                })
            }
        }
    }

    fn complete_record(&self, execution_id: ExecutionId, error: Option<String>) -> LogRecord {
        LogRecord::complete(
            execution_id,
            self.definition.name(),
            self.definition.len(),
            error,
        )
    }

    /// Appends a signal and routes it. A duplicate signal was already
    /// consumed by someone else and is dropped.
    async fn signal(self: &Arc<Self>, record: LogRecord) -> Result<(), JournalError> {
        match self.log.append(record.clone()).await {
            Ok(()) => {}
            Err(JournalError::DuplicateRecord(key)) => {
                tracing::debug!(%key, "signal already consumed");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        if record.state == LogState::Complete {
            self.notify(record.execution_id, record.step_error);
        } else {
            self.dispatch(record);
        }
        Ok(())
    }

    fn notify(&self, execution_id: ExecutionId, error: Option<String>) {
        let waiter = self
            .waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&execution_id);
        if let Some(tx) = waiter {
            let _ = tx.send(error);
        }
    }

    fn dispatch(self: &Arc<Self>, record: LogRecord) {
        if record.state == LogState::Complete {
            self.notify(record.execution_id, record.step_error);
            return;
        }
        let inner = self.clone();
        self.pool.spawn("saga_signal", inner.handle(record));
    }

    fn handle(self: Arc<Self>, record: LogRecord) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let execution_id = record.execution_id;
            let step_number = record.step_number;

            let next = match self.next_record(record).await {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(%execution_id, step = step_number, error = %e, "saga signal rejected");
                    return;
                }
            };

            if let Err(e) = self.signal(next).await {
                tracing::error!(%execution_id, step = step_number, error = %e, "failed to append saga signal");
            }
        })
    }

    /// Runs the action a signal asks for and returns the follow-up signal.
    async fn next_record(&self, record: LogRecord) -> Result<LogRecord, SagaError> {
        let name = self.definition.name();
        let execution_id = record.execution_id;
        let step_number = record.step_number;
        let ctx = StepContext {
            execution_id,
            step_number,
        };

        match record.state {
            LogState::StepExec => {
                let step = self.step(step_number)?;
                tracing::info!(%execution_id, step = step_number, "saga step started");

                match step.forward.run(ctx).await {
                    Ok(()) if step_number + 1 < self.definition.len() => {
                        Ok(LogRecord::step_exec(execution_id, name, step_number + 1))
                    }
                    Ok(()) => Ok(self.complete_record(execution_id, None)),
                    Err(e) => {
                        metrics::counter!("saga_step_failures").increment(1);
                        tracing::warn!(%execution_id, step = step_number, error = %e, "saga step failed");
                        Ok(LogRecord::step_compensate(
                            execution_id,
                            name,
                            step_number,
                            Some(e.to_string()),
                        ))
                    }
                }
            }
            LogState::StepCompensate => {
                let step = self.step(step_number)?;

                if let Err(e) = step.compensate.run(ctx).await {
                    // Compensation failures are recorded but do not stop the cascade
                    metrics::counter!("saga_compensation_failures").increment(1);
                    tracing::error!(%execution_id, step = step_number, error = %e, "compensation step failed");
                }

                if step_number > 0 {
                    Ok(LogRecord::step_compensate(
                        execution_id,
                        name,
                        step_number - 1,
                        record.step_error,
                    ))
                } else {
                    Ok(LogRecord::abort(execution_id, name, 0, record.step_error))
                }
            }
            LogState::Abort => Ok(self.complete_record(execution_id, record.step_error)),
            LogState::Complete => Ok(record),
        }
    }

    fn step(&self, step_number: u32) -> Result<&crate::step::Step, SagaError> {
        self.definition
            .get(step_number)
            .ok_or_else(|| SagaError::UnknownStep {
                saga: self.definition.name().to_string(),
                step: step_number,
            })
    }
}
