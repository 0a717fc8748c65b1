//! Integration tests for the log-driven saga coordinator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{ExecutionId, TaskPool};
use journal::{InMemorySagaLog, LogRecord, LogState, SagaLog, SagaLogExt};
use saga::{SagaCoordinator, SagaDefinition, SagaError, SagaState, StepContext, StepError, action};

/// Toy ledger: a transfer saga holds funds, moves them, then notifies.
#[derive(Clone, Default)]
struct Ledger {
    balances: Arc<Mutex<HashMap<&'static str, i64>>>,
    trace: Arc<Mutex<Vec<String>>>,
}

impl Ledger {
    fn with_balance(account: &'static str, amount: i64) -> Self {
        let ledger = Self::default();
        ledger.balances.lock().unwrap().insert(account, amount);
        ledger
    }

    fn balance(&self, account: &'static str) -> i64 {
        *self.balances.lock().unwrap().get(account).unwrap_or(&0)
    }

    fn adjust(&self, account: &'static str, delta: i64) {
        *self.balances.lock().unwrap().entry(account).or_default() += delta;
    }

    fn record(&self, entry: String) {
        self.trace.lock().unwrap().push(entry);
    }

    fn trace(&self) -> Vec<String> {
        self.trace.lock().unwrap().clone()
    }
}

fn transfer_saga(ledger: &Ledger, amount: i64, notify_fails: bool) -> SagaDefinition {
    let (l1, l2, l3, l4, l5, l6) = (
        ledger.clone(),
        ledger.clone(),
        ledger.clone(),
        ledger.clone(),
        ledger.clone(),
        ledger.clone(),
    );

    SagaDefinition::new("wallet_transfer")
        .step(
            action(move |_ctx: StepContext| {
                let l = l1.clone();
                async move {
                    if l.balance("alice") < amount {
                        return Err(StepError::new("insufficient balance"));
                    }
                    l.adjust("alice", -amount);
                    l.record("debit".into());
                    Ok(())
                }
            }),
            action(move |_ctx: StepContext| {
                let l = l2.clone();
                async move {
                    l.adjust("alice", amount);
                    l.record("refund_debit".into());
                    Ok(())
                }
            }),
        )
        .step(
            action(move |_ctx: StepContext| {
                let l = l3.clone();
                async move {
                    l.adjust("bob", amount);
                    l.record("credit".into());
                    Ok(())
                }
            }),
            action(move |_ctx: StepContext| {
                let l = l4.clone();
                async move {
                    l.adjust("bob", -amount);
                    l.record("reverse_credit".into());
                    Ok(())
                }
            }),
        )
        .step(
            action(move |_ctx: StepContext| {
                let l = l5.clone();
                async move {
                    if notify_fails {
                        return Err(StepError::new("notification gateway down"));
                    }
                    l.record("notify".into());
                    Ok(())
                }
            }),
            action(move |_ctx: StepContext| {
                let l = l6.clone();
                async move {
                    l.record("retract_notify".into());
                    Ok(())
                }
            }),
        )
}

fn pool() -> TaskPool {
    TaskPool::new("saga-it", 8)
}

#[tokio::test]
async fn test_transfer_completes() {
    let ledger = Ledger::with_balance("alice", 100);
    let log = InMemorySagaLog::new();
    let saga = SagaCoordinator::new(log.clone(), transfer_saga(&ledger, 40, false), pool());

    let execution_id = saga.play().await.unwrap();

    assert_eq!(ledger.balance("alice"), 60);
    assert_eq!(ledger.balance("bob"), 40);
    assert_eq!(ledger.trace(), vec!["debit", "credit", "notify"]);

    let states: Vec<_> = log
        .records_for_execution(execution_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.step_number, r.state))
        .collect();
    assert_eq!(
        states,
        vec![
            (0, LogState::StepExec),
            (1, LogState::StepExec),
            (2, LogState::StepExec),
            (3, LogState::Complete),
        ]
    );
}

#[tokio::test]
async fn test_failed_step_rolls_back_everything() {
    let ledger = Ledger::with_balance("alice", 100);
    let log = InMemorySagaLog::new();
    let saga = SagaCoordinator::new(log.clone(), transfer_saga(&ledger, 40, true), pool());

    let err = saga.play().await.unwrap_err();
    let SagaError::Aborted {
        execution_id,
        reason,
    } = err
    else {
        panic!("expected the transfer to abort");
    };
    assert_eq!(reason, "notification gateway down");

    assert_eq!(ledger.balance("alice"), 100);
    assert_eq!(ledger.balance("bob"), 0);
    assert_eq!(
        ledger.trace(),
        vec!["debit", "credit", "retract_notify", "reverse_credit", "refund_debit"]
    );

    let records = log.records_for_execution(execution_id).await.unwrap();
    let tail: Vec<_> = records
        .iter()
        .skip(3)
        .map(|r| (r.step_number, r.state))
        .collect();
    assert_eq!(
        tail,
        vec![
            (2, LogState::StepCompensate),
            (1, LogState::StepCompensate),
            (0, LogState::StepCompensate),
            (0, LogState::Abort),
            (3, LogState::Complete),
        ]
    );
    // The original error travels through every compensation record
    assert!(
        records
            .iter()
            .skip(3)
            .all(|r| r.step_error.as_deref() == Some("notification gateway down"))
    );
}

#[tokio::test]
async fn test_first_step_failure_compensates_only_step_zero() {
    let ledger = Ledger::with_balance("alice", 10);
    let saga = SagaCoordinator::new(
        InMemorySagaLog::new(),
        transfer_saga(&ledger, 40, false),
        pool(),
    );

    let err = saga.play().await.unwrap_err();
    assert!(matches!(err, SagaError::Aborted { ref reason, .. } if reason == "insufficient balance"));

    // Compensation of step 0 still runs even though its forward action failed
    assert_eq!(ledger.trace(), vec!["refund_debit"]);
}

#[tokio::test]
async fn test_concurrent_executions_are_independent() {
    let ledger = Ledger::with_balance("alice", 1_000);
    let saga = SagaCoordinator::new(
        InMemorySagaLog::new(),
        transfer_saga(&ledger, 10, false),
        pool(),
    );

    let mut handles = Vec::new();
    for _ in 0..10 {
        let saga = saga.clone();
        handles.push(tokio::spawn(async move { saga.play().await }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }

    ids.sort_by_key(|id| id.as_uuid());
    ids.dedup();
    assert_eq!(ids.len(), 10);
    assert_eq!(ledger.balance("alice"), 900);
    assert_eq!(ledger.balance("bob"), 100);
}

#[tokio::test]
async fn test_duplicate_signal_is_consumed_once() {
    let ledger = Ledger::with_balance("alice", 100);
    let log = InMemorySagaLog::new();
    let execution_id = ExecutionId::new();

    // Another worker already appended the first signal and the one after it
    log.append(LogRecord::step_exec(execution_id, "wallet_transfer", 0))
        .await
        .unwrap();
    log.append(LogRecord::step_exec(execution_id, "wallet_transfer", 1))
        .await
        .unwrap();
    ledger.adjust("alice", -40);

    let saga = SagaCoordinator::new(log.clone(), transfer_saga(&ledger, 40, false), pool());
    saga.resume(execution_id).await.unwrap();

    // Only the remaining steps ran
    assert_eq!(ledger.trace(), vec!["credit", "notify"]);
    assert_eq!(ledger.balance("alice"), 60);

    let completion = log.completion(execution_id).await.unwrap().unwrap();
    assert!(completion.step_error.is_none());
}

#[tokio::test]
async fn test_recover_finishes_unfinished_executions() {
    let ledger = Ledger::with_balance("alice", 100);
    let log = InMemorySagaLog::new();

    let stuck = ExecutionId::new();
    log.append(LogRecord::step_exec(stuck, "wallet_transfer", 0))
        .await
        .unwrap();

    let saga = SagaCoordinator::new(log.clone(), transfer_saga(&ledger, 25, false), pool());
    let recovered = saga.recover().await.unwrap();
    assert_eq!(recovered, vec![stuck]);

    // Recovery does not wait; poll until the execution finishes
    for _ in 0..100 {
        if log.completion(stuck).await.unwrap().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let execution = saga.execution(stuck).await.unwrap().unwrap();
    assert_eq!(execution.state(), SagaState::Completed);
    assert_eq!(ledger.balance("bob"), 25);
    assert!(log.unfinished_executions("wallet_transfer").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resume_of_aborted_execution_reports_reason() {
    let ledger = Ledger::with_balance("alice", 100);
    let saga = SagaCoordinator::new(
        InMemorySagaLog::new(),
        transfer_saga(&ledger, 40, true),
        pool(),
    );

    let Err(SagaError::Aborted { execution_id, .. }) = saga.play().await else {
        panic!("expected the transfer to abort");
    };

    let err = saga.resume(execution_id).await.unwrap_err();
    assert!(matches!(err, SagaError::Aborted { ref reason, .. } if reason == "notification gateway down"));
    // Nothing ran a second time
    assert_eq!(ledger.trace().len(), 5);
}
