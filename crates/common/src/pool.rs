//! Bounded background task pool with panic isolation.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Notify, Semaphore};

/// A bounded pool for fire-and-forget background work.
///
/// At most `capacity` submitted tasks run at the same time; the rest wait
/// for a permit. Every task runs inside its own spawned future, so a panic
/// is caught at the task boundary, logged, and never reaches the pool or
/// the submitter.
#[derive(Clone)]
pub struct TaskPool {
    name: Arc<str>,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl TaskPool {
    /// Creates a pool allowing `capacity` concurrently running tasks.
    pub fn new(name: impl Into<Arc<str>>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            permits: Arc::new(Semaphore::new(capacity.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Returns the pool name used in log records.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of submitted tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Submits a task. Returns immediately.
    pub fn spawn<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("task_pool_submitted_total", "pool" => self.name.to_string())
            .increment(1);

        let pool = self.clone();
        tokio::spawn(async move {
            if let Ok(_permit) = pool.permits.clone().acquire_owned().await {
                if let Err(e) = tokio::spawn(task).await {
                    if e.is_panic() {
                        metrics::counter!("task_pool_panics_total", "pool" => pool.name.to_string())
                            .increment(1);
                        tracing::error!(pool = %pool.name, task = label, "background task panicked");
                    } else {
                        tracing::warn!(pool = %pool.name, task = label, "background task cancelled");
                    }
                }
            }

            if pool.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                pool.idle.notify_waiters();
            }
        });
    }

    /// Waits until every submitted task, including tasks submitted while
    /// waiting, has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("name", &self.name)
            .field("available", &self.permits.available_permits())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_submitted_tasks() {
        let pool = TaskPool::new("test", 2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            pool.spawn("count", async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panic_does_not_poison_pool() {
        let pool = TaskPool::new("test", 1);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.spawn("boom", async {
            panic!("task failure");
        });

        let c = counter.clone();
        pool.spawn("after", async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_capacity_bounds_concurrency() {
        let pool = TaskPool::new("test", 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            pool.spawn("slow", async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }

        pool.wait_idle().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_wait_idle_on_empty_pool_returns() {
        let pool = TaskPool::new("test", 1);
        pool.wait_idle().await;
    }
}
