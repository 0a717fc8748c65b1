//! Cancels orders nobody finished in time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;

use domain::{EventPublisher, OrderRepository};

use crate::error::Result;
use crate::reservation::Reservation;

pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_REAP_CONCURRENCY: usize = 8;

const EXPIRED_REASON: &str = "Order expired";

/// Periodically cancels `Pending`/`Processing` orders past their expiry
/// and releases what they hold.
pub struct ExpiryReaper<R: OrderRepository, P: EventPublisher> {
    reservation: Reservation<R, P>,
    interval: Duration,
    concurrency: usize,
    ticking: Arc<AtomicBool>,
}

impl<R: OrderRepository, P: EventPublisher> Clone for ExpiryReaper<R, P> {
    fn clone(&self) -> Self {
        Self {
            reservation: self.reservation.clone(),
            interval: self.interval,
            concurrency: self.concurrency,
            ticking: self.ticking.clone(),
        }
    }
}

impl<R: OrderRepository, P: EventPublisher> ExpiryReaper<R, P> {
    pub fn new(reservation: Reservation<R, P>) -> Self {
        Self {
            reservation,
            interval: DEFAULT_REAP_INTERVAL,
            concurrency: DEFAULT_REAP_CONCURRENCY,
            ticking: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Orders cancelled at the same time within one tick.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Cancels every order expired at `now`. Returns how many this call
    /// cancelled; orders finished meanwhile by a flow are skipped.
    #[tracing::instrument(skip(self))]
    pub async fn reap_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired = self.reservation.orders().find_expired(now).await?;
        if expired.is_empty() {
            return Ok(0);
        }
        tracing::debug!(count = expired.len(), "expired orders found");

        let cancelled = AtomicUsize::new(0);
        stream::iter(expired)
            .for_each_concurrent(self.concurrency, |order| {
                let cancelled = &cancelled;
                async move {
                    match self.reservation.cancel(&order, EXPIRED_REASON).await {
                        Ok(Some(order)) => {
                            tracing::info!(order_id = %order.order_id, "expired order cancelled");
                            cancelled.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(None) => {
                            tracing::debug!(order_id = %order.order_id, "order finished before expiry");
                        }
                        Err(e) => {
                            tracing::error!(order_id = %order.order_id, error = %e, "failed to cancel expired order");
                        }
                    }
                }
            })
            .await;

        let cancelled = cancelled.into_inner();
        metrics::counter!("orders_expired_total").increment(cancelled as u64);
        Ok(cancelled)
    }

    /// Runs until `shutdown` turns true. Each tick runs on the task pool;
    /// a tick still running when the next one fires is not doubled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval = ?self.interval, "expiry reaper started");
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => self.submit_tick(),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("expiry reaper stopped");
    }

    fn submit_tick(&self) {
        if self.ticking.swap(true, Ordering::AcqRel) {
            tracing::debug!("previous reaper tick still running");
            return;
        }

        let reaper = self.clone();
        self.reservation
            .orders()
            .pool()
            .spawn("expiry_reaper_tick", async move {
                let _guard = TickGuard(reaper.ticking.clone());
                if let Err(e) = reaper.reap_once(Utc::now()).await {
                    tracing::error!(error = %e, "expiry reaper tick failed");
                }
            });
    }
}

/// Clears the running flag even if the tick panics.
struct TickGuard(Arc<AtomicBool>);

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
