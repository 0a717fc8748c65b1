//! Status event publication.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::PublishError;
use crate::order::OrderStatusChanged;

/// Transport for order status events.
///
/// Delivery is best-effort: the order service logs a failed publish and
/// never rolls back the status it already persisted.
#[async_trait]
pub trait EventPublisher: Send + Sync + 'static {
    async fn publish(&self, topic: &str, event: &OrderStatusChanged) -> Result<(), PublishError>;
}

/// Publisher that only writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, topic: &str, event: &OrderStatusChanged) -> Result<(), PublishError> {
        tracing::info!(
            topic,
            event_type = event.event_type(),
            order_id = %event.order_id,
            status = %event.status,
            "order event published"
        );
        Ok(())
    }
}

/// In-memory publisher recording every event, for tests.
#[derive(Clone, Default)]
pub struct InMemoryEventPublisher {
    published: Arc<RwLock<Vec<(String, OrderStatusChanged)>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the publisher to reject every event.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<(String, OrderStatusChanged)> {
        self.published.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.published.read().await.len()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, topic: &str, event: &OrderStatusChanged) -> Result<(), PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError {
                topic: topic.to_string(),
                reason: "broker unreachable".into(),
            });
        }
        self.published
            .write()
            .await
            .push((topic.to_string(), event.clone()));
        Ok(())
    }
}
