//! Order service: the only writer of order status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{OrderId, PrefixCounter, TaskPool};

use crate::error::DomainError;
use crate::publisher::EventPublisher;
use crate::repository::OrderRepository;

use super::{NewOrder, Order, OrderStatus, OrderStatusChanged};

/// Statuses the expiry reaper may cancel.
const EXPIRABLE: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::Processing];

enum Transition {
    Applied(Order),
    Unchanged(Order),
}

impl Transition {
    fn into_order(self) -> Order {
        match self {
            Transition::Applied(order) | Transition::Unchanged(order) => order,
        }
    }
}

/// Service for managing orders.
///
/// Every transition is validated against the persisted status and written
/// with a conditional save. An illegal transition is not an error: it logs
/// a warning and returns the stored order unchanged, which keeps duplicate
/// callbacks and racing writers harmless.
pub struct OrderService<R: OrderRepository, P: EventPublisher> {
    repository: Arc<R>,
    publisher: Arc<P>,
    ids: PrefixCounter,
    pool: TaskPool,
}

impl<R: OrderRepository, P: EventPublisher> Clone for OrderService<R, P> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            publisher: self.publisher.clone(),
            ids: self.ids.clone(),
            pool: self.pool.clone(),
        }
    }
}

impl<R: OrderRepository, P: EventPublisher> OrderService<R, P> {
    pub fn new(repository: R, publisher: P, ids: PrefixCounter, pool: TaskPool) -> Self {
        Self {
            repository: Arc::new(repository),
            publisher: Arc::new(publisher),
            ids,
            pool,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn pool(&self) -> &TaskPool {
        &self.pool
    }

    /// Creates a `Pending` order with a freshly allocated ID.
    #[tracing::instrument(skip(self, new_order), fields(order_type = %new_order.order_type))]
    pub async fn init_order(&self, new_order: NewOrder) -> Result<Order, DomainError> {
        new_order.validate()?;

        let order_id = OrderId::new(self.ids.next_id(new_order.order_type.id_prefix()));
        let order = new_order.into_order(order_id, Utc::now());
        self.repository.insert(&order).await?;

        metrics::counter!("orders_created_total", "order_type" => order.order_type.as_str())
            .increment(1);
        tracing::info!(order_id = %order.order_id, "order initialized");

        self.publish(&order, None);
        Ok(order)
    }

    /// Loads an order by ID.
    ///
    /// Returns None if the order doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>, DomainError> {
        self.repository.get(order_id).await
    }

    /// Loads an order, failing with `OrderNotFound` if it does not exist.
    pub async fn load(&self, order_id: &OrderId) -> Result<Order, DomainError> {
        self.repository
            .get(order_id)
            .await?
            .ok_or_else(|| DomainError::OrderNotFound(order_id.clone()))
    }

    /// Persists non-status fields such as the transaction ID or discount.
    ///
    /// The write is conditional on the caller's view of the status; if the
    /// order moved in the meantime the stored order is returned untouched.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.order_id))]
    pub async fn update_order(&self, order: &Order) -> Result<Order, DomainError> {
        let mut next = order.clone();
        next.updated_at = Utc::now();

        if self.repository.save_if_status(&next, order.status).await? {
            return Ok(next);
        }

        let stored = self.load(&order.order_id).await?;
        tracing::warn!(
            expected = %order.status,
            stored = %stored.status,
            "order changed concurrently, update dropped"
        );
        Ok(stored)
    }

    pub async fn processing_order(&self, order: &Order) -> Result<Order, DomainError> {
        self.transition(order, OrderStatus::Processing, None).await
    }

    pub async fn success_order(&self, order: &Order) -> Result<Order, DomainError> {
        self.transition(order, OrderStatus::Success, None).await
    }

    pub async fn failed_order(
        &self,
        order: &Order,
        reason: impl Into<String>,
    ) -> Result<Order, DomainError> {
        self.transition(order, OrderStatus::Failed, Some(reason.into()))
            .await
    }

    /// Fails the order and returns it only if this call made the change.
    pub async fn try_failed_order(
        &self,
        order: &Order,
        reason: impl Into<String>,
    ) -> Result<Option<Order>, DomainError> {
        match self
            .apply(order, OrderStatus::Failed, Some(reason.into()))
            .await?
        {
            Transition::Applied(order) => Ok(Some(order)),
            Transition::Unchanged(_) => Ok(None),
        }
    }

    pub async fn verifying_order(&self, order: &Order) -> Result<Order, DomainError> {
        self.transition(order, OrderStatus::Verifying, None).await
    }

    pub async fn cancel_order(
        &self,
        order: &Order,
        reason: impl Into<String>,
    ) -> Result<Order, DomainError> {
        self.transition(order, OrderStatus::Cancel, Some(reason.into()))
            .await
    }

    /// Cancels the order and returns it only if this call made the change.
    ///
    /// Callers use this to decide whether they own the compensation of the
    /// order's reservation.
    pub async fn try_cancel_order(
        &self,
        order: &Order,
        reason: impl Into<String>,
    ) -> Result<Option<Order>, DomainError> {
        match self
            .apply(order, OrderStatus::Cancel, Some(reason.into()))
            .await?
        {
            Transition::Applied(order) => Ok(Some(order)),
            Transition::Unchanged(_) => Ok(None),
        }
    }

    /// Lists `Pending`/`Processing` orders whose expiry is before `now`.
    pub async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>, DomainError> {
        self.repository.find_expired(now, &EXPIRABLE).await
    }

    /// Lists refund orders raised against `original_order_id`.
    pub async fn find_refunds(
        &self,
        original_order_id: &OrderId,
    ) -> Result<Vec<Order>, DomainError> {
        self.repository.find_refunds(original_order_id).await
    }

    async fn transition(
        &self,
        order: &Order,
        to: OrderStatus,
        message: Option<String>,
    ) -> Result<Order, DomainError> {
        Ok(self.apply(order, to, message).await?.into_order())
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.order_id, to = %to))]
    async fn apply(
        &self,
        order: &Order,
        to: OrderStatus,
        message: Option<String>,
    ) -> Result<Transition, DomainError> {
        let stored = self.load(&order.order_id).await?;
        let from = stored.status;

        if !from.can_transition_to(to) {
            metrics::counter!("order_transitions_rejected_total", "to" => to.as_str())
                .increment(1);
            tracing::warn!(from = %from, "illegal order transition ignored");
            return Ok(Transition::Unchanged(stored));
        }

        // A caller holding an outdated copy only changes the status
        let mut next = if order.status == from {
            order.clone()
        } else {
            stored
        };
        next.status = to;
        next.updated_at = Utc::now();
        if message.is_some() {
            next.message = message;
        }

        if !self.repository.save_if_status(&next, from).await? {
            let current = self.load(&order.order_id).await?;
            tracing::warn!(from = %from, stored = %current.status, "order transition lost a race");
            return Ok(Transition::Unchanged(current));
        }

        metrics::counter!(
            "order_transitions_total",
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
        tracing::info!(from = %from, "order status changed");

        self.publish(&next, Some(from));
        Ok(Transition::Applied(next))
    }

    /// Publishes the status event on the task pool.
    fn publish(&self, order: &Order, previous: Option<OrderStatus>) {
        let event = OrderStatusChanged::new(order, previous);
        let publisher = self.publisher.clone();

        self.pool.spawn("publish_order_status", async move {
            let topic = event.topic();
            if let Err(e) = publisher.publish(&topic, &event).await {
                metrics::counter!("order_publish_failures_total").increment(1);
                tracing::warn!(order_id = %event.order_id, error = %e, "failed to publish order event");
            }
        });
    }
}
