//! Order persistence.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use tokio::sync::RwLock;

use crate::error::DomainError;
use crate::order::{Order, OrderStatus};

/// Storage for order documents, one per `OrderId`.
///
/// Status changes use [`OrderRepository::save_if_status`], a conditional
/// write that only succeeds while the stored status is still the one the
/// caller validated against.
#[async_trait]
pub trait OrderRepository: Send + Sync + 'static {
    /// Stores a new order. Fails with `DuplicateOrder` if the ID exists.
    async fn insert(&self, order: &Order) -> Result<(), DomainError>;

    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>, DomainError>;

    /// Replaces the stored order if its status equals `expected`.
    ///
    /// Returns `false` when the stored status differs, or the order is gone.
    async fn save_if_status(&self, order: &Order, expected: OrderStatus)
    -> Result<bool, DomainError>;

    /// Lists orders in one of `statuses` whose expiry is before `now`.
    async fn find_expired(
        &self,
        now: DateTime<Utc>,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>, DomainError>;

    /// Lists refund orders whose `refund.original_order_id` is `original_order_id`.
    async fn find_refunds(&self, original_order_id: &OrderId) -> Result<Vec<Order>, DomainError>;
}

/// In-memory order repository for testing and development.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write fail (for testing infrastructure errors).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    fn check_writable(&self) -> Result<(), DomainError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DomainError::Repository("store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), DomainError> {
        self.check_writable()?;
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_id) {
            return Err(DomainError::DuplicateOrder(order.order_id.clone()));
        }
        orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>, DomainError> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn save_if_status(
        &self,
        order: &Order,
        expected: OrderStatus,
    ) -> Result<bool, DomainError> {
        self.check_writable()?;
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.order_id) {
            Some(stored) if stored.status == expected => {
                *stored = order.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_expired(
        &self,
        now: DateTime<Utc>,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>, DomainError> {
        let orders = self.orders.read().await;
        let mut expired: Vec<Order> = orders
            .values()
            .filter(|o| statuses.contains(&o.status) && o.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.expired_at.cmp(&b.expired_at));
        Ok(expired)
    }

    async fn find_refunds(&self, original_order_id: &OrderId) -> Result<Vec<Order>, DomainError> {
        let orders = self.orders.read().await;
        let mut refunds: Vec<Order> = orders
            .values()
            .filter(|o| {
                o.refund
                    .as_ref()
                    .is_some_and(|r| &r.original_order_id == original_order_id)
            })
            .cloned()
            .collect();
        refunds.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(refunds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Money, NewOrder, OrderType, RefundInfo, RefundType};
    use chrono::Duration;

    fn order(id: &str) -> Order {
        NewOrder::new(OrderType::Payment, "user-1", Money::new(100))
            .into_order(OrderId::new(id), Utc::now())
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemoryOrderRepository::new();
        let order = order("PM1");
        repo.insert(&order).await.unwrap();

        let loaded = repo.get(&order.order_id).await.unwrap().unwrap();
        assert_eq!(loaded, order);
        assert!(repo.get(&OrderId::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let repo = InMemoryOrderRepository::new();
        let order = order("PM1");
        repo.insert(&order).await.unwrap();

        let result = repo.insert(&order).await;
        assert!(matches!(result, Err(DomainError::DuplicateOrder(_))));
    }

    #[tokio::test]
    async fn test_save_if_status_checks_stored_status() {
        let repo = InMemoryOrderRepository::new();
        let mut order = order("PM1");
        repo.insert(&order).await.unwrap();

        order.status = OrderStatus::Processing;
        assert!(repo.save_if_status(&order, OrderStatus::Pending).await.unwrap());

        // Stored status is now Processing, so a stale writer loses
        order.status = OrderStatus::Cancel;
        assert!(!repo.save_if_status(&order, OrderStatus::Pending).await.unwrap());

        let stored = repo.get(&order.order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_find_expired_filters_status_and_time() {
        let repo = InMemoryOrderRepository::new();
        let now = Utc::now();

        let mut stale = order("PM1");
        stale.expired_at = Some(now - Duration::minutes(1));
        let mut fresh = order("PM2");
        fresh.expired_at = Some(now + Duration::minutes(1));
        let mut done = order("PM3");
        done.expired_at = Some(now - Duration::minutes(1));
        done.status = OrderStatus::Success;
        let forever = order("PM4");

        for o in [&stale, &fresh, &done, &forever] {
            repo.insert(o).await.unwrap();
        }

        let expired = repo
            .find_expired(now, &[OrderStatus::Pending, OrderStatus::Processing])
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].order_id, stale.order_id);
    }

    #[tokio::test]
    async fn test_find_refunds_by_original_order() {
        let repo = InMemoryOrderRepository::new();
        let original = order("QR1");
        repo.insert(&original).await.unwrap();

        for (id, target) in [("RF1", "QR1"), ("RF2", "QR2"), ("RF3", "QR1")] {
            let mut refund = order(id);
            refund.order_type = OrderType::Refund;
            refund.refund = Some(RefundInfo {
                original_order_id: OrderId::new(target),
                refund_type: RefundType::Direct,
                refund_mode: None,
            });
            repo.insert(&refund).await.unwrap();
        }

        let refunds = repo.find_refunds(&original.order_id).await.unwrap();
        let mut ids: Vec<_> = refunds.iter().map(|o| o.order_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, ["RF1", "RF3"]);
        assert!(repo.find_refunds(&OrderId::new("QR9")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let repo = InMemoryOrderRepository::new();
        repo.set_fail_writes(true);

        let result = repo.insert(&order("PM1")).await;
        assert!(matches!(result, Err(DomainError::Repository(_))));
        assert!(repo.is_empty().await);
    }
}
