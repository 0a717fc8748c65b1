//! Refunds of successful orders.
//!
//! The merchant's refund rules decide whether a refund is paid out right
//! away (`AUTO`) or left `PROCESSING` for an operator (`MANUAL`).

use chrono::{Duration, Utc};
use common::OrderId;
use domain::{
    EventPublisher, Money, NewOrder, Order, OrderRepository, OrderService, OrderStatus, OrderType,
    RefundInfo, RefundMode, RefundType,
};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};
use crate::flows::DEFAULT_ORDER_TTL_SECS;
use crate::services::{RefundTransactionRequest, Services};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub original_order_id: OrderId,
    pub amount: Money,
    #[serde(default)]
    pub refund_type: RefundType,
    #[serde(default)]
    pub ref_id: Option<String>,
}

pub struct RefundService<R: OrderRepository, P: EventPublisher> {
    orders: OrderService<R, P>,
    services: Services,
    order_ttl: Duration,
}

impl<R: OrderRepository, P: EventPublisher> Clone for RefundService<R, P> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            services: self.services.clone(),
            order_ttl: self.order_ttl,
        }
    }
}

impl<R: OrderRepository, P: EventPublisher> RefundService<R, P> {
    pub fn new(orders: OrderService<R, P>, services: Services) -> Self {
        Self {
            orders,
            services,
            order_ttl: Duration::seconds(DEFAULT_ORDER_TTL_SECS),
        }
    }

    pub fn with_order_ttl(mut self, ttl: Duration) -> Self {
        self.order_ttl = ttl;
        self
    }

    /// Creates a refund order for `request` and carries it out if the
    /// merchant's rules allow an automatic refund.
    #[tracing::instrument(skip(self, request), fields(original_order_id = %request.original_order_id, amount = %request.amount))]
    pub async fn init_refund(&self, request: &RefundRequest) -> Result<Order> {
        let original = self
            .orders
            .get_order(&request.original_order_id)
            .await?
            .ok_or_else(|| OrchestratorError::OrderNotFound(request.original_order_id.clone()))?;

        let mut new_order = NewOrder::new(OrderType::Refund, original.user_id.clone(), request.amount);
        new_order.service_id = original.service_id.clone();
        new_order.source_of_fund = original.source_of_fund;
        new_order.merchant_id = original.merchant_id.clone();
        new_order.ref_id = request.ref_id.clone();
        new_order.expired_at = Some(Utc::now() + self.order_ttl);
        new_order.refund = Some(RefundInfo {
            original_order_id: original.order_id.clone(),
            refund_type: request.refund_type,
            refund_mode: None,
        });
        let mut order = self.orders.init_order(new_order).await?;

        if original.status != OrderStatus::Success {
            return self.reject(&order, "Original order is not successful").await;
        }
        if !request.amount.is_positive() || request.amount > original.amount {
            return self.reject(&order, "Invalid refund amount").await;
        }
        let refunded = self.refunded_amount(&original, &order).await?;
        if refunded + request.amount > original.amount {
            tracing::info!(refunded = %refunded, "refund exceeds the remaining amount");
            return self.reject(&order, "Refund exceeds the remaining amount").await;
        }

        let mode = match self.refund_mode(&original, request).await {
            Ok(mode) => mode,
            Err(reason) => return self.reject(&order, reason).await,
        };
        metrics::counter!("refunds_total", "mode" => mode_label(mode)).increment(1);
        tracing::info!(order_id = %order.order_id, mode = mode_label(mode), "refund mode decided");

        if let Some(refund) = order.refund.as_mut() {
            refund.refund_mode = Some(mode);
        }

        if mode == RefundMode::Manual {
            // Left for an operator; the reaper must not cancel it
            order.expired_at = None;
            return Ok(self.orders.processing_order(&order).await?);
        }

        let mut order = self.orders.processing_order(&order).await?;
        if order.status != OrderStatus::Processing {
            return Ok(order);
        }

        let refund = RefundTransactionRequest {
            refund_order_id: order.order_id.clone(),
            original_transaction_id: original.transaction_id.clone(),
            user_id: original.user_id.clone(),
            merchant_id: original.merchant_id.clone(),
            amount: request.amount,
            refund_type: request.refund_type,
        };
        match self.services.ledger.refund_transaction(&refund).await {
            Ok(transaction_id) => {
                order.transaction_id = Some(transaction_id);
                Ok(self.orders.success_order(&order).await?)
            }
            Err(e) if e.is_transport() => {
                tracing::warn!(order_id = %order.order_id, error = %e, "refund outcome unknown");
                order.message = Some(e.reason());
                Ok(self.orders.verifying_order(&order).await?)
            }
            Err(e) => Ok(self.orders.failed_order(&order, e.reason()).await?),
        }
    }

    /// Sum of the other refunds of `original` that may still pay out.
    async fn refunded_amount(&self, original: &Order, current: &Order) -> Result<Money> {
        let refunds = self.orders.find_refunds(&original.order_id).await?;
        Ok(refunds
            .iter()
            .filter(|r| r.order_id != current.order_id)
            .filter(|r| !matches!(r.status, OrderStatus::Failed | OrderStatus::Cancel))
            .fold(Money::zero(), |sum, r| sum + r.amount))
    }

    /// First matching merchant rule wins; no match means manual.
    async fn refund_mode(
        &self,
        original: &Order,
        request: &RefundRequest,
    ) -> std::result::Result<RefundMode, String> {
        let Some(merchant_id) = original.merchant_id.as_deref() else {
            return Ok(RefundMode::Manual);
        };

        let rules = self
            .services
            .wallet_config
            .refund_rules(merchant_id)
            .await
            .map_err(|e| e.reason())?;
        let payment_status = self
            .services
            .merchants
            .get_payment_status(merchant_id)
            .await
            .map_err(|e| e.reason())?;

        let mode = rules
            .iter()
            .find(|rule| rule.matches(original.source_of_fund, payment_status, request.amount))
            .map_or(RefundMode::Manual, |rule| rule.mode);

        if mode == RefundMode::Auto && request.refund_type == RefundType::Indirect {
            let balance = self
                .services
                .merchants
                .get_merchant_balance(merchant_id)
                .await
                .map_err(|e| e.reason())?;
            if balance.available() < request.amount {
                tracing::info!(merchant_id, available = %balance.available(), "merchant balance too low for automatic refund");
                return Ok(RefundMode::Manual);
            }
        }
        Ok(mode)
    }

    async fn reject(&self, order: &Order, reason: impl Into<String>) -> Result<Order> {
        Ok(self.orders.failed_order(order, reason).await?)
    }
}

fn mode_label(mode: RefundMode) -> &'static str {
    match mode {
        RefundMode::Auto => "auto",
        RefundMode::Manual => "manual",
    }
}
