//! Order status events.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use super::{Money, Order, OrderStatus, OrderType};

/// Published after an order status change has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub user_id: String,
    pub order_type: OrderType,
    pub amount: Money,
    /// `None` when the order was just initialized.
    pub previous: Option<OrderStatus>,
    pub status: OrderStatus,
    pub message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl OrderStatusChanged {
    pub fn new(order: &Order, previous: Option<OrderStatus>) -> Self {
        Self {
            order_id: order.order_id.clone(),
            user_id: order.user_id.clone(),
            order_type: order.order_type,
            amount: order.amount,
            previous,
            status: order.status,
            message: order.message.clone(),
            occurred_at: order.updated_at,
        }
    }

    pub fn topic(&self) -> String {
        format!("order.status.{}", self.user_id)
    }

    pub fn event_type(&self) -> &'static str {
        match self.previous {
            None => "OrderInitialized",
            Some(_) => "OrderStatusChanged",
        }
    }
}
