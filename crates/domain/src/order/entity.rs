//! The order document.

use chrono::{DateTime, Utc};
use common::{OrderId, TransactionId};
use serde::{Deserialize, Serialize};

use super::{
    BankInfo, BillInfo, CardInfo, Money, OrderStatus, OrderType, RefundInfo, SourceOfFund,
};

/// The client-facing record of a requested money movement.
///
/// Status changes go through [`crate::OrderService`]; every other field is
/// plain data the flows fill in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub service_id: String,
    pub order_type: OrderType,
    pub sub_order_type: String,
    /// Name of the flow the order was created for.
    #[serde(default)]
    pub flow: Option<String>,
    pub amount: Money,
    pub source_of_fund: SourceOfFund,
    pub voucher_code: Option<String>,
    pub voucher_id: Option<String>,
    pub discount_amount: Money,
    pub fee: Money,
    pub user_id: String,
    pub to_user_id: Option<String>,
    pub merchant_id: Option<String>,
    pub device_id: Option<String>,
    pub ref_id: Option<String>,
    /// Set once the ledger reservation succeeds.
    pub transaction_id: Option<TransactionId>,
    pub status: OrderStatus,
    /// Last failure reason.
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Orders without expiry are never reaped.
    pub expired_at: Option<DateTime<Utc>>,
    pub card: Option<CardInfo>,
    pub bill: Option<BillInfo>,
    pub bank: Option<BankInfo>,
    pub refund: Option<RefundInfo>,
}

impl Order {
    /// Amount the ledger reserves: the order amount less any voucher
    /// discount, plus the fee.
    pub fn payable_amount(&self) -> Money {
        self.amount.saturating_sub(self.discount_amount) + self.fee
    }

    pub fn has_voucher(&self) -> bool {
        self.voucher_id.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expired_at.is_some_and(|at| at < now)
    }

    /// Event topic for status changes of this order.
    pub fn status_topic(&self) -> String {
        format!("order.status.{}", self.user_id)
    }
}

/// Everything needed to initialize an order.
///
/// The ID, status and timestamps are assigned by
/// [`crate::OrderService::init_order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub service_id: String,
    pub order_type: OrderType,
    pub sub_order_type: String,
    pub flow: Option<String>,
    pub amount: Money,
    pub source_of_fund: SourceOfFund,
    pub voucher_code: Option<String>,
    pub user_id: String,
    pub to_user_id: Option<String>,
    pub merchant_id: Option<String>,
    pub device_id: Option<String>,
    pub ref_id: Option<String>,
    pub expired_at: Option<DateTime<Utc>>,
    pub card: Option<CardInfo>,
    pub bill: Option<BillInfo>,
    pub bank: Option<BankInfo>,
    pub refund: Option<RefundInfo>,
}

impl NewOrder {
    pub fn new(order_type: OrderType, user_id: impl Into<String>, amount: Money) -> Self {
        Self {
            service_id: String::new(),
            order_type,
            sub_order_type: String::new(),
            flow: None,
            amount,
            source_of_fund: SourceOfFund::default(),
            voucher_code: None,
            user_id: user_id.into(),
            to_user_id: None,
            merchant_id: None,
            device_id: None,
            ref_id: None,
            expired_at: None,
            card: None,
            bill: None,
            bank: None,
            refund: None,
        }
    }

    pub fn with_voucher(mut self, code: impl Into<String>) -> Self {
        self.voucher_code = Some(code.into());
        self
    }

    pub fn with_merchant(mut self, merchant_id: impl Into<String>) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }

    pub fn with_flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    pub fn with_expiry(mut self, expired_at: DateTime<Utc>) -> Self {
        self.expired_at = Some(expired_at);
        self
    }

    pub(crate) fn into_order(self, order_id: OrderId, now: DateTime<Utc>) -> Order {
        Order {
            order_id,
            service_id: self.service_id,
            order_type: self.order_type,
            sub_order_type: self.sub_order_type,
            flow: self.flow,
            amount: self.amount,
            source_of_fund: self.source_of_fund,
            voucher_code: self.voucher_code,
            voucher_id: None,
            discount_amount: Money::zero(),
            fee: Money::zero(),
            user_id: self.user_id,
            to_user_id: self.to_user_id,
            merchant_id: self.merchant_id,
            device_id: self.device_id,
            ref_id: self.ref_id,
            transaction_id: None,
            status: OrderStatus::Pending,
            message: None,
            created_at: now,
            updated_at: now,
            expired_at: self.expired_at,
            card: self.card,
            bill: self.bill,
            bank: self.bank,
            refund: self.refund,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn order(amount: i64) -> Order {
        NewOrder::new(OrderType::BuyCard, "user-1", Money::new(amount))
            .into_order(OrderId::new("BC2601010000000001"), Utc::now())
    }

    #[test]
    fn test_new_order_starts_pending() {
        let order = order(10_000);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.transaction_id.is_none());
        assert_eq!(order.created_at, order.updated_at);
    }

    #[test]
    fn test_payable_amount_applies_discount_and_fee() {
        let mut order = order(10_000);
        order.discount_amount = Money::new(2_000);
        order.fee = Money::new(500);
        assert_eq!(order.payable_amount(), Money::new(8_500));

        order.discount_amount = Money::new(20_000);
        assert_eq!(order.payable_amount(), Money::new(500));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let mut order = order(1);
        assert!(!order.is_expired(now));

        order.expired_at = Some(now - Duration::seconds(1));
        assert!(order.is_expired(now));

        order.expired_at = Some(now + Duration::minutes(15));
        assert!(!order.is_expired(now));
    }

    #[test]
    fn test_status_topic_uses_user() {
        assert_eq!(order(1).status_topic(), "order.status.user-1");
    }

    #[test]
    fn test_serialization() {
        let order = order(10_000);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["status"], "ORDER_PENDING");
        assert_eq!(json["order_type"], "BUY_CARD");
        assert_eq!(json["amount"], 10_000);

        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
    }
}
