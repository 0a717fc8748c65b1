//! Product flows run by the [`FlowEngine`].
//!
//! A flow only says what is specific to its product: the order type, which
//! pre-checks apply, the provider it calls and how the provider answer is
//! recorded on the order. The engine runs the reservation protocol around
//! it.

mod bank;
mod card;
mod engine;
mod wallet;

use std::sync::Arc;

use async_trait::async_trait;
use domain::{NewOrder, Order, OrderError, OrderType};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::reservation::Requirements;
use crate::services::{ProviderResponse, Services};

pub use bank::{CashInFlow, CashOutFlow, IbftFlow, Wal2BankFlow};
pub use card::{BuyCardFlow, PayBillFlow, TopUpFlow};
pub use engine::{DEFAULT_ORDER_TTL_SECS, FlowEngine, FlowResponse};
pub use wallet::{PaymentFlow, StaticQrFlow, Wal2WalFlow};

/// Every flow the engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Payment,
    BuyCard,
    BuyCardToken,
    TopUp,
    PayBill,
    Wal2Bank,
    Wal2Wal,
    CashIn,
    CashOut,
    Ibft,
    StaticQr,
    StaticQrToken,
}

impl FlowKind {
    pub const ALL: [FlowKind; 12] = [
        FlowKind::Payment,
        FlowKind::BuyCard,
        FlowKind::BuyCardToken,
        FlowKind::TopUp,
        FlowKind::PayBill,
        FlowKind::Wal2Bank,
        FlowKind::Wal2Wal,
        FlowKind::CashIn,
        FlowKind::CashOut,
        FlowKind::Ibft,
        FlowKind::StaticQr,
        FlowKind::StaticQrToken,
    ];

    /// The flow that confirms a deferred order of `order_type`.
    pub fn for_order_type(order_type: OrderType) -> Option<FlowKind> {
        match order_type {
            OrderType::Payment => Some(FlowKind::Payment),
            OrderType::BuyCard => Some(FlowKind::BuyCard),
            OrderType::TopUp => Some(FlowKind::TopUp),
            OrderType::PayBill => Some(FlowKind::PayBill),
            OrderType::Wal2Bank => Some(FlowKind::Wal2Bank),
            OrderType::Wal2Wal => Some(FlowKind::Wal2Wal),
            OrderType::CashIn => Some(FlowKind::CashIn),
            OrderType::CashOut => Some(FlowKind::CashOut),
            OrderType::Ibft => Some(FlowKind::Ibft),
            OrderType::StaticQr => Some(FlowKind::StaticQr),
            OrderType::Refund => None,
        }
    }

    /// The flow an order was created for.
    ///
    /// Orders that predate the recorded flow name fall back to the default
    /// flow of their order type.
    pub fn for_order(order: &Order) -> Option<FlowKind> {
        order
            .flow
            .as_deref()
            .and_then(FlowKind::from_name)
            .or_else(|| FlowKind::for_order_type(order.order_type))
    }

    pub fn from_name(name: &str) -> Option<FlowKind> {
        FlowKind::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Payment => "payment",
            FlowKind::BuyCard => "buy_card",
            FlowKind::BuyCardToken => "buy_card_token",
            FlowKind::TopUp => "top_up",
            FlowKind::PayBill => "pay_bill",
            FlowKind::Wal2Bank => "wal2bank",
            FlowKind::Wal2Wal => "wal2wal",
            FlowKind::CashIn => "cash_in",
            FlowKind::CashOut => "cash_out",
            FlowKind::Ibft => "ibft",
            FlowKind::StaticQr => "static_qr",
            FlowKind::StaticQrToken => "static_qr_token",
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The product-specific part of a money-moving flow.
#[async_trait]
pub trait Flow: Send + Sync {
    fn kind(&self) -> FlowKind;

    fn order_type(&self) -> OrderType;

    fn requirements(&self) -> Requirements;

    /// Name of the code table used to classify the provider answer.
    fn provider(&self) -> &'static str;

    /// Whether the request must carry a payment token.
    fn needs_payment_token(&self) -> bool {
        false
    }

    /// Adjusts the order before it is initialized.
    fn prepare(&self, _order: &mut NewOrder) {}

    /// Checks the flow's payload on the initialized order.
    fn validate(&self, _order: &Order) -> Result<(), OrderError> {
        Ok(())
    }

    /// Performs the money movement at the provider.
    async fn call_provider(
        &self,
        services: &Services,
        order: &Order,
    ) -> Result<ProviderResponse, ServiceError>;

    /// Records what the provider returned on the order.
    fn apply_response(&self, _order: &mut Order, _response: &ProviderResponse) {}
}

/// Every built-in flow.
pub fn default_flows() -> Vec<Arc<dyn Flow>> {
    vec![
        Arc::new(PaymentFlow),
        Arc::new(BuyCardFlow::new()),
        Arc::new(BuyCardFlow::with_token()),
        Arc::new(TopUpFlow),
        Arc::new(PayBillFlow),
        Arc::new(Wal2BankFlow),
        Arc::new(Wal2WalFlow),
        Arc::new(CashInFlow),
        Arc::new(CashOutFlow),
        Arc::new(IbftFlow),
        Arc::new(StaticQrFlow::new()),
        Arc::new(StaticQrFlow::with_token()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_flows_cover_every_kind() {
        let kinds: HashSet<FlowKind> = default_flows().iter().map(|f| f.kind()).collect();
        assert_eq!(kinds.len(), FlowKind::ALL.len());
        for kind in FlowKind::ALL {
            assert!(kinds.contains(&kind), "missing {kind}");
        }
    }

    #[test]
    fn test_confirmable_order_types() {
        assert_eq!(
            FlowKind::for_order_type(OrderType::StaticQr),
            Some(FlowKind::StaticQr)
        );
        assert_eq!(FlowKind::for_order_type(OrderType::Refund), None);
        for flow in default_flows() {
            let kind = FlowKind::for_order_type(flow.order_type()).unwrap();
            assert_eq!(
                default_flows()
                    .iter()
                    .find(|f| f.kind() == kind)
                    .unwrap()
                    .order_type(),
                flow.order_type()
            );
        }
    }

    #[tokio::test]
    async fn test_recorded_flow_wins_over_order_type() {
        let orders = domain::OrderService::new(
            domain::InMemoryOrderRepository::new(),
            domain::InMemoryEventPublisher::new(),
            common::PrefixCounter::new(),
            common::TaskPool::new("flows-test", 1),
        );
        let new_order = NewOrder::new(OrderType::BuyCard, "u1", domain::Money::new(1))
            .with_flow(FlowKind::BuyCardToken.as_str());
        let mut order = orders.init_order(new_order).await.unwrap();
        assert_eq!(FlowKind::for_order(&order), Some(FlowKind::BuyCardToken));

        order.flow = None;
        assert_eq!(FlowKind::for_order(&order), Some(FlowKind::BuyCard));

        order.flow = Some("unknown".into());
        assert_eq!(FlowKind::for_order(&order), Some(FlowKind::BuyCard));

        for kind in FlowKind::ALL {
            assert_eq!(FlowKind::from_name(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_token_flows_skip_otp() {
        let flows = default_flows();
        let find = |kind| flows.iter().find(|f| f.kind() == kind).unwrap();
        assert!(find(FlowKind::StaticQr).requirements().otp);
        assert!(!find(FlowKind::StaticQrToken).requirements().otp);
        assert!(find(FlowKind::StaticQrToken).needs_payment_token());
        assert!(find(FlowKind::BuyCardToken).needs_payment_token());
    }
}
