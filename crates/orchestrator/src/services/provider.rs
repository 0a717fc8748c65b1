//! Card and bill provider trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::{BillInfo, CardInfo, Money, PurchasedCard};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Status code most providers use for success.
pub const CODE_SUCCESS: &str = "00";

/// Raw answer of a provider call, classified later against the
/// provider's code table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub code: String,
    pub message: String,
    /// Provider-side reference of the operation.
    pub reference: Option<String>,
    #[serde(default)]
    pub cards: Vec<PurchasedCard>,
}

impl ProviderResponse {
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn success() -> Self {
        Self::with_code(CODE_SUCCESS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardPurchase {
    pub order_id: OrderId,
    pub user_id: String,
    pub card: CardInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpRequest {
    pub order_id: OrderId,
    pub telco: String,
    pub phone_number: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillPayment {
    pub order_id: OrderId,
    pub bill: BillInfo,
    pub amount: Money,
}

/// Trait for telco card, top-up and bill providers.
#[async_trait]
pub trait CardBillProvider: Send + Sync {
    async fn buy_card(&self, request: &CardPurchase) -> Result<ProviderResponse, ServiceError>;

    async fn top_up(&self, request: &TopUpRequest) -> Result<ProviderResponse, ServiceError>;

    async fn pay_bill(&self, request: &BillPayment) -> Result<ProviderResponse, ServiceError>;
}

/// What a scripted in-memory call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Code(String),
    Unavailable,
}

impl Scripted {
    pub fn code(code: &str) -> Self {
        Scripted::Code(code.to_string())
    }

    pub(crate) fn respond(
        &self,
        service: &'static str,
    ) -> Result<ProviderResponse, ServiceError> {
        match self {
            Scripted::Code(code) => Ok(ProviderResponse::with_code(code.clone())),
            Scripted::Unavailable => Err(ServiceError::unavailable(service, "request timed out")),
        }
    }
}

/// Per-operation scripted responses and call counters.
#[derive(Debug, Default)]
pub(crate) struct Script {
    responses: HashMap<&'static str, Scripted>,
    calls: HashMap<&'static str, usize>,
}

impl Script {
    pub(crate) fn set(&mut self, operation: &'static str, response: Scripted) {
        self.responses.insert(operation, response);
    }

    /// Records a call and returns its scripted response, success by default.
    pub(crate) fn call(&mut self, operation: &'static str) -> Result<ProviderResponse, ServiceError> {
        *self.calls.entry(operation).or_default() += 1;
        self.responses
            .get(operation)
            .cloned()
            .unwrap_or_else(|| Scripted::code(CODE_SUCCESS))
            .respond(operation)
    }

    pub(crate) fn calls(&self, operation: &str) -> usize {
        self.calls.get(operation).copied().unwrap_or(0)
    }
}

/// In-memory card and bill provider for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCardBillProvider {
    state: Arc<RwLock<Script>>,
}

impl InMemoryCardBillProvider {
    pub const BUY_CARD: &'static str = "buy_card";
    pub const TOP_UP: &'static str = "top_up";
    pub const PAY_BILL: &'static str = "pay_bill";

    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the response of `operation` (one of the associated constants).
    pub fn set_response(&self, operation: &'static str, response: Scripted) {
        self.state.write().unwrap().set(operation, response);
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.state.read().unwrap().calls(operation)
    }
}

#[async_trait]
impl CardBillProvider for InMemoryCardBillProvider {
    async fn buy_card(&self, request: &CardPurchase) -> Result<ProviderResponse, ServiceError> {
        let mut response = self.state.write().unwrap().call(Self::BUY_CARD)?;
        if response.code == CODE_SUCCESS {
            response.cards = (0..request.card.quantity)
                .map(|i| PurchasedCard {
                    serial: format!("{}-{}-{i:03}", request.card.telco, request.order_id),
                    pin: format!("{:012}", i + 1),
                    expired_at: None,
                })
                .collect();
        }
        Ok(response)
    }

    async fn top_up(&self, _request: &TopUpRequest) -> Result<ProviderResponse, ServiceError> {
        self.state.write().unwrap().call(Self::TOP_UP)
    }

    async fn pay_bill(&self, _request: &BillPayment) -> Result<ProviderResponse, ServiceError> {
        self.state.write().unwrap().call(Self::PAY_BILL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase(quantity: u32) -> CardPurchase {
        CardPurchase {
            order_id: OrderId::new("BC1"),
            user_id: "u1".into(),
            card: CardInfo {
                telco: "VTT".into(),
                card_value: Money::new(10_000),
                quantity,
                ..CardInfo::default()
            },
        }
    }

    #[tokio::test]
    async fn test_buy_card_delivers_cards() {
        let provider = InMemoryCardBillProvider::new();
        let response = provider.buy_card(&purchase(2)).await.unwrap();

        assert_eq!(response.code, CODE_SUCCESS);
        assert_eq!(response.cards.len(), 2);
        assert_eq!(provider.call_count(InMemoryCardBillProvider::BUY_CARD), 1);
    }

    #[tokio::test]
    async fn test_scripted_responses() {
        let provider = InMemoryCardBillProvider::new();
        provider.set_response(InMemoryCardBillProvider::BUY_CARD, Scripted::code("99"));
        provider.set_response(InMemoryCardBillProvider::PAY_BILL, Scripted::Unavailable);

        let response = provider.buy_card(&purchase(1)).await.unwrap();
        assert_eq!(response.code, "99");
        assert!(response.cards.is_empty());

        let bill = BillPayment {
            order_id: OrderId::new("PB1"),
            bill: BillInfo::default(),
            amount: Money::new(1),
        };
        assert!(provider.pay_bill(&bill).await.unwrap_err().is_transport());
    }
}
