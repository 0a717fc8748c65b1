//! Telco card, top-up and bill payment flows.

use async_trait::async_trait;
use domain::{Order, OrderError, OrderType};

use super::{Flow, FlowKind};
use crate::error::ServiceError;
use crate::reservation::Requirements;
use crate::services::{
    BillPayment, CardPurchase, ProviderResponse, Services, TopUpRequest, providers,
};

/// Buys prepaid telco cards. The token variant pays with a payment token.
#[derive(Debug, Clone, Copy)]
pub struct BuyCardFlow {
    token: bool,
}

impl BuyCardFlow {
    pub fn new() -> Self {
        Self { token: false }
    }

    pub fn with_token() -> Self {
        Self { token: true }
    }
}

impl Default for BuyCardFlow {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Flow for BuyCardFlow {
    fn kind(&self) -> FlowKind {
        if self.token {
            FlowKind::BuyCardToken
        } else {
            FlowKind::BuyCard
        }
    }

    fn order_type(&self) -> OrderType {
        OrderType::BuyCard
    }

    fn requirements(&self) -> Requirements {
        Requirements::none()
    }

    fn provider(&self) -> &'static str {
        providers::CARD
    }

    fn needs_payment_token(&self) -> bool {
        self.token
    }

    fn validate(&self, order: &Order) -> Result<(), OrderError> {
        match &order.card {
            Some(card) if !card.telco.is_empty() && card.quantity > 0 => Ok(()),
            _ => Err(OrderError::MissingPayload("card")),
        }
    }

    async fn call_provider(
        &self,
        services: &Services,
        order: &Order,
    ) -> Result<ProviderResponse, ServiceError> {
        let card = order.card.clone().unwrap_or_default();
        let request = CardPurchase {
            order_id: order.order_id.clone(),
            user_id: order.user_id.clone(),
            card,
        };
        services.providers.buy_card(&request).await
    }

    fn apply_response(&self, order: &mut Order, response: &ProviderResponse) {
        if let Some(card) = order.card.as_mut()
            && !response.cards.is_empty()
        {
            card.cards = response.cards.clone();
        }
    }
}

/// Tops up a phone number's prepaid balance.
#[derive(Debug, Clone, Copy)]
pub struct TopUpFlow;

#[async_trait]
impl Flow for TopUpFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::TopUp
    }

    fn order_type(&self) -> OrderType {
        OrderType::TopUp
    }

    fn requirements(&self) -> Requirements {
        Requirements::none()
    }

    fn provider(&self) -> &'static str {
        providers::TOP_UP
    }

    fn validate(&self, order: &Order) -> Result<(), OrderError> {
        match &order.card {
            Some(card) if card.phone_number.as_deref().is_some_and(|p| !p.is_empty()) => Ok(()),
            _ => Err(OrderError::MissingPayload("phone number")),
        }
    }

    async fn call_provider(
        &self,
        services: &Services,
        order: &Order,
    ) -> Result<ProviderResponse, ServiceError> {
        let card = order.card.clone().unwrap_or_default();
        let request = TopUpRequest {
            order_id: order.order_id.clone(),
            telco: card.telco,
            phone_number: card.phone_number.unwrap_or_default(),
            amount: order.amount,
        };
        services.providers.top_up(&request).await
    }
}

/// Pays a utility bill.
#[derive(Debug, Clone, Copy)]
pub struct PayBillFlow;

#[async_trait]
impl Flow for PayBillFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::PayBill
    }

    fn order_type(&self) -> OrderType {
        OrderType::PayBill
    }

    fn requirements(&self) -> Requirements {
        Requirements::none()
    }

    fn provider(&self) -> &'static str {
        providers::BILL
    }

    fn validate(&self, order: &Order) -> Result<(), OrderError> {
        match &order.bill {
            Some(bill) if !bill.bill_code.is_empty() && !bill.provider_code.is_empty() => Ok(()),
            _ => Err(OrderError::MissingPayload("bill")),
        }
    }

    async fn call_provider(
        &self,
        services: &Services,
        order: &Order,
    ) -> Result<ProviderResponse, ServiceError> {
        let Some(bill) = order.bill.clone() else {
            return Err(ServiceError::rejected(providers::BILL, "BILL", "Missing bill information"));
        };
        let request = BillPayment {
            order_id: order.order_id.clone(),
            bill,
            amount: order.amount,
        };
        services.providers.pay_bill(&request).await
    }
}
