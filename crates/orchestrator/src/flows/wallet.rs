//! Flows settled inside the wallet ledger.
//!
//! There is no external provider: once funds are reserved the ledger
//! confirmation is the money movement.

use async_trait::async_trait;
use domain::{Order, OrderError, OrderType};

use super::{Flow, FlowKind};
use crate::error::ServiceError;
use crate::reservation::Requirements;
use crate::services::{ProviderResponse, Services, providers};

/// Confirms a deferred payment order.
#[derive(Debug, Clone, Copy)]
pub struct PaymentFlow;

#[async_trait]
impl Flow for PaymentFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Payment
    }

    fn order_type(&self) -> OrderType {
        OrderType::Payment
    }

    fn requirements(&self) -> Requirements {
        Requirements::none()
    }

    fn provider(&self) -> &'static str {
        providers::WALLET
    }

    async fn call_provider(
        &self,
        _services: &Services,
        _order: &Order,
    ) -> Result<ProviderResponse, ServiceError> {
        Ok(ProviderResponse::success())
    }
}

/// Transfer between two wallet users.
#[derive(Debug, Clone, Copy)]
pub struct Wal2WalFlow;

#[async_trait]
impl Flow for Wal2WalFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Wal2Wal
    }

    fn order_type(&self) -> OrderType {
        OrderType::Wal2Wal
    }

    fn requirements(&self) -> Requirements {
        Requirements::none().kyc()
    }

    fn provider(&self) -> &'static str {
        providers::WALLET
    }

    fn validate(&self, order: &Order) -> Result<(), OrderError> {
        match order.to_user_id.as_deref() {
            Some(to) if !to.is_empty() && to != order.user_id => Ok(()),
            _ => Err(OrderError::MissingPayload("recipient")),
        }
    }

    async fn call_provider(
        &self,
        _services: &Services,
        _order: &Order,
    ) -> Result<ProviderResponse, ServiceError> {
        Ok(ProviderResponse::success())
    }
}

/// Payment to a merchant's static QR code.
///
/// The plain variant holds the reservation until the user confirms it with
/// an OTP; the token variant is pre-authorized.
#[derive(Debug, Clone, Copy)]
pub struct StaticQrFlow {
    token: bool,
}

impl StaticQrFlow {
    pub fn new() -> Self {
        Self { token: false }
    }

    pub fn with_token() -> Self {
        Self { token: true }
    }
}

impl Default for StaticQrFlow {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Flow for StaticQrFlow {
    fn kind(&self) -> FlowKind {
        if self.token {
            FlowKind::StaticQrToken
        } else {
            FlowKind::StaticQr
        }
    }

    fn order_type(&self) -> OrderType {
        OrderType::StaticQr
    }

    fn requirements(&self) -> Requirements {
        let needs = Requirements::none().merchant_fee();
        if self.token { needs } else { needs.otp() }
    }

    fn provider(&self) -> &'static str {
        providers::MERCHANT
    }

    fn needs_payment_token(&self) -> bool {
        self.token
    }

    fn validate(&self, order: &Order) -> Result<(), OrderError> {
        match order.merchant_id.as_deref() {
            Some(m) if !m.is_empty() => Ok(()),
            _ => Err(OrderError::MissingPayload("merchant")),
        }
    }

    async fn call_provider(
        &self,
        _services: &Services,
        _order: &Order,
    ) -> Result<ProviderResponse, ServiceError> {
        Ok(ProviderResponse::success())
    }
}
