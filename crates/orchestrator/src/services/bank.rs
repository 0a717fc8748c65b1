//! Bank gateway trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::{BankInfo, Money};

use crate::error::ServiceError;

use super::provider::{ProviderResponse, Script, Scripted};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankTransfer {
    pub order_id: OrderId,
    pub user_id: String,
    pub bank: BankInfo,
    pub amount: Money,
}

/// Trait for bank-side money movement.
#[async_trait]
pub trait BankGateway: Send + Sync {
    /// Wallet to linked bank account.
    async fn transfer_to_bank(&self, request: &BankTransfer)
    -> Result<ProviderResponse, ServiceError>;

    /// Interbank transfer to any account.
    async fn ibft_transfer(&self, request: &BankTransfer) -> Result<ProviderResponse, ServiceError>;

    /// Linked bank account to wallet.
    async fn cash_in(&self, request: &BankTransfer) -> Result<ProviderResponse, ServiceError>;

    /// Wallet to linked bank account, withdrawn as cash.
    async fn cash_out(&self, request: &BankTransfer) -> Result<ProviderResponse, ServiceError>;

    /// Polls the gateway for the result of an earlier operation.
    async fn retrieve_order_status(
        &self,
        order_id: &OrderId,
    ) -> Result<ProviderResponse, ServiceError>;
}

/// In-memory bank gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBankGateway {
    state: Arc<RwLock<Script>>,
}

impl InMemoryBankGateway {
    pub const TRANSFER_TO_BANK: &'static str = "transfer_to_bank";
    pub const IBFT_TRANSFER: &'static str = "ibft_transfer";
    pub const CASH_IN: &'static str = "cash_in";
    pub const CASH_OUT: &'static str = "cash_out";
    pub const RETRIEVE_ORDER_STATUS: &'static str = "retrieve_order_status";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_response(&self, operation: &'static str, response: Scripted) {
        self.state.write().unwrap().set(operation, response);
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.state.read().unwrap().calls(operation)
    }

    fn call(&self, operation: &'static str, order_id: &OrderId) -> Result<ProviderResponse, ServiceError> {
        let mut response = self.state.write().unwrap().call(operation)?;
        response.reference = Some(format!("BANK-{order_id}"));
        Ok(response)
    }
}

#[async_trait]
impl BankGateway for InMemoryBankGateway {
    async fn transfer_to_bank(
        &self,
        request: &BankTransfer,
    ) -> Result<ProviderResponse, ServiceError> {
        self.call(Self::TRANSFER_TO_BANK, &request.order_id)
    }

    async fn ibft_transfer(&self, request: &BankTransfer) -> Result<ProviderResponse, ServiceError> {
        self.call(Self::IBFT_TRANSFER, &request.order_id)
    }

    async fn cash_in(&self, request: &BankTransfer) -> Result<ProviderResponse, ServiceError> {
        self.call(Self::CASH_IN, &request.order_id)
    }

    async fn cash_out(&self, request: &BankTransfer) -> Result<ProviderResponse, ServiceError> {
        self.call(Self::CASH_OUT, &request.order_id)
    }

    async fn retrieve_order_status(
        &self,
        order_id: &OrderId,
    ) -> Result<ProviderResponse, ServiceError> {
        self.call(Self::RETRIEVE_ORDER_STATUS, order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_success_with_reference() {
        let gateway = InMemoryBankGateway::new();
        let transfer = BankTransfer {
            order_id: OrderId::new("WB1"),
            user_id: "u1".into(),
            bank: BankInfo::default(),
            amount: Money::new(500_000),
        };

        let response = gateway.transfer_to_bank(&transfer).await.unwrap();
        assert_eq!(response.code, "00");
        assert_eq!(response.reference.as_deref(), Some("BANK-WB1"));
        assert_eq!(gateway.call_count(InMemoryBankGateway::TRANSFER_TO_BANK), 1);
        assert_eq!(gateway.call_count(InMemoryBankGateway::CASH_IN), 0);
    }

    #[tokio::test]
    async fn test_scripted_poll() {
        let gateway = InMemoryBankGateway::new();
        gateway.set_response(
            InMemoryBankGateway::RETRIEVE_ORDER_STATUS,
            Scripted::code("PROCESSING"),
        );

        let response = gateway
            .retrieve_order_status(&OrderId::new("CO1"))
            .await
            .unwrap();
        assert_eq!(response.code, "PROCESSING");
    }
}
