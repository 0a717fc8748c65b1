//! Flows moving money between the wallet and bank accounts.

use async_trait::async_trait;
use domain::{NewOrder, Order, OrderError, OrderType, SourceOfFund};

use super::{Flow, FlowKind};
use crate::error::ServiceError;
use crate::reservation::Requirements;
use crate::services::{BankTransfer, ProviderResponse, Services, providers};

fn validate_bank(order: &Order) -> Result<(), OrderError> {
    match &order.bank {
        Some(bank) if !bank.bank_code.is_empty() && !bank.account_number.is_empty() => Ok(()),
        _ => Err(OrderError::MissingPayload("bank account")),
    }
}

fn transfer(order: &Order, provider: &'static str) -> Result<BankTransfer, ServiceError> {
    let Some(bank) = order.bank.clone() else {
        return Err(ServiceError::rejected(
            provider,
            "BANK",
            "Missing bank account information",
        ));
    };
    Ok(BankTransfer {
        order_id: order.order_id.clone(),
        user_id: order.user_id.clone(),
        bank,
        amount: order.amount,
    })
}

fn record_bank_reference(order: &mut Order, response: &ProviderResponse) {
    if let Some(bank) = order.bank.as_mut()
        && response.reference.is_some()
    {
        bank.bank_trans_id = response.reference.clone();
    }
}

/// Wallet to the user's linked bank account.
#[derive(Debug, Clone, Copy)]
pub struct Wal2BankFlow;

#[async_trait]
impl Flow for Wal2BankFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Wal2Bank
    }

    fn order_type(&self) -> OrderType {
        OrderType::Wal2Bank
    }

    fn requirements(&self) -> Requirements {
        Requirements::none().kyc().bank_link()
    }

    fn provider(&self) -> &'static str {
        providers::BANK
    }

    fn validate(&self, order: &Order) -> Result<(), OrderError> {
        validate_bank(order)
    }

    async fn call_provider(
        &self,
        services: &Services,
        order: &Order,
    ) -> Result<ProviderResponse, ServiceError> {
        let request = transfer(order, providers::BANK)?;
        services.bank.transfer_to_bank(&request).await
    }

    fn apply_response(&self, order: &mut Order, response: &ProviderResponse) {
        record_bank_reference(order, response);
    }
}

/// Linked bank account to wallet. The bank is the source of funds.
#[derive(Debug, Clone, Copy)]
pub struct CashInFlow;

#[async_trait]
impl Flow for CashInFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::CashIn
    }

    fn order_type(&self) -> OrderType {
        OrderType::CashIn
    }

    fn requirements(&self) -> Requirements {
        Requirements::none().bank_link()
    }

    fn provider(&self) -> &'static str {
        providers::CASH_IN
    }

    fn prepare(&self, order: &mut NewOrder) {
        order.source_of_fund = SourceOfFund::Bank;
    }

    fn validate(&self, order: &Order) -> Result<(), OrderError> {
        validate_bank(order)
    }

    async fn call_provider(
        &self,
        services: &Services,
        order: &Order,
    ) -> Result<ProviderResponse, ServiceError> {
        let request = transfer(order, providers::CASH_IN)?;
        services.bank.cash_in(&request).await
    }

    fn apply_response(&self, order: &mut Order, response: &ProviderResponse) {
        record_bank_reference(order, response);
    }
}

/// Wallet to linked bank account, withdrawn as cash.
#[derive(Debug, Clone, Copy)]
pub struct CashOutFlow;

#[async_trait]
impl Flow for CashOutFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::CashOut
    }

    fn order_type(&self) -> OrderType {
        OrderType::CashOut
    }

    fn requirements(&self) -> Requirements {
        Requirements::none().kyc().bank_link()
    }

    fn provider(&self) -> &'static str {
        providers::CASH_OUT
    }

    fn validate(&self, order: &Order) -> Result<(), OrderError> {
        validate_bank(order)
    }

    async fn call_provider(
        &self,
        services: &Services,
        order: &Order,
    ) -> Result<ProviderResponse, ServiceError> {
        let request = transfer(order, providers::CASH_OUT)?;
        services.bank.cash_out(&request).await
    }

    fn apply_response(&self, order: &mut Order, response: &ProviderResponse) {
        record_bank_reference(order, response);
    }
}

/// Interbank transfer to any account.
#[derive(Debug, Clone, Copy)]
pub struct IbftFlow;

#[async_trait]
impl Flow for IbftFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Ibft
    }

    fn order_type(&self) -> OrderType {
        OrderType::Ibft
    }

    fn requirements(&self) -> Requirements {
        Requirements::none().kyc()
    }

    fn provider(&self) -> &'static str {
        providers::IBFT
    }

    fn validate(&self, order: &Order) -> Result<(), OrderError> {
        validate_bank(order)
    }

    async fn call_provider(
        &self,
        services: &Services,
        order: &Order,
    ) -> Result<ProviderResponse, ServiceError> {
        let request = transfer(order, providers::IBFT)?;
        services.bank.ibft_transfer(&request).await
    }

    fn apply_response(&self, order: &mut Order, response: &ProviderResponse) {
        record_bank_reference(order, response);
    }
}
