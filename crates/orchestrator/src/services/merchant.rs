//! Merchant fee and settlement service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

const SERVICE: &str = "merchant-fee";

/// Whether the merchant has been paid out for its sales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
}

/// Funds a merchant can refund from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantBalance {
    pub settlement: Money,
    pub cash: Money,
}

impl MerchantBalance {
    pub fn available(&self) -> Money {
        self.settlement + self.cash
    }
}

/// Trait for merchant quota, fee and balance lookups.
#[async_trait]
pub trait MerchantFeeService: Send + Sync {
    /// Checks the merchant's quota and returns the merchant fee.
    async fn check_merchant_quota_and_fee(
        &self,
        merchant_id: &str,
        amount: Money,
    ) -> Result<Money, ServiceError>;

    async fn get_merchant_balance(&self, merchant_id: &str)
    -> Result<MerchantBalance, ServiceError>;

    async fn get_payment_status(&self, merchant_id: &str) -> Result<PaymentStatus, ServiceError>;
}

#[derive(Debug, Clone)]
struct MerchantAccount {
    fee: Money,
    quota: Option<Money>,
    balance: MerchantBalance,
    payment_status: PaymentStatus,
}

#[derive(Debug, Default)]
struct InMemoryMerchantState {
    merchants: HashMap<String, MerchantAccount>,
}

/// In-memory merchant fee service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMerchantFeeService {
    state: Arc<RwLock<InMemoryMerchantState>>,
}

impl InMemoryMerchantFeeService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a merchant with no fee, no quota and an empty balance.
    pub fn add_merchant(&self, merchant_id: &str, payment_status: PaymentStatus) {
        self.state.write().unwrap().merchants.insert(
            merchant_id.to_string(),
            MerchantAccount {
                fee: Money::zero(),
                quota: None,
                balance: MerchantBalance::default(),
                payment_status,
            },
        );
    }

    pub fn set_balance(&self, merchant_id: &str, balance: MerchantBalance) {
        if let Some(m) = self.state.write().unwrap().merchants.get_mut(merchant_id) {
            m.balance = balance;
        }
    }

    pub fn set_fee(&self, merchant_id: &str, fee: Money) {
        if let Some(m) = self.state.write().unwrap().merchants.get_mut(merchant_id) {
            m.fee = fee;
        }
    }

    /// Largest amount a single transaction may have.
    pub fn set_quota(&self, merchant_id: &str, quota: Money) {
        if let Some(m) = self.state.write().unwrap().merchants.get_mut(merchant_id) {
            m.quota = Some(quota);
        }
    }

    fn account(&self, merchant_id: &str) -> Result<MerchantAccount, ServiceError> {
        self.state
            .read()
            .unwrap()
            .merchants
            .get(merchant_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(SERVICE, format!("merchant {merchant_id}")))
    }
}

#[async_trait]
impl MerchantFeeService for InMemoryMerchantFeeService {
    async fn check_merchant_quota_and_fee(
        &self,
        merchant_id: &str,
        amount: Money,
    ) -> Result<Money, ServiceError> {
        let account = self.account(merchant_id)?;
        if account.quota.is_some_and(|quota| amount > quota) {
            return Err(ServiceError::rejected(
                SERVICE,
                "QUOTA",
                "Merchant quota exceeded",
            ));
        }
        Ok(account.fee)
    }

    async fn get_merchant_balance(
        &self,
        merchant_id: &str,
    ) -> Result<MerchantBalance, ServiceError> {
        Ok(self.account(merchant_id)?.balance)
    }

    async fn get_payment_status(&self, merchant_id: &str) -> Result<PaymentStatus, ServiceError> {
        Ok(self.account(merchant_id)?.payment_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_quota_and_fee() {
        let service = InMemoryMerchantFeeService::new();
        service.add_merchant("m1", PaymentStatus::Unpaid);
        service.set_fee("m1", Money::new(300));
        service.set_quota("m1", Money::new(1_000_000));

        let fee = service
            .check_merchant_quota_and_fee("m1", Money::new(10_000))
            .await
            .unwrap();
        assert_eq!(fee, Money::new(300));

        let over = service
            .check_merchant_quota_and_fee("m1", Money::new(2_000_000))
            .await;
        assert!(matches!(over, Err(ServiceError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_balance_and_status() {
        let service = InMemoryMerchantFeeService::new();
        service.add_merchant("m1", PaymentStatus::Paid);
        service.set_balance(
            "m1",
            MerchantBalance {
                settlement: Money::new(70),
                cash: Money::new(30),
            },
        );

        let balance = service.get_merchant_balance("m1").await.unwrap();
        assert_eq!(balance.available(), Money::new(100));
        assert_eq!(
            service.get_payment_status("m1").await.unwrap(),
            PaymentStatus::Paid
        );
        assert!(service.get_payment_status("m2").await.is_err());
    }
}
