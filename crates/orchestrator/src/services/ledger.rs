//! Ledger (transaction) service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{OrderId, TransactionId};
use domain::{Money, OrderType, RefundType, SourceOfFund};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

const SERVICE: &str = "ledger";

/// OTP accepted.
pub const OTP_OK: &str = "00";
/// OTP did not match.
pub const OTP_WRONG: &str = "460";
/// Too many wrong OTP attempts.
pub const OTP_MAX_ATTEMPTS: &str = "461";

/// Ledger-side status of a reservation. Authoritative over the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerStatus {
    Pending,
    Finished,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub transaction_id: TransactionId,
    pub order_id: OrderId,
    pub user_id: String,
    pub amount: Money,
    pub status: LedgerStatus,
}

/// Quota and fee lookup for a prospective transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaRequest {
    pub user_id: String,
    pub order_type: OrderType,
    pub source_of_fund: SourceOfFund,
    pub amount: Money,
}

/// Reservation of funds for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitTransactionRequest {
    pub order_id: OrderId,
    pub user_id: String,
    pub to_user_id: Option<String>,
    pub order_type: OrderType,
    pub source_of_fund: SourceOfFund,
    pub amount: Money,
    pub fee: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundTransactionRequest {
    pub refund_order_id: OrderId,
    /// Ledger transaction of the order being refunded.
    pub original_transaction_id: Option<TransactionId>,
    pub user_id: String,
    pub merchant_id: Option<String>,
    pub amount: Money,
    pub refund_type: RefundType,
}

/// Trait for the ledger's reservation protocol.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Checks the user's quota and returns the fee for the transaction.
    async fn check_transaction_quota_and_fee(
        &self,
        request: &QuotaRequest,
    ) -> Result<Money, ServiceError>;

    /// Reserves funds and returns the reservation reference.
    async fn init_transaction(
        &self,
        request: &InitTransactionRequest,
    ) -> Result<TransactionId, ServiceError>;

    async fn confirm_transaction(&self, transaction_id: &TransactionId)
    -> Result<(), ServiceError>;

    async fn cancel_transaction(&self, transaction_id: &TransactionId) -> Result<(), ServiceError>;

    async fn refund_transaction(
        &self,
        request: &RefundTransactionRequest,
    ) -> Result<TransactionId, ServiceError>;

    async fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<LedgerTransaction, ServiceError>;

    /// Checks an OTP for a reserved transaction and returns the result code.
    async fn verify_otp(
        &self,
        transaction_id: &TransactionId,
        otp: &str,
    ) -> Result<String, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryLedgerState {
    transactions: HashMap<TransactionId, LedgerTransaction>,
    next_id: u32,
    fee: Money,
    quota_error: Option<String>,
    init_error: Option<String>,
    unavailable: bool,
    expected_otp: Option<String>,
    otp_code: Option<String>,
    init_calls: usize,
    confirm_calls: usize,
    cancel_calls: usize,
    refund_calls: usize,
}

/// In-memory ledger for testing.
///
/// Reservations are kept in a map; return codes and failures are scripted
/// through the setters.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerService {
    state: Arc<RwLock<InMemoryLedgerState>>,
}

impl InMemoryLedgerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fee returned by the quota check.
    pub fn set_fee(&self, fee: Money) {
        self.state.write().unwrap().fee = fee;
    }

    /// Makes the quota check reject with `message`.
    pub fn set_quota_error(&self, message: Option<&str>) {
        self.state.write().unwrap().quota_error = message.map(str::to_string);
    }

    /// Makes `init_transaction` reject with `message`.
    pub fn set_init_error(&self, message: Option<&str>) {
        self.state.write().unwrap().init_error = message.map(str::to_string);
    }

    /// Simulates the ledger being unreachable for every call.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// OTP the ledger accepts; any other OTP yields `460`.
    pub fn set_expected_otp(&self, otp: &str) {
        self.state.write().unwrap().expected_otp = Some(otp.to_string());
    }

    /// Forces the result code of every OTP check.
    pub fn set_otp_code(&self, code: Option<&str>) {
        self.state.write().unwrap().otp_code = code.map(str::to_string);
    }

    /// Moves a reservation to `status` as if another actor had finalized it.
    pub fn set_transaction_status(&self, transaction_id: &TransactionId, status: LedgerStatus) {
        if let Some(tx) = self
            .state
            .write()
            .unwrap()
            .transactions
            .get_mut(transaction_id)
        {
            tx.status = status;
        }
    }

    pub fn transaction(&self, transaction_id: &TransactionId) -> Option<LedgerTransaction> {
        self.state
            .read()
            .unwrap()
            .transactions
            .get(transaction_id)
            .cloned()
    }

    pub fn init_count(&self) -> usize {
        self.state.read().unwrap().init_calls
    }

    pub fn confirm_count(&self) -> usize {
        self.state.read().unwrap().confirm_calls
    }

    pub fn cancel_count(&self) -> usize {
        self.state.read().unwrap().cancel_calls
    }

    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refund_calls
    }

    fn check_available(state: &InMemoryLedgerState) -> Result<(), ServiceError> {
        if state.unavailable {
            return Err(ServiceError::unavailable(SERVICE, "deadline exceeded"));
        }
        Ok(())
    }

    fn allocate(state: &mut InMemoryLedgerState) -> TransactionId {
        state.next_id += 1;
        TransactionId::new(format!("TX-{:06}", state.next_id))
    }
}

#[async_trait]
impl LedgerService for InMemoryLedgerService {
    async fn check_transaction_quota_and_fee(
        &self,
        _request: &QuotaRequest,
    ) -> Result<Money, ServiceError> {
        let state = self.state.read().unwrap();
        Self::check_available(&state)?;
        match &state.quota_error {
            Some(message) => Err(ServiceError::rejected(SERVICE, "QUOTA", message.clone())),
            None => Ok(state.fee),
        }
    }

    async fn init_transaction(
        &self,
        request: &InitTransactionRequest,
    ) -> Result<TransactionId, ServiceError> {
        let mut state = self.state.write().unwrap();
        Self::check_available(&state)?;
        state.init_calls += 1;

        if let Some(message) = &state.init_error {
            return Err(ServiceError::rejected(SERVICE, "INIT", message.clone()));
        }

        let transaction_id = Self::allocate(&mut state);
        state.transactions.insert(
            transaction_id.clone(),
            LedgerTransaction {
                transaction_id: transaction_id.clone(),
                order_id: request.order_id.clone(),
                user_id: request.user_id.clone(),
                amount: request.amount + request.fee,
                status: LedgerStatus::Pending,
            },
        );
        Ok(transaction_id)
    }

    async fn confirm_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        Self::check_available(&state)?;
        state.confirm_calls += 1;

        let tx = state
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| ServiceError::not_found(SERVICE, transaction_id.to_string()))?;
        match tx.status {
            LedgerStatus::Cancelled => Err(ServiceError::rejected(
                SERVICE,
                "STATE",
                "transaction already cancelled",
            )),
            _ => {
                tx.status = LedgerStatus::Finished;
                Ok(())
            }
        }
    }

    async fn cancel_transaction(&self, transaction_id: &TransactionId) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        Self::check_available(&state)?;
        state.cancel_calls += 1;

        let tx = state
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| ServiceError::not_found(SERVICE, transaction_id.to_string()))?;
        match tx.status {
            LedgerStatus::Finished => Err(ServiceError::rejected(
                SERVICE,
                "STATE",
                "transaction already finished",
            )),
            _ => {
                tx.status = LedgerStatus::Cancelled;
                Ok(())
            }
        }
    }

    async fn refund_transaction(
        &self,
        request: &RefundTransactionRequest,
    ) -> Result<TransactionId, ServiceError> {
        let mut state = self.state.write().unwrap();
        Self::check_available(&state)?;
        state.refund_calls += 1;

        let transaction_id = Self::allocate(&mut state);
        state.transactions.insert(
            transaction_id.clone(),
            LedgerTransaction {
                transaction_id: transaction_id.clone(),
                order_id: request.refund_order_id.clone(),
                user_id: request.user_id.clone(),
                amount: request.amount,
                status: LedgerStatus::Finished,
            },
        );
        Ok(transaction_id)
    }

    async fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<LedgerTransaction, ServiceError> {
        let state = self.state.read().unwrap();
        Self::check_available(&state)?;
        state
            .transactions
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(SERVICE, transaction_id.to_string()))
    }

    async fn verify_otp(
        &self,
        transaction_id: &TransactionId,
        otp: &str,
    ) -> Result<String, ServiceError> {
        let state = self.state.read().unwrap();
        Self::check_available(&state)?;
        if !state.transactions.contains_key(transaction_id) {
            return Err(ServiceError::not_found(SERVICE, transaction_id.to_string()));
        }
        if let Some(code) = &state.otp_code {
            return Ok(code.clone());
        }
        let accepted = state.expected_otp.as_deref().is_none_or(|expected| expected == otp);
        Ok(if accepted { OTP_OK } else { OTP_WRONG }.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_request(amount: i64) -> InitTransactionRequest {
        InitTransactionRequest {
            order_id: OrderId::new("BC1"),
            user_id: "u1".into(),
            to_user_id: None,
            order_type: OrderType::BuyCard,
            source_of_fund: SourceOfFund::Wallet,
            amount: Money::new(amount),
            fee: Money::new(100),
        }
    }

    #[tokio::test]
    async fn test_init_and_confirm() {
        let ledger = InMemoryLedgerService::new();
        let tx = ledger.init_transaction(&init_request(10_000)).await.unwrap();
        assert_eq!(tx.as_str(), "TX-000001");

        let stored = ledger.get_transaction(&tx).await.unwrap();
        assert_eq!(stored.status, LedgerStatus::Pending);
        assert_eq!(stored.amount, Money::new(10_100));

        ledger.confirm_transaction(&tx).await.unwrap();
        assert_eq!(ledger.transaction(&tx).unwrap().status, LedgerStatus::Finished);
        assert!(ledger.cancel_transaction(&tx).await.is_err());
    }

    #[tokio::test]
    async fn test_init_error() {
        let ledger = InMemoryLedgerService::new();
        ledger.set_init_error(Some("Not enough money"));

        let err = ledger.init_transaction(&init_request(1)).await.unwrap_err();
        assert_eq!(err.reason(), "Not enough money");
        assert_eq!(ledger.init_count(), 1);
    }

    #[tokio::test]
    async fn test_otp_codes() {
        let ledger = InMemoryLedgerService::new();
        let tx = ledger.init_transaction(&init_request(1)).await.unwrap();
        ledger.set_expected_otp("123456");

        assert_eq!(ledger.verify_otp(&tx, "123456").await.unwrap(), OTP_OK);
        assert_eq!(ledger.verify_otp(&tx, "000000").await.unwrap(), OTP_WRONG);

        ledger.set_otp_code(Some(OTP_MAX_ATTEMPTS));
        assert_eq!(ledger.verify_otp(&tx, "123456").await.unwrap(), OTP_MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_unavailable_is_transport_error() {
        let ledger = InMemoryLedgerService::new();
        ledger.set_unavailable(true);
        let err = ledger.init_transaction(&init_request(1)).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(ledger.init_count(), 0);
    }
}
