//! Promotion (voucher) service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::Money;

use crate::error::ServiceError;

const SERVICE: &str = "promotion";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherRequest {
    pub order_id: OrderId,
    pub user_id: String,
    pub voucher_code: String,
    pub amount: Money,
}

/// A voucher applied to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedVoucher {
    pub voucher_id: String,
    pub discount: Money,
}

/// Trait for voucher usage and reversal.
#[async_trait]
pub trait PromotionService: Send + Sync {
    /// Marks a voucher as used for an order and returns the discount.
    async fn use_voucher(&self, request: &VoucherRequest) -> Result<AppliedVoucher, ServiceError>;

    /// Gives a used voucher back to the user.
    async fn reverse_wallet(
        &self,
        order_id: &OrderId,
        user_id: &str,
        voucher_id: &str,
    ) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryPromotionState {
    /// Voucher code to discount.
    vouchers: HashMap<String, Money>,
    /// Voucher ID to the order that used it.
    used: HashMap<String, OrderId>,
    next_id: u32,
    fail_on_reverse: bool,
    reverse_calls: usize,
}

/// In-memory promotion service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPromotionService {
    state: Arc<RwLock<InMemoryPromotionState>>,
}

impl InMemoryPromotionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a voucher code worth `discount`.
    pub fn add_voucher(&self, code: &str, discount: Money) {
        self.state
            .write()
            .unwrap()
            .vouchers
            .insert(code.to_string(), discount);
    }

    /// Configures `reverse_wallet` to fail.
    pub fn set_fail_on_reverse(&self, fail: bool) {
        self.state.write().unwrap().fail_on_reverse = fail;
    }

    /// Returns the number of vouchers currently marked as used.
    pub fn used_count(&self) -> usize {
        self.state.read().unwrap().used.len()
    }

    /// Returns how often `reverse_wallet` was called.
    pub fn reverse_count(&self) -> usize {
        self.state.read().unwrap().reverse_calls
    }
}

#[async_trait]
impl PromotionService for InMemoryPromotionService {
    async fn use_voucher(&self, request: &VoucherRequest) -> Result<AppliedVoucher, ServiceError> {
        let mut state = self.state.write().unwrap();

        let discount = *state.vouchers.get(&request.voucher_code).ok_or_else(|| {
            ServiceError::rejected(SERVICE, "VOUCHER_INVALID", "Voucher is invalid or expired")
        })?;

        state.next_id += 1;
        let voucher_id = format!("VC-{:04}", state.next_id);
        state
            .used
            .insert(voucher_id.clone(), request.order_id.clone());

        Ok(AppliedVoucher {
            voucher_id,
            discount: discount.min(request.amount),
        })
    }

    async fn reverse_wallet(
        &self,
        _order_id: &OrderId,
        _user_id: &str,
        voucher_id: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        state.reverse_calls += 1;

        if state.fail_on_reverse {
            return Err(ServiceError::unavailable(SERVICE, "connection reset"));
        }
        state.used.remove(voucher_id);
        Ok(())
    }
}
