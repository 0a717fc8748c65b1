//! Order entity and related types.

mod entity;
mod events;
mod service;
mod status;
mod value_objects;

pub use entity::{NewOrder, Order};
pub use events::OrderStatusChanged;
pub use service::OrderService;
pub use status::OrderStatus;
pub use value_objects::{
    BankInfo, BillInfo, CardInfo, Money, OrderType, PurchasedCard, RefundInfo, RefundMode,
    RefundType, SourceOfFund,
};

use thiserror::Error;

/// Validation errors for order data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// User ID is required.
    #[error("User ID is required")]
    UserIdRequired,

    /// Invalid amount.
    #[error("Invalid amount: {amount} (must be greater than 0)")]
    InvalidAmount { amount: i64 },

    /// A flow-specific payload is missing.
    #[error("Missing {0} information")]
    MissingPayload(&'static str),
}

impl NewOrder {
    /// Checks the fields every order needs.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.user_id.trim().is_empty() {
            return Err(OrderError::UserIdRequired);
        }
        if self.amount.amount() < 0 {
            return Err(OrderError::InvalidAmount {
                amount: self.amount.amount(),
            });
        }
        Ok(())
    }
}
