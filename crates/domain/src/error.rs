//! Domain error types.

use common::OrderId;
use thiserror::Error;

use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The order does not exist in the repository.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An order with the same ID is already stored.
    #[error("Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The order repository failed.
    #[error("Repository error: {0}")]
    Repository(String),

    /// The order data is invalid.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error returned by an [`crate::EventPublisher`].
#[derive(Debug, Clone, Error)]
#[error("Publish to {topic} failed: {reason}")]
pub struct PublishError {
    pub topic: String,
    pub reason: String,
}
