//! Orchestrator error types.

use common::OrderId;
use domain::{DomainError, OrderType};
use thiserror::Error;

/// Error returned by a remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service answered and refused the request.
    #[error("{service} rejected the request ({code}): {message}")]
    Rejected {
        service: &'static str,
        code: String,
        message: String,
    },

    /// The service could not be reached or did not answer in time.
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    /// The requested entity does not exist on the service.
    #[error("{service}: {entity} not found")]
    NotFound {
        service: &'static str,
        entity: String,
    },
}

impl ServiceError {
    pub fn rejected(
        service: &'static str,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ServiceError::Rejected {
            service,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        ServiceError::Unavailable {
            service,
            reason: reason.into(),
        }
    }

    pub fn not_found(service: &'static str, entity: impl Into<String>) -> Self {
        ServiceError::NotFound {
            service,
            entity: entity.into(),
        }
    }

    /// Returns true for timeouts and unreachable services.
    pub fn is_transport(&self) -> bool {
        matches!(self, ServiceError::Unavailable { .. })
    }

    /// The message to record on an order failed by this error.
    pub fn reason(&self) -> String {
        match self {
            ServiceError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors that can occur while orchestrating an order.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The order store or order data failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A collaborator failed where the order cannot absorb the failure.
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The request cannot be applied to the order in its current state.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A callback payload could not be decoded.
    #[error("Invalid callback payload: {0}")]
    InvalidPayload(String),

    #[error("No flow handles {0} orders")]
    UnsupportedOrderType(OrderType),
}

/// Convenience type alias for orchestrator results.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors() {
        assert!(ServiceError::unavailable("bank", "timeout").is_transport());
        assert!(!ServiceError::rejected("bank", "51", "declined").is_transport());
    }

    #[test]
    fn test_reason_prefers_service_message() {
        let err = ServiceError::rejected("ledger", "E01", "Not enough money");
        assert_eq!(err.reason(), "Not enough money");

        let err = ServiceError::not_found("identity", "user u1");
        assert_eq!(err.reason(), "identity: user u1 not found");
    }
}
