//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──┬──► Success
///    │            │        ├──► Failed
///    │            │        └──► Verifying ──► Success | Failed
///    ├──► Failed  │
///    └────────────┴──► Cancel
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order was created, funds are not reserved yet.
    #[default]
    #[serde(rename = "ORDER_PENDING")]
    Pending,

    /// A reservation exists or a manual workflow owns the order.
    #[serde(rename = "ORDER_PROCESSING")]
    Processing,

    /// Funds moved (terminal state).
    #[serde(rename = "ORDER_SUCCESS")]
    Success,

    /// The order failed and any reservation was released (terminal state).
    #[serde(rename = "ORDER_FAILED")]
    Failed,

    /// The provider result is unknown; awaiting reconciliation.
    #[serde(rename = "ORDER_VERIFYING")]
    Verifying,

    /// The order was cancelled or expired (terminal state).
    #[serde(rename = "ORDER_CANCEL")]
    Cancel,
}

impl OrderStatus {
    /// Returns true if the order can move to `Processing`.
    pub fn can_process(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can succeed from this status.
    pub fn can_succeed(&self) -> bool {
        matches!(self, OrderStatus::Processing | OrderStatus::Verifying)
    }

    /// Returns true if the order can fail from this status.
    pub fn can_fail(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Verifying
        )
    }

    /// Returns true if the order can be parked for reconciliation.
    pub fn can_verify(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns true if moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match next {
            OrderStatus::Pending => false,
            OrderStatus::Processing => self.can_process(),
            OrderStatus::Success => self.can_succeed(),
            OrderStatus::Failed => self.can_fail(),
            OrderStatus::Verifying => self.can_verify(),
            OrderStatus::Cancel => self.can_cancel(),
        }
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Success | OrderStatus::Failed | OrderStatus::Cancel
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "ORDER_PENDING",
            OrderStatus::Processing => "ORDER_PROCESSING",
            OrderStatus::Success => "ORDER_SUCCESS",
            OrderStatus::Failed => "ORDER_FAILED",
            OrderStatus::Verifying => "ORDER_VERIFYING",
            OrderStatus::Cancel => "ORDER_CANCEL",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
