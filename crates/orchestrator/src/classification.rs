//! Three-way classification of provider results.

use crate::error::ServiceError;
use crate::services::{ProviderCodeTable, ProviderResponse};

/// What a provider result means for the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Confirm the reservation.
    Success,
    /// Release the reservation and fail the order.
    HardFailure(String),
    /// Keep the reservation and wait for reconciliation.
    Indeterminate(String),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::HardFailure(_) => "hard_failure",
            Outcome::Indeterminate(_) => "indeterminate",
        }
    }
}

/// Classifies a result code against a provider's code table.
pub fn classify_code(table: &ProviderCodeTable, code: &str, message: &str) -> Outcome {
    if table.is_success(code) {
        Outcome::Success
    } else if table.is_pending(code) {
        Outcome::Indeterminate(describe(code, message))
    } else {
        Outcome::HardFailure(describe(code, message))
    }
}

/// Classifies the result of a provider call.
///
/// Transport errors are indeterminate: the provider may have acted.
pub fn classify(
    table: &ProviderCodeTable,
    result: &Result<ProviderResponse, ServiceError>,
) -> Outcome {
    match result {
        Ok(response) => classify_code(table, &response.code, &response.message),
        Err(ServiceError::Rejected { code, message, .. }) => classify_code(table, code, message),
        Err(e @ ServiceError::Unavailable { .. }) => Outcome::Indeterminate(e.to_string()),
        Err(e @ ServiceError::NotFound { .. }) => Outcome::HardFailure(e.to_string()),
    }
}

fn describe(code: &str, message: &str) -> String {
    if message.is_empty() {
        format!("provider returned {code}")
    } else {
        format!("{message} ({code})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ProviderCodeTable {
        ProviderCodeTable::new(&["00"], &["PENDING", "99"])
    }

    #[test]
    fn test_classify_codes() {
        assert_eq!(classify_code(&table(), "00", ""), Outcome::Success);
        assert!(matches!(
            classify_code(&table(), "PENDING", ""),
            Outcome::Indeterminate(_)
        ));
        assert_eq!(
            classify_code(&table(), "51", "Card declined"),
            Outcome::HardFailure("Card declined (51)".into())
        );
    }

    #[test]
    fn test_transport_error_is_indeterminate() {
        let result = Err(ServiceError::unavailable("bill", "timeout"));
        assert!(matches!(
            classify(&table(), &result),
            Outcome::Indeterminate(_)
        ));
    }

    #[test]
    fn test_rejection_uses_its_code() {
        let pending = Err(ServiceError::rejected("card", "99", "system busy"));
        assert!(matches!(
            classify(&table(), &pending),
            Outcome::Indeterminate(_)
        ));

        let declined = Err(ServiceError::rejected("card", "05", "do not honor"));
        assert_eq!(
            classify(&table(), &declined),
            Outcome::HardFailure("do not honor (05)".into())
        );
    }

    #[test]
    fn test_response_code() {
        let ok = Ok(ProviderResponse::success());
        assert_eq!(classify(&table(), &ok), Outcome::Success);
        assert_eq!(
            classify(&table(), &Ok(ProviderResponse::with_code("12"))),
            Outcome::HardFailure("provider returned 12".into())
        );
    }
}
