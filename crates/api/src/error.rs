//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use orchestrator::{OrchestratorError, ServiceError};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
///
/// Business outcomes (a failed or verifying order) are normal responses;
/// only errors the order could not absorb end up here.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Orchestrator(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Orchestrator(err) => match err {
                OrchestratorError::OrderNotFound(_)
                | OrchestratorError::Domain(DomainError::OrderNotFound(_)) => StatusCode::NOT_FOUND,
                OrchestratorError::Domain(DomainError::Order(_))
                | OrchestratorError::InvalidRequest(_)
                | OrchestratorError::InvalidPayload(_)
                | OrchestratorError::UnsupportedOrderType(_) => StatusCode::BAD_REQUEST,
                OrchestratorError::Domain(DomainError::DuplicateOrder(_)) => StatusCode::CONFLICT,
                OrchestratorError::Service(ServiceError::Unavailable { .. }) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        metrics::counter!("api_errors_total", "status" => status.as_u16().to_string())
            .increment(1);
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        } else {
            tracing::warn!(error = %message, status = status.as_u16(), "request rejected");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
