//! Refund endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::{EventPublisher, Order, OrderRepository};
use orchestrator::RefundRequest;

use super::orders::AppState;
use crate::error::ApiError;

/// POST /refunds
///
/// Refunds part or all of a successful order.
#[tracing::instrument(skip(state, req), fields(original_order_id = %req.original_order_id))]
pub async fn create<R: OrderRepository, P: EventPublisher>(
    State(state): State<Arc<AppState<R, P>>>,
    Json(req): Json<RefundRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.refunds.init_refund(&req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}
