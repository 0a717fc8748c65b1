//! Provider callback endpoints.
//!
//! Providers post `{"data": "<base64 JSON>"}`; decoding happens in the
//! reconciler so malformed payloads surface as 400.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderId;
use domain::{EventPublisher, Order, OrderRepository};
use serde::Deserialize;

use super::orders::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub data: String,
}

/// POST /callbacks/bank-status
pub async fn bank_status<R: OrderRepository, P: EventPublisher>(
    State(state): State<Arc<AppState<R, P>>>,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.reconciler.update_bank_status(&req.data).await?))
}

/// POST /callbacks/credit/{id}
pub async fn credit<R: OrderRepository, P: EventPublisher>(
    State(state): State<Arc<AppState<R, P>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .reconciler
        .update_credit_payment_order(&OrderId::new(id))
        .await?;
    Ok(Json(order))
}

/// POST /callbacks/va-balance
pub async fn va_balance<R: OrderRepository, P: EventPublisher>(
    State(state): State<Arc<AppState<R, P>>>,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.reconciler.update_balance_va(&req.data).await?))
}

/// POST /callbacks/napas-cash-in
pub async fn napas_cash_in<R: OrderRepository, P: EventPublisher>(
    State(state): State<Arc<AppState<R, P>>>,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.reconciler.cash_in_napas(&req.data).await?))
}
