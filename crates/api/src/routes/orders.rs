//! Order flow endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{MethodRouter, post};
use common::OrderId;
use domain::{EventPublisher, Money, Order, OrderRepository};
use orchestrator::{FlowEngine, FlowKind, FlowResponse, OrderRequest, Reconciler, RefundService};
use serde::Deserialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<R: OrderRepository, P: EventPublisher> {
    pub engine: FlowEngine<R, P>,
    pub refunds: RefundService<R, P>,
    pub reconciler: Reconciler<R, P>,
}

// -- Request types --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfirmRequest {
    pub amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub otp: String,
}

// -- Handlers --

/// `POST /orders/<flow>` for `kind`.
pub fn flow_route<R: OrderRepository, P: EventPublisher>(
    kind: FlowKind,
) -> MethodRouter<Arc<AppState<R, P>>> {
    post(
        move |State(state): State<Arc<AppState<R, P>>>, Json(req): Json<OrderRequest>| async move {
            execute(&state, kind, req).await
        },
    )
}

#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id))]
async fn execute<R: OrderRepository, P: EventPublisher>(
    state: &AppState<R, P>,
    kind: FlowKind,
    req: OrderRequest,
) -> Result<Json<FlowResponse>, ApiError> {
    let response = state.engine.execute(kind, &req).await?;
    Ok(Json(response))
}

/// POST /orders: creates a pending order to be confirmed later.
#[tracing::instrument(skip(state, req))]
pub async fn init<R: OrderRepository, P: EventPublisher>(
    State(state): State<Arc<AppState<R, P>>>,
    Json(req): Json<OrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.engine.init_order(&req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<R: OrderRepository, P: EventPublisher>(
    State(state): State<Arc<AppState<R, P>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.engine.get_order(&OrderId::new(id)).await?;
    Ok(Json(order))
}

/// POST /orders/{id}/confirm
#[tracing::instrument(skip(state, body))]
pub async fn confirm<R: OrderRepository, P: EventPublisher>(
    State(state): State<Arc<AppState<R, P>>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<FlowResponse>, ApiError> {
    let req: ConfirmRequest = if body.is_empty() {
        ConfirmRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let response = state
        .engine
        .confirm_order(&OrderId::new(id), req.amount)
        .await?;
    Ok(Json(response))
}

/// POST /orders/{id}/verify-otp
#[tracing::instrument(skip(state, req))]
pub async fn verify_otp<R: OrderRepository, P: EventPublisher>(
    State(state): State<Arc<AppState<R, P>>>,
    Path(id): Path<String>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<FlowResponse>, ApiError> {
    if req.otp.trim().is_empty() {
        return Err(ApiError::BadRequest("otp is required".into()));
    }
    let response = state
        .engine
        .verify_otp(&OrderId::new(id), req.otp.trim())
        .await?;
    Ok(Json(response))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<R: OrderRepository, P: EventPublisher>(
    State(state): State<Arc<AppState<R, P>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.engine.cancel_order(&OrderId::new(id)).await?;
    Ok(Json(order))
}
