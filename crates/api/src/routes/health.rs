//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::{EventPublisher, OrderRepository};
use serde::Serialize;

use super::orders::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Background tasks (event publication, reaper ticks) still running.
    pub tasks_in_flight: usize,
}

/// GET /health
pub async fn check<R: OrderRepository, P: EventPublisher>(
    State(state): State<Arc<AppState<R, P>>>,
) -> Json<HealthResponse> {
    let pool = state.engine.reservation().orders().pool();
    Json(HealthResponse {
        status: "ok",
        tasks_in_flight: pool.in_flight(),
    })
}
