//! HTTP API server for wallet order orchestration.
//!
//! Exposes the product flows, refunds and provider callbacks over REST,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::{PrefixCounter, TaskPool};
use domain::{EventPublisher, OrderRepository, OrderService};
use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator::{
    ExpiryReaper, FlowEngine, FlowKind, Reconciler, RefundService, Reservation, Services,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R: OrderRepository, P: EventPublisher>(
    state: Arc<AppState<R, P>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let mut router = Router::new()
        .route("/health", get(routes::health::check::<R, P>))
        .route("/orders", post(routes::orders::init::<R, P>))
        .route("/orders/{id}", get(routes::orders::get::<R, P>))
        .route("/orders/{id}/confirm", post(routes::orders::confirm::<R, P>))
        .route(
            "/orders/{id}/verify-otp",
            post(routes::orders::verify_otp::<R, P>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<R, P>))
        .route("/refunds", post(routes::refunds::create::<R, P>))
        .route(
            "/callbacks/bank-status",
            post(routes::callbacks::bank_status::<R, P>),
        )
        .route(
            "/callbacks/credit/{id}",
            post(routes::callbacks::credit::<R, P>),
        )
        .route(
            "/callbacks/va-balance",
            post(routes::callbacks::va_balance::<R, P>),
        )
        .route(
            "/callbacks/napas-cash-in",
            post(routes::callbacks::napas_cash_in::<R, P>),
        );

    for kind in FlowKind::ALL {
        let path = format!("/orders/{}", kind.as_str().replace('_', "-"));
        router = router.route(&path, routes::orders::flow_route::<R, P>(kind));
    }

    router
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the order service, flows, refunds, reconciler and reaper.
///
/// The reaper is returned unstarted; the caller owns its shutdown channel.
pub fn build_state<R: OrderRepository, P: EventPublisher>(
    config: &Config,
    repository: R,
    publisher: P,
    services: Services,
) -> (Arc<AppState<R, P>>, ExpiryReaper<R, P>) {
    let ttl = chrono::Duration::seconds(config.order_ttl_secs);
    let orders = OrderService::new(
        repository,
        publisher,
        PrefixCounter::new(),
        TaskPool::new("orders", config.task_pool_size),
    );
    let reservation = Reservation::new(orders.clone(), services.clone());

    let state = Arc::new(AppState {
        engine: FlowEngine::new(reservation.clone()).with_order_ttl(ttl),
        refunds: RefundService::new(orders, services).with_order_ttl(ttl),
        reconciler: Reconciler::new(reservation.clone()),
    });
    let reaper = ExpiryReaper::new(reservation)
        .with_interval(config.reaper_interval)
        .with_concurrency(config.reaper_concurrency);

    (state, reaper)
}
