pub mod adapters;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod payment;
pub mod ports;
pub mod services;
pub mod startup;
pub mod validation;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::services::OrderOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<OrderOrchestrator>,
}

pub fn create_app(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/orders/cancel", post(handlers::orders::cancel_order))
        .route("/orders/webhook", post(handlers::webhook::payment_webhook))
        .route("/orders/code/:code", get(handlers::orders::get_order_by_code))
        .route(
            "/orders/:id",
            post(handlers::orders::create_order).get(handlers::orders::get_order),
        )
        .route(
            "/orders/:id/select-payment",
            get(handlers::orders::select_payment),
        )
        .route("/orders/:id/check-status", get(handlers::orders::check_status))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
