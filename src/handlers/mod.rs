pub mod orders;
pub mod webhook;

use crate::ports::ReservationStore;
use crate::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: String,
}

/// `GET /health`: 503 when the store cannot be reached.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_status = match state.orchestrator.store().health_check().await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            "disconnected"
        }
    };

    let healthy = store_status == "connected";
    let health_response = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_status.to_string(),
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}
