use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Serialize;

use crate::domain::OrderStatus;
use crate::error::AppError;
use crate::payment::SIGNATURE_HEADER;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

/// `POST /orders/webhook`
///
/// The raw body is taken as bytes so the signature is checked against exactly
/// what the provider sent. Any 2xx tells the provider to stop retrying.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    let handled = state.orchestrator.handle_webhook(signature, &body).await?;

    tracing::debug!(
        order_id = %handled.order_id,
        reference = %handled.reference,
        resolution = ?handled.resolution,
        "Payment webhook handled"
    );

    Ok(Json(WebhookAck {
        success: true,
        status: handled.resolution.status(),
    }))
}
