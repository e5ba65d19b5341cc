use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::ports::RepositoryError;
use crate::services::OrderError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Order(e) => order_status_code(e),
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn order_status_code(error: &OrderError) -> StatusCode {
    match error {
        OrderError::InvalidQuantity(_)
        | OrderError::ExceedsMaxPerOrder { .. }
        | OrderError::UnknownTicketType(_)
        | OrderError::InvalidBuyer(_)
        | OrderError::InvalidWebhook(_) => StatusCode::BAD_REQUEST,
        OrderError::NotOwner => StatusCode::FORBIDDEN,
        OrderError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        OrderError::InsufficientInventory { .. }
        | OrderError::NotPending { .. }
        | OrderError::Expired => StatusCode::CONFLICT,
        OrderError::PaymentSession(_) => StatusCode::BAD_GATEWAY,
        OrderError::WebhookVerification(_) => StatusCode::UNAUTHORIZED,
        OrderError::Store(RepositoryError::Inconsistent(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        OrderError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        // Store details stay in the log.
        let message = match &self {
            AppError::Order(OrderError::Store(_)) => "service temporarily unavailable".to_string(),
            other => other.to_string(),
        };
        let body = Json(json!({
            "success": false,
            "message": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
