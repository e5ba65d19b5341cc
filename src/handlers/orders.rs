use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{BuyerInfo, Order, OrderStatus, PaymentMethod, UnknownVariant};
use crate::error::AppError;
use crate::middleware::auth::RequesterId;
use crate::services::{OrderItemRequest, Resolution};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub buyer: BuyerInfo,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order_id: Uuid,
    pub code: String,
    pub total_price: i64,
    pub expired_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub success: bool,
    pub order: Order,
}

#[derive(Debug, Deserialize)]
pub struct SelectPaymentQuery {
    pub method: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectPaymentResponse {
    pub success: bool,
    pub pay_url: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CancelOrderResponse {
    pub success: bool,
    pub status: OrderStatus,
}

/// `POST /orders/:event_id`
pub async fn create_order(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    RequesterId(user_id): RequesterId,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .orchestrator
        .create_order(&user_id, event_id, payload.buyer, payload.items)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            success: true,
            order_id: order.id,
            code: order.code,
            total_price: order.total_price,
            expired_at: order.expired_at,
        }),
    ))
}

/// `GET /orders/:id`
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orchestrator.get_order(id).await?;
    Ok(Json(OrderResponse {
        success: true,
        order,
    }))
}

/// `GET /orders/code/:code`
pub async fn get_order_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .orchestrator
        .get_order_by_code(code.trim())
        .await?;
    Ok(Json(OrderResponse {
        success: true,
        order,
    }))
}

/// `GET /orders/:id/select-payment?method=`
pub async fn select_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<SelectPaymentQuery>,
) -> Result<Json<SelectPaymentResponse>, AppError> {
    let method: PaymentMethod = query
        .method
        .parse()
        .map_err(|e: UnknownVariant| AppError::BadRequest(e.to_string()))?;

    let redirect = state.orchestrator.select_payment(id, method).await?;
    Ok(Json(SelectPaymentResponse {
        success: true,
        pay_url: redirect.pay_url,
    }))
}

/// `GET /orders/:id/check-status`
pub async fn check_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    let status = state.orchestrator.check_status(id).await?;
    Ok(Json(StatusResponse {
        success: true,
        status,
    }))
}

/// `POST /orders/cancel`. Cancelling an order that is already resolved
/// reports its current status.
pub async fn cancel_order(
    State(state): State<AppState>,
    RequesterId(user_id): RequesterId,
    Json(payload): Json<CancelOrderRequest>,
) -> Result<Json<CancelOrderResponse>, AppError> {
    let resolution = state
        .orchestrator
        .cancel_order(payload.order_id, &user_id)
        .await?;

    let (success, status) = match resolution {
        Resolution::Applied(status) => (true, status),
        Resolution::AlreadyResolved(status) => (status == OrderStatus::Canceled, status),
        Resolution::SupersededSession => {
            return Err(AppError::Internal("unexpected cancel resolution".to_string()))
        }
    };
    Ok(Json(CancelOrderResponse { success, status }))
}
