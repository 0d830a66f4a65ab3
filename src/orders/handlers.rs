// HTTP handlers for the order API

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::orders::{OrderError, OrderResponse, RefundRequest, TransitionRequest};

/// Handler for GET /api/orders/{order_id}
#[utoipa::path(
    get,
    path = "/api/orders/{order_id}",
    responses(
        (status = 200, description = "Order with items", body = OrderResponse),
        (status = 404, description = "Order not found")
    ),
    tag = "orders"
)]
pub async fn get_order_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, OrderError> {
    let order = state.order_service.get_order(order_id).await?;
    Ok(Json(order))
}

/// Handler for POST /api/orders/{order_id}/transition
/// Drives the order status machine; out-of-policy requests change nothing
#[utoipa::path(
    post,
    path = "/api/orders/{order_id}/transition",
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Order after the transition", body = OrderResponse),
        (status = 402, description = "Payment declined"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Invalid status transition"),
        (status = 502, description = "Payment gateway unavailable")
    ),
    tag = "orders"
)]
pub async fn transition_order_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<OrderResponse>, OrderError> {
    request
        .validate()
        .map_err(|e| OrderError::ValidationError(e.to_string()))?;

    let order = state.order_service.transition(order_id, request).await?;
    Ok(Json(order))
}

/// Handler for POST /api/orders/{order_id}/refund
/// Refunds an amount, explicit lines, or (with an empty body) the remainder
#[utoipa::path(
    post,
    path = "/api/orders/{order_id}/refund",
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Order after the refund", body = OrderResponse),
        (status = 400, description = "Refund exceeds the remaining refundable amount"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "No captured payment to refund"),
        (status = 502, description = "Payment gateway unavailable")
    ),
    tag = "orders"
)]
pub async fn refund_order_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<OrderResponse>, OrderError> {
    request
        .validate()
        .map_err(|e| OrderError::ValidationError(e.to_string()))?;

    let order = state
        .order_service
        .refund(order_id, request.amount_minor, request.lines)
        .await?;
    Ok(Json(order))
}
