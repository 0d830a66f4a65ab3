use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::carts::CartError;
use crate::inventory::InventoryError;
use crate::money::MoneyError;
use crate::payments::PaymentError;

/// Error types for order operations
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Order not found")]
    NotFound,

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Refund rejected: {0}")]
    RefundNotAllowed(String),

    /// Cumulative refunds can never exceed the order total
    #[error("Refund of {requested} minor units exceeds remaining refundable {remaining}")]
    RefundExceedsTotal { requested: i64, remaining: i64 },

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("Money arithmetic error: {0}")]
    Money(String),
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        OrderError::DatabaseError(err.to_string())
    }
}

impl From<MoneyError> for OrderError {
    fn from(err: MoneyError) -> Self {
        OrderError::Money(err.to_string())
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Collaborator errors keep their own status mapping
            OrderError::Cart(e) => return e.into_response(),
            OrderError::Inventory(e) => return e.into_response(),

            OrderError::DatabaseError(msg) => {
                tracing::error!("Order repository error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            OrderError::NotFound => (StatusCode::NOT_FOUND, "Order not found".to_string()),
            OrderError::InvalidTransition(msg) => (StatusCode::CONFLICT, msg),
            OrderError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            OrderError::RefundNotAllowed(msg) => (StatusCode::CONFLICT, msg),
            OrderError::RefundExceedsTotal {
                requested,
                remaining,
            } => (
                StatusCode::BAD_REQUEST,
                format!(
                    "Refund of {} minor units exceeds remaining refundable {}",
                    requested, remaining
                ),
            ),
            OrderError::Payment(e) => {
                tracing::warn!("Payment gateway failure: {}", e);
                let status = match e {
                    PaymentError::Declined(_) => StatusCode::PAYMENT_REQUIRED,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, e.to_string())
            }
            OrderError::Money(msg) => {
                tracing::error!("Money arithmetic error in order: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
