use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::money::MoneyError;

/// Error types for coupon validation and discount calculation
#[derive(Debug, thiserror::Error)]
pub enum DiscountError {
    /// Unknown, disabled, expired, or exhausted coupon code
    #[error("Invalid coupon code: {0}")]
    InvalidCoupon(String),

    #[error("Coupon {0} is already applied to this cart")]
    DuplicateCoupon(String),

    #[error("Order subtotal is below the coupon minimum of {0} minor units")]
    BelowMinimum(i64),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Discount calculation error: {0}")]
    CalculationError(String),
}

impl From<sqlx::Error> for DiscountError {
    fn from(err: sqlx::Error) -> Self {
        DiscountError::DatabaseError(err.to_string())
    }
}

impl From<MoneyError> for DiscountError {
    fn from(err: MoneyError) -> Self {
        DiscountError::CalculationError(err.to_string())
    }
}

impl IntoResponse for DiscountError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            DiscountError::InvalidCoupon(code) => {
                tracing::debug!("Invalid coupon attempted: {}", code);
                (
                    StatusCode::BAD_REQUEST,
                    format!("Invalid coupon code: {}", code),
                )
            }
            DiscountError::DuplicateCoupon(code) => (
                StatusCode::CONFLICT,
                format!("Coupon {} is already applied", code),
            ),
            DiscountError::BelowMinimum(min) => (
                StatusCode::BAD_REQUEST,
                format!("Order subtotal is below the coupon minimum of {} minor units", min),
            ),
            DiscountError::DatabaseError(msg) => {
                tracing::error!("Coupon repository error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            DiscountError::CalculationError(msg) => {
                tracing::error!("Discount calculation error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
