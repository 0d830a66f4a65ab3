use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::money::MoneyError;

/// Error types for shipping rate calculation
#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// The external rate-quote provider failed or timed out. Retryable; a
    /// fallback price is never synthesized in its place.
    #[error("Rate quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("Invalid shipping method configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Shipping calculation error: {0}")]
    CalculationError(String),
}

impl From<sqlx::Error> for ShippingError {
    fn from(err: sqlx::Error) -> Self {
        ShippingError::DatabaseError(err.to_string())
    }
}

impl From<MoneyError> for ShippingError {
    fn from(err: MoneyError) -> Self {
        ShippingError::CalculationError(err.to_string())
    }
}

impl IntoResponse for ShippingError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ShippingError::DatabaseError(msg) => {
                tracing::error!("Shipping repository error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ShippingError::QuoteUnavailable(msg) => {
                tracing::warn!("Rate quote unavailable: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            ShippingError::InvalidConfiguration(msg) => {
                tracing::error!("Invalid shipping configuration: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ShippingError::CalculationError(msg) => {
                tracing::error!("Shipping calculation error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
