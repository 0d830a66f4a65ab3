use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::money::MoneyError;

/// Error types for tax resolution and calculation
#[derive(Debug, thiserror::Error)]
pub enum TaxError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Tax calculation error: {0}")]
    CalculationError(String),
}

impl From<sqlx::Error> for TaxError {
    fn from(err: sqlx::Error) -> Self {
        TaxError::DatabaseError(err.to_string())
    }
}

impl From<MoneyError> for TaxError {
    fn from(err: MoneyError) -> Self {
        TaxError::CalculationError(err.to_string())
    }
}

impl IntoResponse for TaxError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            TaxError::DatabaseError(msg) => {
                tracing::error!("Tax repository error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            TaxError::CalculationError(msg) => {
                tracing::error!("Tax calculation error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
