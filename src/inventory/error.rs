use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error types for inventory adjustments
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// The guarded update matched no row: not enough unreserved stock and
    /// backorders are disabled
    #[error("Insufficient stock for product {product_id} (variant {variant_id:?})")]
    InsufficientStock {
        product_id: i32,
        variant_id: Option<i32>,
    },

    #[error("Unknown product {0}")]
    ProductNotFound(i32),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for InventoryError {
    fn from(err: sqlx::Error) -> Self {
        InventoryError::DatabaseError(err.to_string())
    }
}

impl IntoResponse for InventoryError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            InventoryError::InsufficientStock {
                product_id,
                variant_id,
            } => (
                StatusCode::CONFLICT,
                match variant_id {
                    Some(v) => format!("Insufficient stock for product {} variant {}", product_id, v),
                    None => format!("Insufficient stock for product {}", product_id),
                },
            ),
            InventoryError::ProductNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Product {} not found", id))
            }
            InventoryError::DatabaseError(msg) => {
                tracing::error!("Inventory repository error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
