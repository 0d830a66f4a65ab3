use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::discounts::DiscountError;
use crate::inventory::InventoryError;
use crate::money::MoneyError;
use crate::shipping::ShippingError;
use crate::taxes::TaxError;

/// Error types for cart operations
#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Cart not found")]
    NotFound,

    #[error("Cart item not found: {0}")]
    ItemNotFound(i32),

    #[error("Product not found: {0}")]
    ProductNotFound(i32),

    #[error("Product variant not found: {0}")]
    VariantNotFound(i32),

    #[error("Cart has expired")]
    Expired,

    #[error("Cart is no longer open: {0}")]
    NotOpen(String),

    #[error("Cart is empty")]
    Empty,

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Concurrent writers exhausted the optimistic retry budget
    #[error("Cart was modified concurrently; retry the operation")]
    ConcurrentModification,

    /// Stored totals disagree with the line items — an invariant violation,
    /// surfaced rather than silently corrected
    #[error("Cart totals are desynchronized from line items")]
    TotalsDesynchronized,

    #[error(transparent)]
    Tax(#[from] TaxError),

    #[error(transparent)]
    Shipping(#[from] ShippingError),

    #[error(transparent)]
    Discount(#[from] DiscountError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("Money arithmetic error: {0}")]
    Money(String),
}

impl From<sqlx::Error> for CartError {
    fn from(err: sqlx::Error) -> Self {
        CartError::DatabaseError(err.to_string())
    }
}

impl From<MoneyError> for CartError {
    fn from(err: MoneyError) -> Self {
        CartError::Money(err.to_string())
    }
}

impl IntoResponse for CartError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Collaborator errors keep their own status mapping
            CartError::Tax(e) => return e.into_response(),
            CartError::Shipping(e) => return e.into_response(),
            CartError::Discount(e) => return e.into_response(),
            CartError::Inventory(e) => return e.into_response(),

            CartError::DatabaseError(msg) => {
                tracing::error!("Cart repository error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            CartError::NotFound => (StatusCode::NOT_FOUND, "Cart not found".to_string()),
            CartError::ItemNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Cart item {} not found", id))
            }
            CartError::ProductNotFound(id) => {
                (StatusCode::BAD_REQUEST, format!("Product {} not found", id))
            }
            CartError::VariantNotFound(id) => (
                StatusCode::BAD_REQUEST,
                format!("Product variant {} not found", id),
            ),
            CartError::Expired => (StatusCode::GONE, "Cart has expired".to_string()),
            CartError::NotOpen(msg) => (StatusCode::CONFLICT, msg),
            CartError::Empty => (StatusCode::BAD_REQUEST, "Cart is empty".to_string()),
            CartError::InvalidQuantity(msg) => (StatusCode::BAD_REQUEST, msg),
            CartError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            CartError::ConcurrentModification => (
                StatusCode::CONFLICT,
                "Cart was modified concurrently; retry the operation".to_string(),
            ),
            CartError::TotalsDesynchronized => {
                tracing::error!("Cart totals desynchronized from line items");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Cart totals are desynchronized".to_string(),
                )
            }
            CartError::Money(msg) => {
                tracing::error!("Money arithmetic error in cart: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
