use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::Address;
use crate::money::{Currency, Money};
use crate::orders::error::OrderError;

/// Order status enum representing the lifecycle of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Convert status to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Position along the forward fulfillment chain, if the status is on it
    ///
    /// Cancelled and refunded are terminal side exits, not chain positions.
    pub fn chain_position(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Confirmed => Some(1),
            OrderStatus::Processing => Some(2),
            OrderStatus::Shipped => Some(3),
            OrderStatus::Delivered => Some(4),
            OrderStatus::Cancelled | OrderStatus::Refunded => None,
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment status enum, independent of the order status axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
        }
    }

    /// Whether a captured payment exists (fully or partially refundable)
    pub fn is_captured(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::PartiallyRefunded)
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fulfillment status enum tracking physical pick/pack/ship/deliver progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Unfulfilled,
    Partial,
    Fulfilled,
    Shipped,
    Delivered,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Unfulfilled => "unfulfilled",
            FulfillmentStatus::Partial => "partial",
            FulfillmentStatus::Fulfilled => "fulfilled",
            FulfillmentStatus::Shipped => "shipped",
            FulfillmentStatus::Delivered => "delivered",
        }
    }
}

impl Default for FulfillmentStatus {
    fn default() -> Self {
        FulfillmentStatus::Unfulfilled
    }
}

impl std::fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Domain model representing an order
///
/// Prices and the shipping address are frozen copies of the cart at
/// checkout; later catalog or address-book changes never reach them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<i32>,
    pub session_token: Option<String>,
    pub cart_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    #[schema(example = "USD")]
    pub currency: String,
    pub subtotal_minor: i64,
    pub discount_minor: i64,
    pub tax_minor: i64,
    pub shipping_minor: i64,
    pub total_minor: i64,
    /// Cumulative refunded amount; never exceeds `total_minor`
    pub refunded_amount_minor: i64,
    /// Gateway reference of the captured payment
    pub transaction_ref: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub ship_country: String,
    pub ship_state: Option<String>,
    pub ship_city: Option<String>,
    pub ship_postal_code: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn currency(&self) -> Result<Currency, OrderError> {
        Currency::from_code(&self.currency).map_err(OrderError::ValidationError)
    }

    pub fn total(&self) -> Result<Money, OrderError> {
        Ok(Money::new(self.total_minor, self.currency()?))
    }

    pub fn refunded_amount(&self) -> Result<Money, OrderError> {
        Ok(Money::new(self.refunded_amount_minor, self.currency()?))
    }

    /// The amount still open for refunding
    pub fn remaining_refundable_minor(&self) -> i64 {
        self.total_minor - self.refunded_amount_minor
    }

    pub fn shipping_address(&self) -> Address {
        Address {
            country: self.ship_country.clone(),
            state: self.ship_state.clone(),
            city: self.ship_city.clone(),
            postal_code: self.ship_postal_code.clone(),
        }
    }
}

/// Frozen catalog attributes of an order line
///
/// Captured at checkout and never re-derived from the live catalog.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LineSnapshot {
    pub name: String,
    pub sku: String,
    pub image_url: Option<String>,
    pub weight_grams: i32,
    #[schema(value_type = Object)]
    pub attributes: serde_json::Value,
}

/// Domain model representing an item within an order
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OrderItem {
    pub id: i32,
    pub order_id: Uuid,
    pub product_id: i32,
    pub variant_id: Option<i32>,
    pub quantity: i32,
    /// Units already refunded from this line
    pub refunded_quantity: i32,
    /// Units shipped; never exceeds `quantity - refunded_quantity`
    pub shipped_quantity: i32,
    pub unit_price_minor: i64,
    pub line_total_minor: i64,
    #[schema(value_type = LineSnapshot)]
    pub snapshot: Json<LineSnapshot>,
}

impl OrderItem {
    /// Units not yet refunded
    pub fn remaining_quantity(&self) -> i32 {
        (self.quantity - self.refunded_quantity).max(0)
    }
}

/// Request DTO for a status transition
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TransitionRequest {
    pub status: OrderStatus,
    /// Payment method token, consumed when transitioning to `confirmed`
    pub payment_method: Option<String>,
    /// Carrier and tracking, recorded when transitioning to `shipped`
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

/// One line of a quantity-aware refund
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RefundLine {
    pub order_item_id: i32,
    #[validate(range(min = 1, message = "Refund quantity must be at least 1"))]
    pub quantity: i32,
}

/// Request DTO for a refund
///
/// Three shapes: explicit lines (amount derived from them, inventory
/// released per line), an explicit amount (money only), or neither (full
/// refund of the remaining amount).
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefundRequest {
    pub amount_minor: Option<i64>,
    #[validate]
    pub lines: Option<Vec<RefundLine>>,
}

/// Response DTO for an order with its items
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Option<i32>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    #[schema(example = "USD")]
    pub currency: String,
    pub subtotal_minor: i64,
    pub discount_minor: i64,
    pub tax_minor: i64,
    pub shipping_minor: i64,
    pub total_minor: i64,
    pub refunded_amount_minor: i64,
    pub shipping_address: Address,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub items: Vec<OrderItem>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderResponse {
    pub fn from_parts(order: Order, items: Vec<OrderItem>) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            payment_status: order.payment_status,
            fulfillment_status: order.fulfillment_status,
            currency: order.currency.clone(),
            subtotal_minor: order.subtotal_minor,
            discount_minor: order.discount_minor,
            tax_minor: order.tax_minor,
            shipping_minor: order.shipping_minor,
            total_minor: order.total_minor,
            refunded_amount_minor: order.refunded_amount_minor,
            shipping_address: order.shipping_address(),
            carrier: order.carrier,
            tracking_number: order.tracking_number,
            items,
            confirmed_at: order.confirmed_at,
            shipped_at: order.shipped_at,
            delivered_at: order.delivered_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ] {
            assert_eq!(status.to_string(), status.as_str());
        }
        assert_eq!(
            PaymentStatus::PartiallyRefunded.as_str(),
            "partially_refunded"
        );
    }

    #[test]
    fn test_chain_positions_are_ordered() {
        let chain = [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ];
        for pair in chain.windows(2) {
            assert!(pair[0].chain_position() < pair[1].chain_position());
        }
        assert_eq!(OrderStatus::Cancelled.chain_position(), None);
        assert_eq!(OrderStatus::Refunded.chain_position(), None);
    }

    #[test]
    fn test_payment_captured_states() {
        assert!(PaymentStatus::Paid.is_captured());
        assert!(PaymentStatus::PartiallyRefunded.is_captured());
        assert!(!PaymentStatus::Pending.is_captured());
        assert!(!PaymentStatus::Failed.is_captured());
        assert!(!PaymentStatus::Refunded.is_captured());
    }
}
