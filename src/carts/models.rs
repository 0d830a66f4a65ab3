use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::carts::error::CartError;
use crate::discounts::AppliedDiscount;
use crate::models::Address;
use crate::money::{Currency, Money};

/// Cart lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Active,
    CheckedOut,
    Expired,
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartStatus::Active => write!(f, "active"),
            CartStatus::CheckedOut => write!(f, "checked_out"),
            CartStatus::Expired => write!(f, "expired"),
        }
    }
}

/// The identity that owns a cart: a registered user or an anonymous session —
/// never both, never neither
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CartOwner {
    User(i32),
    Guest(String),
}

impl CartOwner {
    /// Build an owner from the nullable storage columns, enforcing the
    /// exactly-one invariant
    pub fn from_columns(
        user_id: Option<i32>,
        session_token: Option<String>,
    ) -> Result<Self, CartError> {
        match (user_id, session_token) {
            (Some(user), None) => Ok(CartOwner::User(user)),
            (None, Some(token)) => Ok(CartOwner::Guest(token)),
            (Some(_), Some(_)) => Err(CartError::ValidationError(
                "Cart cannot belong to both a user and a guest session".to_string(),
            )),
            (None, None) => Err(CartError::ValidationError(
                "Cart must belong to a user or a guest session".to_string(),
            )),
        }
    }

    pub fn user_id(&self) -> Option<i32> {
        match self {
            CartOwner::User(id) => Some(*id),
            CartOwner::Guest(_) => None,
        }
    }

    pub fn session_token(&self) -> Option<&str> {
        match self {
            CartOwner::User(_) => None,
            CartOwner::Guest(token) => Some(token),
        }
    }
}

/// Domain model representing a cart row
///
/// The totals columns are derived state: they are rewritten by recomputation
/// after every mutation and guarded by `version` for optimistic concurrency.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Option<i32>,
    pub session_token: Option<String>,
    pub status: CartStatus,
    #[schema(example = "USD")]
    pub currency: String,
    pub ship_country: Option<String>,
    pub ship_state: Option<String>,
    pub ship_city: Option<String>,
    pub ship_postal_code: Option<String>,
    pub subtotal_minor: i64,
    pub discount_minor: i64,
    pub tax_minor: i64,
    pub shipping_minor: i64,
    pub total_minor: i64,
    /// Optimistic concurrency guard; bumped on every totals write
    pub version: i32,
    /// Guest carts expire; user carts carry no expiry
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn owner(&self) -> Result<CartOwner, CartError> {
        CartOwner::from_columns(self.user_id, self.session_token.clone())
    }

    pub fn currency(&self) -> Result<Currency, CartError> {
        Currency::from_code(&self.currency).map_err(CartError::ValidationError)
    }

    /// The destination stub used for tax/shipping estimation, when set
    pub fn destination(&self) -> Option<Address> {
        self.ship_country.as_ref().map(|country| Address {
            country: country.clone(),
            state: self.ship_state.clone(),
            city: self.ship_city.clone(),
            postal_code: self.ship_postal_code.clone(),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, CartStatus::Expired)
            || self.expires_at.map_or(false, |at| now >= at)
    }

    /// The cached totals as money values
    pub fn totals(&self) -> Result<CartTotals, CartError> {
        let currency = self.currency()?;
        Ok(CartTotals {
            subtotal: Money::new(self.subtotal_minor, currency),
            discount: Money::new(self.discount_minor, currency),
            tax: Money::new(self.tax_minor, currency),
            shipping: Money::new(self.shipping_minor, currency),
            total: Money::new(self.total_minor, currency),
        })
    }
}

/// A priced customization attached to a line item (gift wrap, engraving, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LineAddon {
    #[schema(example = "Gift wrap")]
    pub name: String,
    /// Add-on price in minor units, per item
    #[schema(example = 300)]
    pub price_minor: i64,
}

/// Domain model representing one cart line
///
/// Unit price and weight are snapshots captured at add time; while the cart
/// is still open they are refreshed from the catalog on recomputation, and
/// they freeze for good when the line is copied into an order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CartLineItem {
    pub id: i32,
    pub cart_id: Uuid,
    pub product_id: i32,
    pub variant_id: Option<i32>,
    pub quantity: i32,
    pub unit_price_minor: i64,
    pub weight_grams: i32,
    #[schema(value_type = Vec<LineAddon>)]
    pub addons: Json<Vec<LineAddon>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLineItem {
    /// Per-unit price including add-ons
    pub fn unit_price_with_addons(&self, currency: Currency) -> Result<Money, CartError> {
        let addons: i64 = self.addons.0.iter().map(|a| a.price_minor).sum();
        let unit = Money::new(self.unit_price_minor, currency);
        Ok(unit.add(&Money::new(addons, currency))?)
    }

    /// The line's extended total
    pub fn line_total(&self, currency: Currency) -> Result<Money, CartError> {
        let quantity = u32::try_from(self.quantity).map_err(|_| {
            CartError::InvalidQuantity(format!("negative quantity {} on line", self.quantity))
        })?;
        Ok(self.unit_price_with_addons(currency)?.multiply(quantity)?)
    }

    pub fn total_weight_grams(&self) -> i64 {
        i64::from(self.weight_grams) * i64::from(self.quantity.max(0))
    }
}

/// Derived totals of a cart, recomputed top-to-bottom after every mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CartTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
}

// ---------------------------------------------------------------------------
// Request / response DTOs
// ---------------------------------------------------------------------------

/// Request DTO for creating a cart
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCartRequest {
    /// Exactly one of `user_id` and `session_token` must be set
    pub user_id: Option<i32>,
    #[validate(length(min = 16, message = "Session token must be at least 16 characters"))]
    pub session_token: Option<String>,
    #[validate(custom = "crate::validation::validate_currency_code")]
    #[schema(example = "USD")]
    pub currency: String,
}

/// Request DTO for adding a line item
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub product_id: i32,
    pub variant_id: Option<i32>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    /// Priced customizations for this line
    #[serde(default)]
    pub addons: Vec<LineAddon>,
}

/// Request DTO for changing a line's quantity; zero or less removes the line
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

/// Request DTO for applying a coupon code
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 64, message = "Coupon code must be 1-64 characters"))]
    pub code: String,
}

/// Request DTO for setting the destination address stub
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetDestinationRequest {
    #[validate]
    pub address: Address,
}

/// Request DTO for checkout
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate]
    pub address: Address,
    /// Chosen shipping method; omitted means the cheapest available
    pub shipping_method_id: Option<i32>,
}

/// Request DTO for merging a guest cart into a user cart on login
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MergeCartRequest {
    pub user_id: i32,
    #[validate(length(min = 16, message = "Session token must be at least 16 characters"))]
    pub session_token: String,
}

/// Response DTO for a cart with its lines, discounts and totals
#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub id: Uuid,
    pub owner: CartOwner,
    pub status: CartStatus,
    #[schema(example = "USD")]
    pub currency: String,
    pub destination: Option<Address>,
    pub items: Vec<CartLineItem>,
    pub applied_discounts: Vec<AppliedDiscount>,
    pub totals: CartTotals,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_invariant_exactly_one() {
        assert!(matches!(
            CartOwner::from_columns(Some(1), None),
            Ok(CartOwner::User(1))
        ));
        assert!(matches!(
            CartOwner::from_columns(None, Some("tok-aaaaaaaaaaaaaaaa".to_string())),
            Ok(CartOwner::Guest(_))
        ));
        assert!(CartOwner::from_columns(Some(1), Some("tok".to_string())).is_err());
        assert!(CartOwner::from_columns(None, None).is_err());
    }

    #[test]
    fn test_line_total_includes_addons() {
        let line = CartLineItem {
            id: 1,
            cart_id: Uuid::new_v4(),
            product_id: 1,
            variant_id: None,
            quantity: 2,
            unit_price_minor: 1000,
            weight_grams: 500,
            addons: Json(vec![LineAddon {
                name: "Gift wrap".to_string(),
                price_minor: 300,
            }]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let total = line.line_total(Currency::USD).unwrap();
        assert_eq!(total.amount_minor(), 2600);
        assert_eq!(line.total_weight_grams(), 1000);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let mut cart = Cart {
            id: Uuid::new_v4(),
            user_id: None,
            session_token: Some("tok-aaaaaaaaaaaaaaaa".to_string()),
            status: CartStatus::Active,
            currency: "USD".to_string(),
            ship_country: None,
            ship_state: None,
            ship_city: None,
            ship_postal_code: None,
            subtotal_minor: 0,
            discount_minor: 0,
            tax_minor: 0,
            shipping_minor: 0,
            total_minor: 0,
            version: 1,
            expires_at: Some(now + chrono::Duration::days(1)),
            created_at: now,
            updated_at: now,
        };
        assert!(!cart.is_expired(now));

        cart.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(cart.is_expired(now));

        cart.expires_at = None;
        cart.status = CartStatus::Expired;
        assert!(cart.is_expired(now));
    }

    #[test]
    fn test_destination_requires_country() {
        let now = Utc::now();
        let mut cart = Cart {
            id: Uuid::new_v4(),
            user_id: Some(1),
            session_token: None,
            status: CartStatus::Active,
            currency: "USD".to_string(),
            ship_country: None,
            ship_state: Some("CA".to_string()),
            ship_city: None,
            ship_postal_code: None,
            subtotal_minor: 0,
            discount_minor: 0,
            tax_minor: 0,
            shipping_minor: 0,
            total_minor: 0,
            version: 1,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(cart.destination().is_none());

        cart.ship_country = Some("US".to_string());
        let dest = cart.destination().unwrap();
        assert_eq!(dest.country, "US");
        assert_eq!(dest.state.as_deref(), Some("CA"));
    }
}
