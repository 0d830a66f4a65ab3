use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::money::{Currency, Money};

/// Represents a catalog product consumed by the pricing engine
///
/// The catalog itself (creation, editing, media) is managed elsewhere; this
/// engine only reads products to snapshot prices, weights and tax context
/// into carts and orders, and to adjust inventory counters.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Product {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "Canvas Weekender Bag")]
    pub name: String,
    #[schema(example = "BAG-CNV-01")]
    pub sku: String,
    /// Price in minor units of `currency`
    #[schema(example = 4950)]
    pub price_minor: i64,
    #[schema(example = "USD")]
    pub currency: String,
    #[schema(example = 1200)]
    pub weight_grams: i32,
    #[schema(example = false)]
    pub is_digital: bool,
    /// Tax class key matched against tax rates ("standard", "reduced", ...)
    #[schema(example = "standard")]
    pub tax_class: String,
    pub category_id: Option<i32>,
    pub image_url: Option<String>,
    pub track_inventory: bool,
    pub backorders_allowed: bool,
    pub stock_quantity: i32,
    pub reserved_quantity: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Represents a purchasable variant of a product (size, colour, ...)
///
/// A variant may override price and weight; unset fields fall through to the
/// parent product. Inventory is tracked per variant when one is referenced.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ProductVariant {
    #[schema(example = 10)]
    pub id: i32,
    pub product_id: i32,
    #[schema(example = "Large / Olive")]
    pub name: String,
    #[schema(example = "BAG-CNV-01-L-OLV")]
    pub sku: String,
    /// Optional price override in minor units
    pub price_minor: Option<i64>,
    pub weight_grams: Option<i32>,
    /// Attribute pairs frozen into order snapshots, e.g. {"size": "L"}
    #[schema(value_type = Object)]
    pub attributes: serde_json::Value,
    pub stock_quantity: i32,
    pub reserved_quantity: i32,
    pub is_active: bool,
}

/// A ship-to address, or the partial stub a cart carries for estimation
///
/// Only the fields the tax and shipping engines match on. Street lines and
/// recipient names live with the storefront, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, validator::Validate)]
pub struct Address {
    /// ISO 3166-1 alpha-2 country code
    #[schema(example = "US")]
    #[validate(custom = "crate::validation::validate_country_code")]
    pub country: String,
    #[schema(example = "CA")]
    pub state: Option<String>,
    #[schema(example = "Los Angeles")]
    pub city: Option<String>,
    #[schema(example = "90210")]
    pub postal_code: Option<String>,
}

impl Address {
    pub fn new(country: &str) -> Self {
        Self {
            country: country.to_string(),
            state: None,
            city: None,
            postal_code: None,
        }
    }

    pub fn with_state(mut self, state: &str) -> Self {
        self.state = Some(state.to_string());
        self
    }

    pub fn with_city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }

    pub fn with_postal_code(mut self, postal_code: &str) -> Self {
        self.postal_code = Some(postal_code.to_string());
        self
    }
}

impl Product {
    /// The product's unit price as `Money`
    pub fn unit_price(&self) -> Result<Money, String> {
        let currency = Currency::from_code(&self.currency)?;
        Ok(Money::new(self.price_minor, currency))
    }
}

impl ProductVariant {
    /// The effective unit price: the variant override, else the parent price
    pub fn effective_price(&self, product: &Product) -> Result<Money, String> {
        let currency = Currency::from_code(&product.currency)?;
        Ok(Money::new(
            self.price_minor.unwrap_or(product.price_minor),
            currency,
        ))
    }

    /// The effective shipping weight in grams
    pub fn effective_weight(&self, product: &Product) -> i32 {
        self.weight_grams.unwrap_or(product.weight_grams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_product() -> Product {
        Product {
            id: 1,
            name: "Canvas Weekender Bag".to_string(),
            sku: "BAG-CNV-01".to_string(),
            price_minor: 4950,
            currency: "USD".to_string(),
            weight_grams: 1200,
            is_digital: false,
            tax_class: "standard".to_string(),
            category_id: Some(3),
            image_url: None,
            track_inventory: true,
            backorders_allowed: false,
            stock_quantity: 25,
            reserved_quantity: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_variant() -> ProductVariant {
        ProductVariant {
            id: 10,
            product_id: 1,
            name: "Large / Olive".to_string(),
            sku: "BAG-CNV-01-L-OLV".to_string(),
            price_minor: Some(5450),
            weight_grams: Some(1400),
            attributes: json!({"size": "L", "colour": "olive"}),
            stock_quantity: 5,
            reserved_quantity: 0,
            is_active: true,
        }
    }

    #[test]
    fn test_product_unit_price() {
        let price = sample_product().unit_price().unwrap();
        assert_eq!(price.amount_minor(), 4950);
        assert_eq!(price.currency(), Currency::USD);
    }

    #[test]
    fn test_product_bad_currency_is_rejected() {
        let mut product = sample_product();
        product.currency = "DOLLARS".to_string();
        assert!(product.unit_price().is_err());
    }

    #[test]
    fn test_variant_price_override() {
        let product = sample_product();
        let variant = sample_variant();
        assert_eq!(
            variant.effective_price(&product).unwrap().amount_minor(),
            5450
        );
        assert_eq!(variant.effective_weight(&product), 1400);
    }

    #[test]
    fn test_variant_falls_through_to_product() {
        let product = sample_product();
        let mut variant = sample_variant();
        variant.price_minor = None;
        variant.weight_grams = None;

        assert_eq!(
            variant.effective_price(&product).unwrap().amount_minor(),
            4950
        );
        assert_eq!(variant.effective_weight(&product), 1200);
    }
}
