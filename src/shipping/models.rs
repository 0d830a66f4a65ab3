use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::Address;
use crate::money::Money;

/// A named geographic coverage set for shipping methods
///
/// Zones narrow from countries to optional states and postal patterns. At
/// most one zone is marked default per active status (enforced by a partial
/// unique index in the schema); the default catches addresses no explicit
/// zone covers.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ShippingZone {
    pub id: i32,
    #[schema(example = "Continental US")]
    pub name: String,
    /// ISO 3166-1 alpha-2 codes
    pub countries: Vec<String>,
    /// State/region codes; empty means every state in the countries
    pub states: Vec<String>,
    /// Postal-code patterns; empty means no postal restriction
    pub postal_patterns: Vec<String>,
    /// Resolution order; lower wins when several zones cover an address
    pub priority: i32,
    pub is_default: bool,
    pub is_active: bool,
}

/// One `[min, max)` pricing band of a tiered strategy
///
/// The metric is strategy-dependent: grams for weight tiers, minor units for
/// price tiers, item count for quantity tiers. `max: None` leaves the top
/// tier unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RateTier {
    pub min: i64,
    pub max: Option<i64>,
    /// Shipping cost in minor units of the order currency
    pub cost_minor: i64,
}

/// Pricing strategy of a shipping method
///
/// A tagged variant: each tier table belongs only to its matching strategy,
/// so a flat method cannot carry stray weight tiers — enforced by the shape
/// of the type, not checked at call time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateStrategy {
    Flat { cost_minor: i64 },
    WeightTiered { tiers: Vec<RateTier> },
    PriceTiered { tiers: Vec<RateTier> },
    QuantityTiered { tiers: Vec<RateTier> },
    Free,
    /// Delegates to the external rate-quote provider
    Calculated,
}

impl RateStrategy {
    /// Validate strategy configuration: tiered strategies need at least one
    /// tier, and every bounded tier needs `min < max`
    pub fn validate(&self) -> Result<(), String> {
        let tiers = match self {
            RateStrategy::WeightTiered { tiers }
            | RateStrategy::PriceTiered { tiers }
            | RateStrategy::QuantityTiered { tiers } => tiers,
            _ => return Ok(()),
        };
        if tiers.is_empty() {
            return Err("tiered strategy has no tiers".to_string());
        }
        for tier in tiers {
            if tier.min < 0 || tier.cost_minor < 0 {
                return Err("tier bounds and costs must be non-negative".to_string());
            }
            if let Some(max) = tier.max {
                if tier.min >= max {
                    return Err(format!("tier [{}, {}) is empty", tier.min, max));
                }
            }
        }
        Ok(())
    }
}

/// A shipping method: a pricing strategy plus availability restrictions
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ShippingMethod {
    pub id: i32,
    #[schema(example = "Ground")]
    pub name: String,
    /// Zones this method serves
    pub zone_ids: Vec<i32>,
    #[schema(value_type = Object)]
    pub strategy: Json<RateStrategy>,
    /// Orders at or above this subtotal (minor units) ship free
    pub free_shipping_threshold_minor: Option<i64>,
    /// Availability restrictions; unset means unconstrained
    pub min_order_minor: Option<i64>,
    pub max_order_minor: Option<i64>,
    pub min_weight_grams: Option<i64>,
    pub max_weight_grams: Option<i64>,
    /// Estimated delivery window in days, `min <= max`
    pub delivery_min_days: i32,
    pub delivery_max_days: i32,
    pub is_active: bool,
}

impl ShippingMethod {
    /// Validate method configuration, including the delivery window invariant
    pub fn validate(&self) -> Result<(), String> {
        if self.delivery_min_days < 0 || self.delivery_min_days > self.delivery_max_days {
            return Err(format!(
                "delivery window {}..{} is invalid",
                self.delivery_min_days, self.delivery_max_days
            ));
        }
        self.strategy.0.validate()
    }
}

/// Order-side inputs to shipping rate calculation
#[derive(Debug, Clone)]
pub struct ShipmentContext {
    /// Post-discount subtotal of the order
    pub subtotal: Money,
    pub total_weight_grams: i64,
    pub total_quantity: u32,
    pub destination: Address,
}

/// A priced shipping option offered to a cart
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShippingQuote {
    pub method_id: i32,
    pub method_name: String,
    pub cost: Money,
    pub delivery_min_days: i32,
    pub delivery_max_days: i32,
}
