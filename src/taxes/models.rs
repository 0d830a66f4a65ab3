use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::money::Money;

/// A geographic tax rate record
///
/// Scope narrows from country down to an optional state, city, and set of
/// postal-code patterns. `compound` rates apply on top of the running
/// (base + already-applied tax) amount rather than the base alone.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TaxRate {
    pub id: i32,
    #[schema(example = "CA State Tax")]
    pub name: String,
    /// ISO 3166-1 alpha-2 country code
    #[schema(example = "US")]
    pub country: String,
    #[schema(example = "CA")]
    pub state: Option<String>,
    pub city: Option<String>,
    /// Postal-code patterns; a single `*` token matches any run of characters.
    /// Empty means no postal restriction.
    pub postal_patterns: Vec<String>,
    /// Percentage rate, e.g. 8.25 for 8.25%
    #[schema(value_type = f64, example = 8.25)]
    pub rate: Decimal,
    /// Tax class key matched against the product's tax class
    #[schema(example = "standard")]
    pub tax_class: String,
    pub applies_to_shipping: bool,
    pub applies_to_digital: bool,
    /// Application order; lower priorities apply first
    pub priority: i32,
    pub compound: bool,
    /// Category scoping: empty include list means every category;
    /// exclusion always wins over inclusion
    pub categories_include: Vec<i32>,
    pub categories_exclude: Vec<i32>,
    pub effective_from: DateTime<Utc>,
    pub effective_until: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Context narrowing which rates apply to an amount
#[derive(Debug, Clone, Default)]
pub struct RateFilter {
    /// The amount being taxed is a shipping charge
    pub is_shipping: bool,
    /// The amount covers digital goods only
    pub is_digital: bool,
    /// Restrict to rates of this tax class
    pub tax_class: Option<String>,
    /// Category of the goods being taxed, when known
    pub category_id: Option<i32>,
}

/// One rate's contribution to a tax total
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaxBreakdownEntry {
    pub rate_id: i32,
    pub name: String,
    #[schema(value_type = f64)]
    pub rate: Decimal,
    pub compound: bool,
    pub amount: Money,
}

/// Result of a tax calculation: the total, its per-rate breakdown, and the
/// overall effective percentage
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaxComputation {
    pub total: Money,
    pub breakdown: Vec<TaxBreakdownEntry>,
    #[schema(value_type = f64)]
    pub effective_rate: Decimal,
}
