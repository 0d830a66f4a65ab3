use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::discounts::error::DiscountError;

/// Coupon lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CouponStatus {
    Active,
    Disabled,
}

/// How a coupon's value is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscountKind {
    /// Percentage of the subtotal, e.g. 10 = 10% off
    Percentage(Decimal),
    /// Fixed amount off, in minor units of the order currency
    Fixed(i64),
}

/// A coupon record as defined by the promotions collaborator
///
/// The discount is stored as a type discriminator plus two nullable value
/// columns; `kind()` lifts the row into the closed `DiscountKind` variant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Coupon {
    pub id: i32,
    #[schema(example = "WELCOME10")]
    pub code: String,
    /// "percentage" or "fixed"
    #[schema(example = "percentage")]
    pub discount_type: String,
    /// Set when discount_type = "percentage"
    #[schema(value_type = Option<f64>, example = 10.0)]
    pub percentage: Option<Decimal>,
    /// Set when discount_type = "fixed"; minor units
    pub amount_minor: Option<i64>,
    /// Minimum order subtotal (minor units) for the coupon to apply
    pub min_order_minor: Option<i64>,
    /// Cap on the computed discount (minor units)
    pub max_discount_minor: Option<i64>,
    pub status: CouponStatus,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub times_used: i32,
}

impl Coupon {
    /// The coupon's discount as a typed variant
    pub fn kind(&self) -> Result<DiscountKind, DiscountError> {
        match self.discount_type.as_str() {
            "percentage" => self
                .percentage
                .map(DiscountKind::Percentage)
                .ok_or_else(|| {
                    DiscountError::CalculationError(format!(
                        "percentage coupon {} has no percentage value",
                        self.code
                    ))
                }),
            "fixed" => self.amount_minor.map(DiscountKind::Fixed).ok_or_else(|| {
                DiscountError::CalculationError(format!(
                    "fixed coupon {} has no amount value",
                    self.code
                ))
            }),
            other => Err(DiscountError::CalculationError(format!(
                "unknown discount type {} on coupon {}",
                other, self.code
            ))),
        }
    }
}

/// A coupon applied to a cart, with its computed amount
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AppliedDiscount {
    pub coupon_code: String,
    pub amount: crate::money::Money,
}
