// Discount engine
//
// Validates coupon codes against a cart's subtotal and computes discount
// amounts. Stacking is additive: every applied coupon is computed
// independently against the pre-discount subtotal — discounts never compound
// with each other.

use chrono::{DateTime, Utc};

use crate::discounts::error::DiscountError;
use crate::discounts::models::{AppliedDiscount, Coupon, CouponStatus, DiscountKind};
use crate::discounts::repository::CouponsRepository;
use crate::money::Money;

/// Service resolving and pricing coupons
#[derive(Clone)]
pub struct DiscountEngine {
    coupons_repo: CouponsRepository,
}

impl DiscountEngine {
    /// Create a new DiscountEngine
    pub fn new(coupons_repo: CouponsRepository) -> Self {
        Self { coupons_repo }
    }

    /// Resolve a code to a coupon eligible for this cart
    ///
    /// # Arguments
    /// * `code` - Coupon code as entered
    /// * `subtotal` - Pre-discount cart subtotal
    /// * `applied_codes` - Codes already on the cart
    ///
    /// # Returns
    /// The coupon, or the policy error explaining the rejection
    pub async fn resolve_coupon(
        &self,
        code: &str,
        subtotal: Money,
        applied_codes: &[String],
    ) -> Result<Coupon, DiscountError> {
        let coupon = self
            .coupons_repo
            .find_by_code(code)
            .await?
            .ok_or_else(|| DiscountError::InvalidCoupon(code.to_string()))?;

        validate_coupon(&coupon, subtotal, applied_codes, Utc::now())?;
        Ok(coupon)
    }

    /// Re-fetch and price the coupons already applied to a cart
    ///
    /// Coupons that became invalid since application (disabled, expired)
    /// contribute nothing; they are dropped from the priced list rather than
    /// failing the recomputation.
    pub async fn price_applied_coupons(
        &self,
        applied_codes: &[String],
        subtotal: Money,
    ) -> Result<Vec<AppliedDiscount>, DiscountError> {
        let mut priced = Vec::with_capacity(applied_codes.len());
        for code in applied_codes {
            let Some(coupon) = self.coupons_repo.find_by_code(code).await? else {
                tracing::warn!("Applied coupon {} no longer exists; dropping", code);
                continue;
            };
            if !is_currently_redeemable(&coupon, Utc::now()) {
                tracing::warn!("Applied coupon {} no longer redeemable; dropping", code);
                continue;
            }
            let amount = compute_discount(&coupon, subtotal)?;
            priced.push(AppliedDiscount {
                coupon_code: coupon.code.clone(),
                amount,
            });
        }
        Ok(priced)
    }

    /// Record a redemption for each coupon on a finalized order
    pub async fn record_redemptions(&self, applied_codes: &[String]) -> Result<(), DiscountError> {
        for code in applied_codes {
            if let Some(coupon) = self.coupons_repo.find_by_code(code).await? {
                self.coupons_repo.increment_usage(coupon.id).await?;
            }
        }
        Ok(())
    }
}

fn is_currently_redeemable(coupon: &Coupon, now: DateTime<Utc>) -> bool {
    if coupon.status != CouponStatus::Active {
        return false;
    }
    if let Some(starts) = coupon.starts_at {
        if now < starts {
            return false;
        }
    }
    if let Some(expires) = coupon.expires_at {
        if now >= expires {
            return false;
        }
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.times_used >= limit {
            return false;
        }
    }
    true
}

/// Validate a coupon for application to a cart
///
/// Rejections, in check order: inactive/out-of-window/exhausted codes
/// (`InvalidCoupon`), a code already on the cart (`DuplicateCoupon`), and a
/// subtotal below the coupon's minimum (`BelowMinimum`).
pub fn validate_coupon(
    coupon: &Coupon,
    subtotal: Money,
    applied_codes: &[String],
    now: DateTime<Utc>,
) -> Result<(), DiscountError> {
    if !is_currently_redeemable(coupon, now) {
        return Err(DiscountError::InvalidCoupon(coupon.code.clone()));
    }
    if applied_codes
        .iter()
        .any(|c| c.eq_ignore_ascii_case(&coupon.code))
    {
        return Err(DiscountError::DuplicateCoupon(coupon.code.clone()));
    }
    if let Some(min) = coupon.min_order_minor {
        if subtotal.amount_minor() < min {
            return Err(DiscountError::BelowMinimum(min));
        }
    }
    Ok(())
}

/// Compute one coupon's discount against the pre-discount subtotal
///
/// Percentage discounts are `subtotal × rate / 100`, clamped to the coupon's
/// cap when present. Fixed discounts use the configured amount, clamped so
/// they never exceed the subtotal.
pub fn compute_discount(coupon: &Coupon, subtotal: Money) -> Result<Money, DiscountError> {
    let currency = subtotal.currency();
    match coupon.kind()? {
        DiscountKind::Percentage(rate) => {
            let mut amount = subtotal.percentage_of(rate)?;
            if let Some(cap) = coupon.max_discount_minor {
                amount = amount.clamp_at_most(&Money::new(cap, currency))?;
            }
            Ok(amount)
        }
        DiscountKind::Fixed(amount_minor) => {
            Ok(Money::new(amount_minor, currency).clamp_at_most(&subtotal)?)
        }
    }
}

/// Sum independently computed discounts; the stack never compounds
pub fn total_discount(applied: &[AppliedDiscount], subtotal: Money) -> Result<Money, DiscountError> {
    let amounts: Vec<Money> = applied.iter().map(|a| a.amount).collect();
    Ok(Money::sum(&amounts, subtotal.currency())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::USD)
    }

    fn percentage_coupon(code: &str, rate: rust_decimal::Decimal) -> Coupon {
        Coupon {
            id: 1,
            code: code.to_string(),
            discount_type: "percentage".to_string(),
            percentage: Some(rate),
            amount_minor: None,
            min_order_minor: None,
            max_discount_minor: None,
            status: CouponStatus::Active,
            starts_at: None,
            expires_at: None,
            usage_limit: None,
            times_used: 0,
        }
    }

    fn fixed_coupon(code: &str, amount_minor: i64) -> Coupon {
        Coupon {
            id: 2,
            code: code.to_string(),
            discount_type: "fixed".to_string(),
            percentage: None,
            amount_minor: Some(amount_minor),
            min_order_minor: None,
            max_discount_minor: None,
            status: CouponStatus::Active,
            starts_at: None,
            expires_at: None,
            usage_limit: None,
            times_used: 0,
        }
    }

    #[test]
    fn test_percentage_discount() {
        let coupon = percentage_coupon("TEN", dec!(10));
        assert_eq!(compute_discount(&coupon, usd(10_000)).unwrap().amount_minor(), 1000);
    }

    #[test]
    fn test_percentage_clamped_to_cap() {
        let mut coupon = percentage_coupon("TEN", dec!(10));
        coupon.max_discount_minor = Some(500);
        assert_eq!(compute_discount(&coupon, usd(10_000)).unwrap().amount_minor(), 500);
    }

    #[test]
    fn test_fixed_clamped_to_subtotal() {
        let coupon = fixed_coupon("FIVER", 500);
        assert_eq!(compute_discount(&coupon, usd(300)).unwrap().amount_minor(), 300);
        assert_eq!(compute_discount(&coupon, usd(10_000)).unwrap().amount_minor(), 500);
    }

    /// $100 subtotal with 10% and $5 fixed applied yields $15.00, not
    /// $10.45: discounts are additive, never compounding
    #[test]
    fn test_stacking_is_additive_not_compounding() {
        let subtotal = usd(10_000);
        let a = compute_discount(&percentage_coupon("A", dec!(10)), subtotal).unwrap();
        let b = compute_discount(&fixed_coupon("B", 500), subtotal).unwrap();

        let applied = vec![
            AppliedDiscount { coupon_code: "A".to_string(), amount: a },
            AppliedDiscount { coupon_code: "B".to_string(), amount: b },
        ];
        let total = total_discount(&applied, subtotal).unwrap();
        assert_eq!(total.amount_minor(), 1500);
    }

    #[test]
    fn test_duplicate_coupon_rejected() {
        let coupon = percentage_coupon("TEN", dec!(10));
        let applied = vec!["ten".to_string()];
        let err = validate_coupon(&coupon, usd(10_000), &applied, Utc::now()).unwrap_err();
        assert!(matches!(err, DiscountError::DuplicateCoupon(_)));
    }

    #[test]
    fn test_below_minimum_rejected() {
        let mut coupon = percentage_coupon("TEN", dec!(10));
        coupon.min_order_minor = Some(5_000);
        let err = validate_coupon(&coupon, usd(4_999), &[], Utc::now()).unwrap_err();
        assert!(matches!(err, DiscountError::BelowMinimum(5_000)));
        assert!(validate_coupon(&coupon, usd(5_000), &[], Utc::now()).is_ok());
    }

    #[test]
    fn test_disabled_coupon_rejected() {
        let mut coupon = percentage_coupon("TEN", dec!(10));
        coupon.status = CouponStatus::Disabled;
        let err = validate_coupon(&coupon, usd(10_000), &[], Utc::now()).unwrap_err();
        assert!(matches!(err, DiscountError::InvalidCoupon(_)));
    }

    #[test]
    fn test_redemption_window_enforced() {
        let now = Utc::now();
        let mut not_started = percentage_coupon("SOON", dec!(10));
        not_started.starts_at = Some(now + Duration::days(1));
        assert!(validate_coupon(&not_started, usd(10_000), &[], now).is_err());

        let mut expired = percentage_coupon("GONE", dec!(10));
        expired.expires_at = Some(now - Duration::days(1));
        assert!(validate_coupon(&expired, usd(10_000), &[], now).is_err());
    }

    #[test]
    fn test_usage_limit_exhausted() {
        let mut coupon = percentage_coupon("LIMITED", dec!(10));
        coupon.usage_limit = Some(100);
        coupon.times_used = 100;
        assert!(validate_coupon(&coupon, usd(10_000), &[], Utc::now()).is_err());
    }

    #[test]
    fn test_malformed_coupon_row_is_calculation_error() {
        let mut coupon = percentage_coupon("BROKEN", dec!(10));
        coupon.percentage = None;
        let err = compute_discount(&coupon, usd(10_000)).unwrap_err();
        assert!(matches!(err, DiscountError::CalculationError(_)));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::money::Currency;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::USD)
    }

    /// Property: a fixed discount never exceeds the subtotal
    #[test]
    fn prop_fixed_discount_clamped() {
        proptest!(|(subtotal in 0i64..=1_000_000, amount in 0i64..=2_000_000)| {
            let coupon = Coupon {
                id: 1,
                code: "F".to_string(),
                discount_type: "fixed".to_string(),
                percentage: None,
                amount_minor: Some(amount),
                min_order_minor: None,
                max_discount_minor: None,
                status: CouponStatus::Active,
                starts_at: None,
                expires_at: None,
                usage_limit: None,
                times_used: 0,
            };
            let discount = compute_discount(&coupon, usd(subtotal)).unwrap();
            prop_assert!(discount.amount_minor() <= subtotal);
        });
    }

    /// Property: stacked discounts equal the sum of individual computations,
    /// regardless of application order
    #[test]
    fn prop_stacking_order_invariant() {
        proptest!(|(
            subtotal in 1i64..=1_000_000,
            rates in prop::collection::vec(1u32..=50, 1..=4)
        )| {
            let subtotal = usd(subtotal);
            let coupons: Vec<Coupon> = rates.iter().enumerate().map(|(i, &r)| Coupon {
                id: i as i32,
                code: format!("C{}", i),
                discount_type: "percentage".to_string(),
                percentage: Some(Decimal::from(r)),
                amount_minor: None,
                min_order_minor: None,
                max_discount_minor: None,
                status: CouponStatus::Active,
                starts_at: None,
                expires_at: None,
                usage_limit: None,
                times_used: 0,
            }).collect();

            let forward: Vec<AppliedDiscount> = coupons.iter().map(|c| AppliedDiscount {
                coupon_code: c.code.clone(),
                amount: compute_discount(c, subtotal).unwrap(),
            }).collect();
            let mut reversed = forward.clone();
            reversed.reverse();

            let a = total_discount(&forward, subtotal).unwrap();
            let b = total_discount(&reversed, subtotal).unwrap();
            prop_assert_eq!(a, b);

            let independent_sum: i64 = forward.iter().map(|d| d.amount.amount_minor()).sum();
            prop_assert_eq!(a.amount_minor(), independent_sum);
        });
    }
}
