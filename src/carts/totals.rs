// Cart totals pipeline
//
// Totals are a pure function of line items, applied discounts, tax, and
// shipping — recomputed top-to-bottom in a fixed order after every mutation
// and written back in one guarded update. Nothing else in the codebase is
// allowed to touch the cached totals columns.

use crate::carts::error::CartError;
use crate::carts::models::{CartLineItem, CartTotals};
use crate::money::{Currency, Money};

/// Sum the line items into the pre-discount subtotal
pub fn subtotal(items: &[CartLineItem], currency: Currency) -> Result<Money, CartError> {
    let mut sum = Money::zero(currency);
    for item in items {
        sum = sum.add(&item.line_total(currency)?)?;
    }
    Ok(sum)
}

/// Total shippable weight of the cart in grams
pub fn total_weight_grams(items: &[CartLineItem]) -> i64 {
    items.iter().map(|i| i.total_weight_grams()).sum()
}

/// Total item count of the cart
pub fn total_quantity(items: &[CartLineItem]) -> u32 {
    items
        .iter()
        .map(|i| u32::try_from(i.quantity.max(0)).unwrap_or(0))
        .sum()
}

/// Assemble the final totals: `total = subtotal − discount + tax + shipping`
///
/// The discount is clamped to the subtotal here so a stack of coupons can
/// never drive the total negative; each coupon was already computed
/// independently against the pre-discount subtotal.
pub fn assemble(
    subtotal: Money,
    discount: Money,
    tax: Money,
    shipping: Money,
) -> Result<CartTotals, CartError> {
    let discount = discount.clamp_at_most(&subtotal)?;
    let total = subtotal.sub(&discount)?.add(&tax)?.add(&shipping)?;
    Ok(CartTotals {
        subtotal,
        discount,
        tax,
        shipping,
        total,
    })
}

/// Check the stored totals identity; a mismatch is an invariant violation
pub fn verify_identity(totals: &CartTotals) -> Result<(), CartError> {
    let expected = totals
        .subtotal
        .sub(&totals.discount)?
        .add(&totals.tax)?
        .add(&totals.shipping)?;
    if expected != totals.total {
        return Err(CartError::TotalsDesynchronized);
    }
    Ok(())
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::USD)
    }

    /// Property: the totals identity holds for any assembled totals
    #[test]
    fn prop_identity_always_holds() {
        proptest!(|(
            subtotal_minor in 0i64..=10_000_000,
            discount_minor in 0i64..=10_000_000,
            tax_minor in 0i64..=1_000_000,
            shipping_minor in 0i64..=100_000
        )| {
            let totals = assemble(
                usd(subtotal_minor),
                usd(discount_minor),
                usd(tax_minor),
                usd(shipping_minor),
            ).unwrap();
            prop_assert!(verify_identity(&totals).is_ok());
            // With non-negative tax and shipping the total can never go
            // negative, because the discount is clamped to the subtotal
            prop_assert!(totals.total.amount_minor() >= 0);
        });
    }
}
