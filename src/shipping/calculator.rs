// Shipping rate calculator
//
// Evaluates a shipping method's pricing strategy against an order context
// and decides which methods are available for a destination. The tier and
// availability logic is pure; only the externally-calculated strategy and
// zone lookup touch collaborators.

use tokio::time::timeout;

use crate::models::Address;
use crate::money::Money;
use crate::payments::{RateQuoteProvider, QUOTE_TIMEOUT};
use crate::shipping::error::ShippingError;
use crate::shipping::models::{
    RateStrategy, RateTier, ShipmentContext, ShippingMethod, ShippingQuote, ShippingZone,
};
use crate::shipping::repository::ShippingRepository;
use crate::validation::postal_pattern_matches;

/// Service pricing shipments and resolving destination zones
#[derive(Clone)]
pub struct ShippingService<Q> {
    shipping_repo: ShippingRepository,
    quote_provider: Q,
    /// Warehouse origin for externally-calculated quotes
    origin: Address,
}

impl<Q: RateQuoteProvider> ShippingService<Q> {
    /// Create a new ShippingService
    pub fn new(shipping_repo: ShippingRepository, quote_provider: Q, origin: Address) -> Self {
        Self {
            shipping_repo,
            quote_provider,
            origin,
        }
    }

    /// Resolve the shipping zone covering an address
    ///
    /// The matching zone with the lowest priority value wins; when no
    /// explicit zone covers the address the default zone (if any) is used.
    pub async fn resolve_zone(
        &self,
        address: &Address,
    ) -> Result<Option<ShippingZone>, ShippingError> {
        let zones = self.shipping_repo.find_active_zones().await?;
        Ok(pick_zone(zones, address))
    }

    /// Price one method for an order context
    ///
    /// The free-shipping threshold check precedes strategy dispatch: an
    /// order over the threshold ships free no matter what the strategy
    /// would have charged.
    pub async fn calculate_rate(
        &self,
        method: &ShippingMethod,
        ctx: &ShipmentContext,
    ) -> Result<Money, ShippingError> {
        method
            .validate()
            .map_err(ShippingError::InvalidConfiguration)?;

        let currency = ctx.subtotal.currency();
        if let Some(threshold) = method.free_shipping_threshold_minor {
            if ctx.subtotal.amount_minor() >= threshold {
                return Ok(Money::zero(currency));
            }
        }

        match &method.strategy.0 {
            RateStrategy::Flat { cost_minor } => Ok(Money::new(*cost_minor, currency)),
            RateStrategy::WeightTiered { tiers } => {
                tier_cost(tiers, ctx.total_weight_grams, ctx.subtotal)
            }
            RateStrategy::PriceTiered { tiers } => {
                tier_cost(tiers, ctx.subtotal.amount_minor(), ctx.subtotal)
            }
            RateStrategy::QuantityTiered { tiers } => {
                tier_cost(tiers, i64::from(ctx.total_quantity), ctx.subtotal)
            }
            RateStrategy::Free => Ok(Money::zero(currency)),
            RateStrategy::Calculated => {
                let quote = timeout(
                    QUOTE_TIMEOUT,
                    self.quote_provider.quote(
                        &self.origin,
                        &ctx.destination,
                        ctx.total_weight_grams,
                    ),
                )
                .await
                .map_err(|_| {
                    ShippingError::QuoteUnavailable(format!(
                        "quote timed out after {:?}",
                        QUOTE_TIMEOUT
                    ))
                })?
                .map_err(|e| ShippingError::QuoteUnavailable(e.to_string()))?;

                if quote.currency() != currency {
                    return Err(ShippingError::CalculationError(format!(
                        "quote currency {} does not match order currency {}",
                        quote.currency(),
                        currency
                    )));
                }
                Ok(quote)
            }
        }
    }

    /// Quote every method available for the context's destination, cheapest
    /// first
    pub async fn available_quotes(
        &self,
        ctx: &ShipmentContext,
    ) -> Result<Vec<ShippingQuote>, ShippingError> {
        let Some(zone) = self.resolve_zone(&ctx.destination).await? else {
            return Ok(vec![]);
        };

        let methods = self.shipping_repo.find_methods_for_zone(zone.id).await?;
        let mut quotes = Vec::new();
        for method in &methods {
            if !is_available_for(method, ctx, &zone) {
                continue;
            }
            let cost = self.calculate_rate(method, ctx).await?;
            quotes.push(ShippingQuote {
                method_id: method.id,
                method_name: method.name.clone(),
                cost,
                delivery_min_days: method.delivery_min_days,
                delivery_max_days: method.delivery_max_days,
            });
        }
        quotes.sort_by_key(|q| (q.cost.amount_minor(), q.method_id));
        Ok(quotes)
    }

    /// The cheapest available quote for the context, if any method serves it
    pub async fn cheapest_quote(
        &self,
        ctx: &ShipmentContext,
    ) -> Result<Option<ShippingQuote>, ShippingError> {
        Ok(self.available_quotes(ctx).await?.into_iter().next())
    }
}

/// Does a zone's coverage include an address?
pub fn zone_matches(zone: &ShippingZone, address: &Address) -> bool {
    if !zone
        .countries
        .iter()
        .any(|c| c.eq_ignore_ascii_case(&address.country))
    {
        return false;
    }
    if !zone.states.is_empty() {
        let Some(state) = &address.state else {
            return false;
        };
        if !zone.states.iter().any(|s| s.eq_ignore_ascii_case(state)) {
            return false;
        }
    }
    if !zone.postal_patterns.is_empty() {
        let Some(postal) = &address.postal_code else {
            return false;
        };
        if !zone
            .postal_patterns
            .iter()
            .any(|p| postal_pattern_matches(p, postal))
        {
            return false;
        }
    }
    true
}

/// Pick the zone for an address: best-priority explicit match, else default
pub fn pick_zone(zones: Vec<ShippingZone>, address: &Address) -> Option<ShippingZone> {
    let mut fallback = None;
    for zone in zones {
        if zone_matches(&zone, address) {
            // Repository ordering is (priority, id); first match wins
            return Some(zone);
        }
        if zone.is_default && fallback.is_none() {
            fallback = Some(zone);
        }
    }
    fallback
}

/// Availability of a method for an order context within a resolved zone
///
/// Unset restrictions are unconstrained, never zero-by-default.
pub fn is_available_for(method: &ShippingMethod, ctx: &ShipmentContext, zone: &ShippingZone) -> bool {
    if !method.is_active || !method.zone_ids.contains(&zone.id) {
        return false;
    }

    let subtotal = ctx.subtotal.amount_minor();
    if let Some(min) = method.min_order_minor {
        if subtotal < min {
            return false;
        }
    }
    if let Some(max) = method.max_order_minor {
        if subtotal > max {
            return false;
        }
    }
    if let Some(min) = method.min_weight_grams {
        if ctx.total_weight_grams < min {
            return false;
        }
    }
    if let Some(max) = method.max_weight_grams {
        if ctx.total_weight_grams > max {
            return false;
        }
    }
    true
}

/// Find the tier containing `value` and return its cost
///
/// Tiers are `[min, max)`; an unbounded top tier has `max: None`. A value
/// beyond every bounded tier falls back to the tier with the highest `min` —
/// the cap-to-highest-tier policy, a documented product decision rather
/// than a failure.
fn tier_cost(tiers: &[RateTier], value: i64, reference: Money) -> Result<Money, ShippingError> {
    let currency = reference.currency();

    let containing = tiers.iter().find(|tier| {
        value >= tier.min
            && match tier.max {
                Some(max) => value < max,
                None => true,
            }
    });
    if let Some(tier) = containing {
        return Ok(Money::new(tier.cost_minor, currency));
    }

    let capped = tiers
        .iter()
        .max_by_key(|tier| tier.min)
        .ok_or_else(|| ShippingError::InvalidConfiguration("tiered strategy has no tiers".to_string()))?;
    Ok(Money::new(capped.cost_minor, currency))
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::money::Currency;
    use proptest::prelude::*;

    /// Property: with a monotone tier table, cost is monotone in the metric
    #[test]
    fn prop_tier_cost_monotone_for_monotone_tables() {
        proptest!(|(a in 0i64..=30_000, b in 0i64..=30_000)| {
            let tiers = vec![
                RateTier { min: 0, max: Some(5_000), cost_minor: 500 },
                RateTier { min: 5_000, max: Some(20_000), cost_minor: 1000 },
                RateTier { min: 20_000, max: None, cost_minor: 2000 },
            ];
            let reference = Money::zero(Currency::USD);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let cost_lo = tier_cost(&tiers, lo, reference).unwrap();
            let cost_hi = tier_cost(&tiers, hi, reference).unwrap();
            prop_assert!(cost_lo.amount_minor() <= cost_hi.amount_minor());
        });
    }

    /// Property: every metric value lands in exactly one tier of a
    /// contiguous table (no gaps, no overlaps)
    #[test]
    fn prop_contiguous_tiers_cover_every_value() {
        proptest!(|(value in 0i64..=1_000_000)| {
            let tiers = vec![
                RateTier { min: 0, max: Some(100), cost_minor: 1 },
                RateTier { min: 100, max: Some(10_000), cost_minor: 2 },
                RateTier { min: 10_000, max: None, cost_minor: 3 },
            ];
            let containing: Vec<&RateTier> = tiers
                .iter()
                .filter(|t| value >= t.min && t.max.map_or(true, |m| value < m))
                .collect();
            prop_assert_eq!(containing.len(), 1);
        });
    }
}
