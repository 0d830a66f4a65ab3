// Tax resolver
//
// Finds the tax rates applicable to a ship-to address and computes simple +
// compound tax. Matching and calculation are pure functions over rate rows;
// the resolver struct only adds the repository fetch in front of them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::Address;
use crate::money::{Money, MoneyError};
use crate::taxes::error::TaxError;
use crate::taxes::models::{RateFilter, TaxBreakdownEntry, TaxComputation, TaxRate};
use crate::taxes::repository::TaxRatesRepository;
use crate::validation::postal_pattern_matches;

/// Service resolving applicable tax rates and computing tax amounts
#[derive(Clone)]
pub struct TaxResolver {
    rates_repo: TaxRatesRepository,
}

impl TaxResolver {
    /// Create a new TaxResolver
    pub fn new(rates_repo: TaxRatesRepository) -> Self {
        Self { rates_repo }
    }

    /// Resolve the rates applicable to an address, most specific first
    ///
    /// # Arguments
    /// * `address` - Ship-to address (or the cart's estimation stub)
    /// * `filter` - Applicability context (shipping, digital, class, category)
    ///
    /// # Returns
    /// Matching rates ordered by specificity, then priority. An empty list is
    /// a valid outcome, not an error.
    pub async fn resolve_rates(
        &self,
        address: &Address,
        filter: &RateFilter,
    ) -> Result<Vec<TaxRate>, TaxError> {
        let candidates = self
            .rates_repo
            .find_active_for_country(&address.country)
            .await?;
        Ok(match_rates(candidates, address, filter, Utc::now()))
    }

    /// Calculate tax on an amount for an address
    ///
    /// Non-compound rates each apply to the original amount; compound rates
    /// then apply sequentially in priority order, each on
    /// `amount + tax accumulated so far`. Zero matching rates yields zero tax.
    pub async fn calculate_tax(
        &self,
        amount: Money,
        address: &Address,
        filter: &RateFilter,
    ) -> Result<TaxComputation, TaxError> {
        let rates = self.resolve_rates(address, filter).await?;
        Ok(compute_tax(amount, &rates)?)
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Geographic match: returns the specificity score (0 = country only,
/// +1 per matched state/city constraint), or None when the rate does not
/// cover the address
fn geographic_specificity(rate: &TaxRate, address: &Address) -> Option<u8> {
    if !eq_ignore_case(&rate.country, &address.country) {
        return None;
    }

    let mut specificity = 0;
    if let Some(rate_state) = &rate.state {
        match &address.state {
            Some(state) if eq_ignore_case(rate_state, state) => specificity += 1,
            _ => return None,
        }
    }
    if let Some(rate_city) = &rate.city {
        match &address.city {
            Some(city) if eq_ignore_case(rate_city, city) => specificity += 1,
            _ => return None,
        }
    }

    // Postal patterns narrow a geographic match; they never widen one
    if !rate.postal_patterns.is_empty() {
        let Some(postal) = &address.postal_code else {
            return None;
        };
        if !rate
            .postal_patterns
            .iter()
            .any(|p| postal_pattern_matches(p, postal))
        {
            return None;
        }
    }

    Some(specificity)
}

/// Check the rate against filter options; all options must be satisfied
fn satisfies_filter(rate: &TaxRate, filter: &RateFilter) -> bool {
    if filter.is_shipping && !rate.applies_to_shipping {
        return false;
    }
    if filter.is_digital && !rate.applies_to_digital {
        return false;
    }
    if let Some(class) = &filter.tax_class {
        if !eq_ignore_case(&rate.tax_class, class) {
            return false;
        }
    }
    if let Some(category) = filter.category_id {
        // Exclusion always wins over inclusion
        if rate.categories_exclude.contains(&category) {
            return false;
        }
        if !rate.categories_include.is_empty() && !rate.categories_include.contains(&category) {
            return false;
        }
    }
    true
}

fn effective_at(rate: &TaxRate, now: DateTime<Utc>) -> bool {
    if !rate.is_active || now < rate.effective_from {
        return false;
    }
    match rate.effective_until {
        Some(until) => now < until,
        None => true,
    }
}

/// Narrow candidate rates to those matching the address and filter at `now`,
/// ordered most specific first, then by priority
pub fn match_rates(
    candidates: Vec<TaxRate>,
    address: &Address,
    filter: &RateFilter,
    now: DateTime<Utc>,
) -> Vec<TaxRate> {
    let mut matched: Vec<(u8, TaxRate)> = candidates
        .into_iter()
        .filter(|rate| effective_at(rate, now) && satisfies_filter(rate, filter))
        .filter_map(|rate| geographic_specificity(&rate, address).map(|s| (s, rate)))
        .collect();

    matched.sort_by(|(sa, ra), (sb, rb)| {
        sb.cmp(sa)
            .then(ra.priority.cmp(&rb.priority))
            .then(ra.id.cmp(&rb.id))
    });
    matched.into_iter().map(|(_, rate)| rate).collect()
}

/// Compute tax for `amount` given the matched rates
///
/// Each non-compound rate is computed on the original amount and rounded at
/// its own boundary (each breakdown entry is a stored value). Compound rates
/// then apply sequentially in priority order on the running base.
pub fn compute_tax(amount: Money, rates: &[TaxRate]) -> Result<TaxComputation, MoneyError> {
    let currency = amount.currency();
    let mut accumulated = Money::zero(currency);
    let mut breakdown = Vec::with_capacity(rates.len());

    for rate in rates.iter().filter(|r| !r.compound) {
        let tax = amount.percentage_of(rate.rate)?;
        accumulated = accumulated.add(&tax)?;
        breakdown.push(TaxBreakdownEntry {
            rate_id: rate.id,
            name: rate.name.clone(),
            rate: rate.rate,
            compound: false,
            amount: tax,
        });
    }

    let mut compound_rates: Vec<&TaxRate> = rates.iter().filter(|r| r.compound).collect();
    compound_rates.sort_by_key(|r| (r.priority, r.id));

    for rate in compound_rates {
        let base = amount.add(&accumulated)?;
        let tax = base.percentage_of(rate.rate)?;
        accumulated = accumulated.add(&tax)?;
        breakdown.push(TaxBreakdownEntry {
            rate_id: rate.id,
            name: rate.name.clone(),
            rate: rate.rate,
            compound: true,
            amount: tax,
        });
    }

    let effective_rate = if amount.is_zero() {
        Decimal::ZERO
    } else {
        Decimal::from(accumulated.amount_minor()) * Decimal::from(100)
            / Decimal::from(amount.amount_minor())
    };

    Ok(TaxComputation {
        total: accumulated,
        breakdown,
        effective_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn rate(id: i32, country: &str, percentage: Decimal) -> TaxRate {
        TaxRate {
            id,
            name: format!("rate-{}", id),
            country: country.to_string(),
            state: None,
            city: None,
            postal_patterns: vec![],
            rate: percentage,
            tax_class: "standard".to_string(),
            applies_to_shipping: false,
            applies_to_digital: true,
            priority: id,
            compound: false,
            categories_include: vec![],
            categories_exclude: vec![],
            effective_from: Utc::now() - Duration::days(30),
            effective_until: None,
            is_active: true,
        }
    }

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::USD)
    }

    #[test]
    fn test_country_mismatch_excluded() {
        let rates = match_rates(
            vec![rate(1, "DE", dec!(19))],
            &Address::new("US"),
            &RateFilter::default(),
            Utc::now(),
        );
        assert!(rates.is_empty());
    }

    #[test]
    fn test_state_scoped_rate_requires_state() {
        let mut ca = rate(1, "US", dec!(7.25));
        ca.state = Some("CA".to_string());

        let no_state = match_rates(
            vec![ca.clone()],
            &Address::new("US"),
            &RateFilter::default(),
            Utc::now(),
        );
        assert!(no_state.is_empty());

        let with_state = match_rates(
            vec![ca],
            &Address::new("US").with_state("ca"),
            &RateFilter::default(),
            Utc::now(),
        );
        assert_eq!(with_state.len(), 1);
    }

    #[test]
    fn test_specificity_orders_most_specific_first() {
        let country_only = rate(1, "US", dec!(2));
        let mut state = rate(2, "US", dec!(3));
        state.state = Some("CA".to_string());
        let mut city = rate(3, "US", dec!(4));
        city.state = Some("CA".to_string());
        city.city = Some("Los Angeles".to_string());

        let address = Address::new("US").with_state("CA").with_city("Los Angeles");
        let matched = match_rates(
            vec![country_only, state, city],
            &address,
            &RateFilter::default(),
            Utc::now(),
        );

        let ids: Vec<i32> = matched.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_postal_pattern_narrows_match() {
        let mut scoped = rate(1, "US", dec!(1));
        scoped.postal_patterns = vec!["902*".to_string()];

        let hit = match_rates(
            vec![scoped.clone()],
            &Address::new("US").with_postal_code("90210"),
            &RateFilter::default(),
            Utc::now(),
        );
        assert_eq!(hit.len(), 1);

        let miss = match_rates(
            vec![scoped.clone()],
            &Address::new("US").with_postal_code("10001"),
            &RateFilter::default(),
            Utc::now(),
        );
        assert!(miss.is_empty());

        // No postal code on the address at all: a postal-scoped rate cannot apply
        let absent = match_rates(
            vec![scoped],
            &Address::new("US"),
            &RateFilter::default(),
            Utc::now(),
        );
        assert!(absent.is_empty());
    }

    #[test]
    fn test_shipping_and_digital_filters() {
        let mut no_shipping = rate(1, "US", dec!(5));
        no_shipping.applies_to_shipping = false;
        no_shipping.applies_to_digital = false;

        let shipping_filter = RateFilter {
            is_shipping: true,
            ..Default::default()
        };
        assert!(match_rates(
            vec![no_shipping.clone()],
            &Address::new("US"),
            &shipping_filter,
            Utc::now()
        )
        .is_empty());

        let digital_filter = RateFilter {
            is_digital: true,
            ..Default::default()
        };
        assert!(match_rates(
            vec![no_shipping],
            &Address::new("US"),
            &digital_filter,
            Utc::now()
        )
        .is_empty());
    }

    #[test]
    fn test_category_exclusion_wins_over_inclusion() {
        let mut scoped = rate(1, "US", dec!(5));
        scoped.categories_include = vec![7];
        scoped.categories_exclude = vec![7];

        let filter = RateFilter {
            category_id: Some(7),
            ..Default::default()
        };
        assert!(match_rates(vec![scoped], &Address::new("US"), &filter, Utc::now()).is_empty());
    }

    #[test]
    fn test_tax_class_filter() {
        let standard = rate(1, "US", dec!(5));
        let filter = RateFilter {
            tax_class: Some("reduced".to_string()),
            ..Default::default()
        };
        assert!(match_rates(vec![standard], &Address::new("US"), &filter, Utc::now()).is_empty());
    }

    #[test]
    fn test_effective_window_excludes_expired_and_future() {
        let now = Utc::now();
        let mut expired = rate(1, "US", dec!(5));
        expired.effective_until = Some(now - Duration::days(1));
        let mut future = rate(2, "US", dec!(5));
        future.effective_from = now + Duration::days(1);
        let mut inactive = rate(3, "US", dec!(5));
        inactive.is_active = false;

        let matched = match_rates(
            vec![expired, future, inactive],
            &Address::new("US"),
            &RateFilter::default(),
            now,
        );
        assert!(matched.is_empty());
    }

    /// The documented fixed ordering: simple rates on the base, then compound
    /// rates sequentially on the running total. [5% compound, 8% simple] on
    /// $100.00 is exactly $13.40.
    #[test]
    fn test_compound_after_simple_exact_cents() {
        let mut compound = rate(1, "US", dec!(5));
        compound.compound = true;
        let simple = rate(2, "US", dec!(8));

        let result = compute_tax(usd(10_000), &[compound, simple]).unwrap();
        assert_eq!(result.total.amount_minor(), 1340);
        assert_eq!(result.breakdown.len(), 2);
        assert_eq!(result.breakdown[0].amount.amount_minor(), 800);
        assert_eq!(result.breakdown[1].amount.amount_minor(), 540);
        assert_eq!(result.effective_rate, dec!(13.40));
    }

    #[test]
    fn test_compound_rates_apply_in_priority_order() {
        let mut a = rate(1, "US", dec!(10));
        a.compound = true;
        a.priority = 2;
        let mut b = rate(2, "US", dec!(5));
        b.compound = true;
        b.priority = 1;

        // b (priority 1) first: 5% of 100.00 = 5.00; then a on 105.00 = 10.50
        let result = compute_tax(usd(10_000), &[a, b]).unwrap();
        assert_eq!(result.breakdown[0].rate_id, 2);
        assert_eq!(result.breakdown[0].amount.amount_minor(), 500);
        assert_eq!(result.breakdown[1].rate_id, 1);
        assert_eq!(result.breakdown[1].amount.amount_minor(), 1050);
        assert_eq!(result.total.amount_minor(), 1550);
    }

    #[test]
    fn test_zero_matching_rates_is_zero_tax() {
        let result = compute_tax(usd(10_000), &[]).unwrap();
        assert!(result.total.is_zero());
        assert!(result.breakdown.is_empty());
        assert_eq!(result.effective_rate, Decimal::ZERO);
    }

    #[test]
    fn test_zero_amount_has_zero_effective_rate() {
        let result = compute_tax(usd(0), &[rate(1, "US", dec!(8))]).unwrap();
        assert!(result.total.is_zero());
        assert_eq!(result.effective_rate, Decimal::ZERO);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::money::Currency;
    use chrono::Duration;
    use proptest::prelude::*;

    fn simple_rate(id: i32, bps: u32) -> TaxRate {
        TaxRate {
            id,
            name: format!("rate-{}", id),
            country: "US".to_string(),
            state: None,
            city: None,
            postal_patterns: vec![],
            rate: Decimal::from(bps) / Decimal::from(100),
            tax_class: "standard".to_string(),
            applies_to_shipping: false,
            applies_to_digital: true,
            priority: id,
            compound: false,
            categories_include: vec![],
            categories_exclude: vec![],
            effective_from: Utc::now() - Duration::days(1),
            effective_until: None,
            is_active: true,
        }
    }

    /// Property: tax on a non-negative amount with non-negative rates is
    /// non-negative and compound never lowers the total
    #[test]
    fn prop_tax_is_non_negative_and_compound_dominates() {
        proptest!(|(
            amount in 0i64..=10_000_000,
            bps in prop::collection::vec(0u32..=3000, 0..=4)
        )| {
            let money = Money::new(amount, Currency::USD);
            let simple: Vec<TaxRate> = bps.iter().enumerate()
                .map(|(i, &b)| simple_rate(i as i32, b))
                .collect();
            let mut compounded = simple.clone();
            for r in &mut compounded {
                r.compound = true;
            }

            let simple_total = compute_tax(money, &simple).unwrap().total;
            let compound_total = compute_tax(money, &compounded).unwrap().total;

            prop_assert!(simple_total.amount_minor() >= 0);
            prop_assert!(compound_total.amount_minor() >= simple_total.amount_minor());
        });
    }

    /// Property: simple-only tax is order-invariant
    #[test]
    fn prop_simple_tax_order_invariant() {
        proptest!(|(
            amount in 0i64..=1_000_000,
            bps in prop::collection::vec(1u32..=2000, 2..=5)
        )| {
            let money = Money::new(amount, Currency::USD);
            let rates: Vec<TaxRate> = bps.iter().enumerate()
                .map(|(i, &b)| simple_rate(i as i32, b))
                .collect();
            let mut reversed = rates.clone();
            reversed.reverse();

            let a = compute_tax(money, &rates).unwrap().total;
            let b = compute_tax(money, &reversed).unwrap().total;
            prop_assert_eq!(a, b);
        });
    }
}
