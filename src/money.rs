// Money primitive
//
// Every monetary value in the engine flows through this type: integer minor
// units (cents) plus a currency code. Rates and percentages use rust_decimal,
// and rounding (half-up on the minor unit) happens exactly once, at the point
// where a computed value becomes a stored or displayed amount.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use utoipa::ToSchema;

/// Error types for money arithmetic
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    #[error("Amount overflow in money arithmetic")]
    AmountOverflow,
}

/// ISO 4217 alpha-3 currency code
///
/// Stored as raw bytes so `Money` stays `Copy`. Construction goes through
/// `from_code`, which rejects anything that is not three ASCII letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Currency([u8; 3]);

impl Currency {
    pub const USD: Currency = Currency(*b"USD");
    pub const EUR: Currency = Currency(*b"EUR");
    pub const GBP: Currency = Currency(*b"GBP");

    /// Parse a currency code from a string
    ///
    /// # Arguments
    /// * `code` - Three-letter ISO 4217 code, case-insensitive
    ///
    /// # Returns
    /// `Ok(Currency)` or an error message for malformed codes
    pub fn from_code(code: &str) -> Result<Self, String> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_alphabetic()) {
            return Err(format!("Invalid currency code: {}", code));
        }
        let mut buf = [0u8; 3];
        for (i, b) in bytes.iter().enumerate() {
            buf[i] = b.to_ascii_uppercase();
        }
        Ok(Currency(buf))
    }

    /// The code as a string slice
    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII letters
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Currency {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Currency::from_code(&code).map_err(serde::de::Error::custom)
    }
}

/// A monetary amount in minor units of a single currency
///
/// # Invariants
/// - Arithmetic never mixes currencies; mismatches fail with `CurrencyMismatch`
/// - All intermediate math is integer or Decimal; no floating point anywhere
/// - Overflow is detected, never wrapped or truncated silently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Money {
    pub amount_minor: i64,
    #[schema(value_type = String, example = "USD")]
    pub currency: Currency,
}

impl Money {
    /// Create a money value from minor units (e.g. cents)
    pub const fn new(amount_minor: i64, currency: Currency) -> Self {
        Self {
            amount_minor,
            currency,
        }
    }

    /// Zero in the given currency
    pub const fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    pub const fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    pub const fn currency(&self) -> Currency {
        self.currency
    }

    pub const fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    pub const fn is_negative(&self) -> bool {
        self.amount_minor < 0
    }

    fn require_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }

    /// Add two amounts of the same currency
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let amount = self
            .amount_minor
            .checked_add(other.amount_minor)
            .ok_or(MoneyError::AmountOverflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Subtract another amount of the same currency
    ///
    /// The result may be negative (refunds, adjustments); callers that need a
    /// floor at zero use `sub_clamped_zero`.
    pub fn sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let amount = self
            .amount_minor
            .checked_sub(other.amount_minor)
            .ok_or(MoneyError::AmountOverflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Subtract, flooring the result at zero
    pub fn sub_clamped_zero(&self, other: &Money) -> Result<Money, MoneyError> {
        let raw = self.sub(other)?;
        Ok(Money::new(raw.amount_minor.max(0), self.currency))
    }

    /// Multiply by a quantity
    pub fn multiply(&self, quantity: u32) -> Result<Money, MoneyError> {
        let amount = self
            .amount_minor
            .checked_mul(i64::from(quantity))
            .ok_or(MoneyError::AmountOverflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Take a percentage of this amount, rounding half-up on the minor unit
    ///
    /// # Arguments
    /// * `rate` - Percentage as a decimal, e.g. `dec!(8.25)` for 8.25%
    ///
    /// # Returns
    /// `amount × rate / 100`, rounded half-up once at this boundary
    pub fn percentage_of(&self, rate: Decimal) -> Result<Money, MoneyError> {
        let amount = Decimal::from(self.amount_minor) * rate / Decimal::from(100);
        let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let minor = rounded.to_i64().ok_or(MoneyError::AmountOverflow)?;
        Ok(Money::new(minor, self.currency))
    }

    /// Compare two amounts of the same currency
    pub fn compare(&self, other: &Money) -> Result<Ordering, MoneyError> {
        self.require_same_currency(other)?;
        Ok(self.amount_minor.cmp(&other.amount_minor))
    }

    /// The smaller of this amount and a cap, same currency required
    pub fn clamp_at_most(&self, cap: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(cap)?;
        Ok(Money::new(
            self.amount_minor.min(cap.amount_minor),
            self.currency,
        ))
    }

    /// Sum a sequence of amounts, all in `currency`
    ///
    /// An empty sequence sums to zero. Any mismatched element fails the whole
    /// sum rather than being skipped.
    pub fn sum<'a, I>(amounts: I, currency: Currency) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = &'a Money>,
    {
        let mut total = Money::zero(currency);
        for amount in amounts {
            total = total.add(amount)?;
        }
        Ok(total)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.amount_minor < 0 { "-" } else { "" };
        let abs = self.amount_minor.unsigned_abs();
        write!(f, "{}{}.{:02} {}", sign, abs / 100, abs % 100, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_from_code() {
        assert_eq!(Currency::from_code("usd").unwrap(), Currency::USD);
        assert_eq!(Currency::from_code("EUR").unwrap(), Currency::EUR);
        assert!(Currency::from_code("US").is_err());
        assert!(Currency::from_code("USDT").is_err());
        assert!(Currency::from_code("U$D").is_err());
    }

    #[test]
    fn test_add_same_currency() {
        let a = Money::new(1000, Currency::USD);
        let b = Money::new(250, Currency::USD);
        assert_eq!(a.add(&b).unwrap().amount_minor(), 1250);
    }

    #[test]
    fn test_add_currency_mismatch() {
        let a = Money::new(1000, Currency::USD);
        let b = Money::new(250, Currency::EUR);
        assert_eq!(
            a.add(&b),
            Err(MoneyError::CurrencyMismatch {
                left: Currency::USD,
                right: Currency::EUR,
            })
        );
    }

    #[test]
    fn test_multiply_quantity() {
        let unit = Money::new(299, Currency::USD);
        assert_eq!(unit.multiply(3).unwrap().amount_minor(), 897);
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        // $10.00 at 8.25% = 82.5 minor units, rounds up to 83
        let amount = Money::new(1000, Currency::USD);
        let tax = amount.percentage_of(dec!(8.25)).unwrap();
        assert_eq!(tax.amount_minor(), 83);
    }

    #[test]
    fn test_percentage_exact() {
        let amount = Money::new(10000, Currency::USD);
        assert_eq!(amount.percentage_of(dec!(10)).unwrap().amount_minor(), 1000);
    }

    #[test]
    fn test_percentage_below_midpoint_rounds_down() {
        // $1.00 at 2.4% = 2.4 minor units, rounds down to 2
        let amount = Money::new(100, Currency::USD);
        assert_eq!(amount.percentage_of(dec!(2.4)).unwrap().amount_minor(), 2);
    }

    #[test]
    fn test_sub_clamped_zero() {
        let a = Money::new(500, Currency::USD);
        let b = Money::new(800, Currency::USD);
        assert_eq!(a.sub_clamped_zero(&b).unwrap().amount_minor(), 0);
        assert_eq!(b.sub_clamped_zero(&a).unwrap().amount_minor(), 300);
    }

    #[test]
    fn test_clamp_at_most() {
        let a = Money::new(1500, Currency::USD);
        let cap = Money::new(1000, Currency::USD);
        assert_eq!(a.clamp_at_most(&cap).unwrap().amount_minor(), 1000);
        assert_eq!(cap.clamp_at_most(&a).unwrap().amount_minor(), 1000);
    }

    #[test]
    fn test_overflow_detected() {
        let a = Money::new(i64::MAX, Currency::USD);
        let b = Money::new(1, Currency::USD);
        assert_eq!(a.add(&b), Err(MoneyError::AmountOverflow));
    }

    #[test]
    fn test_sum_empty_is_zero() {
        let none: Vec<Money> = vec![];
        let total = Money::sum(&none, Currency::USD).unwrap();
        assert!(total.is_zero());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::new(1099, Currency::USD).to_string(), "10.99 USD");
        assert_eq!(Money::new(-550, Currency::EUR).to_string(), "-5.50 EUR");
        assert_eq!(Money::new(5, Currency::GBP).to_string(), "0.05 GBP");
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    /// Property: addition of same-currency amounts is commutative
    #[test]
    fn prop_add_commutative() {
        proptest!(|(a in -1_000_000i64..=1_000_000, b in -1_000_000i64..=1_000_000)| {
            let x = Money::new(a, Currency::USD);
            let y = Money::new(b, Currency::USD);
            prop_assert_eq!(x.add(&y).unwrap(), y.add(&x).unwrap());
        });
    }

    /// Property: percentage_of never exceeds the amount for rates <= 100
    #[test]
    fn prop_percentage_bounded() {
        proptest!(|(amount in 0i64..=10_000_000, rate_bps in 0u32..=10_000u32)| {
            let rate = Decimal::from(rate_bps) / Decimal::from(100);
            let money = Money::new(amount, Currency::USD);
            let part = money.percentage_of(rate).unwrap();
            prop_assert!(part.amount_minor() <= amount + 1, "part {} of {}", part, money);
            prop_assert!(part.amount_minor() >= 0);
        });
    }

    /// Property: multiply agrees with repeated addition
    #[test]
    fn prop_multiply_is_repeated_add() {
        proptest!(|(amount in 0i64..=100_000, qty in 1u32..=50)| {
            let unit = Money::new(amount, Currency::USD);
            let mut acc = Money::zero(Currency::USD);
            for _ in 0..qty {
                acc = acc.add(&unit).unwrap();
            }
            prop_assert_eq!(unit.multiply(qty).unwrap(), acc);
        });
    }

    /// Property: mismatched currencies always fail, regardless of amounts
    #[test]
    fn prop_mismatch_always_fails() {
        proptest!(|(a in any::<i32>(), b in any::<i32>())| {
            let x = Money::new(i64::from(a), Currency::USD);
            let y = Money::new(i64::from(b), Currency::EUR);
            prop_assert!(x.add(&y).is_err());
            prop_assert!(x.sub(&y).is_err());
            prop_assert!(x.compare(&y).is_err());
        });
    }
}
