//! Minor-unit price representation.
//!
//! All currency arithmetic in the storefront happens on integer minor units
//! (cents). `rust_decimal` is only reached for at the formatting boundary,
//! where the payment gateway wants a fixed two-decimal major-unit string and
//! product cards want a rounded rand figure.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A price in integer minor units (cents).
///
/// ```
/// use studyhub_core::Price;
///
/// let unit = Price::from_cents(3000);
/// let total = unit * 2;
/// assert_eq!(total.cents(), 6000);
/// assert_eq!(total.amount_string(), "60.00");
/// assert_eq!(total.display_rands(), "R60");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    /// Zero price.
    pub const ZERO: Self = Self(0);

    /// Create a price from integer cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// The underlying cents value.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Major-unit decimal with exactly two fraction digits.
    ///
    /// Cents are already two-decimal quantities so this conversion is exact;
    /// the round-half-up strategy only matters for callers that scale the
    /// decimal further.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Fixed two-decimal string, e.g. `"60.00"`.
    ///
    /// This is the wire format the signing authority and the payment
    /// processor expect for the `amount` field.
    #[must_use]
    pub fn amount_string(self) -> String {
        format!("{:.2}", self.to_decimal())
    }

    /// Whole-rand display string, e.g. `"R60"`.
    #[must_use]
    pub fn display_rands(self) -> String {
        format!(
            "R{:.0}",
            self.to_decimal()
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        )
    }

    /// Saturating sum, for cart totals.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl core::ops::Mul<i64> for Price {
    type Output = Self;

    fn mul(self, qty: i64) -> Self {
        Self(self.0.saturating_mul(qty))
    }
}

impl core::iter::Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.amount_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_string_has_two_decimals() {
        assert_eq!(Price::from_cents(6000).amount_string(), "60.00");
        assert_eq!(Price::from_cents(12550).amount_string(), "125.50");
        assert_eq!(Price::from_cents(5).amount_string(), "0.05");
        assert_eq!(Price::ZERO.amount_string(), "0.00");
    }

    #[test]
    fn display_rands_rounds_half_up() {
        assert_eq!(Price::from_cents(6000).display_rands(), "R60");
        assert_eq!(Price::from_cents(6050).display_rands(), "R61");
        assert_eq!(Price::from_cents(6049).display_rands(), "R60");
    }

    #[test]
    fn totals_stay_in_integer_cents() {
        // 3 items at R19.99 is exactly 5997 cents, no float drift.
        let total: Price = (0..3).map(|_| Price::from_cents(1999)).sum();
        assert_eq!(total.cents(), 5997);
        assert_eq!(total.amount_string(), "59.97");
    }

    #[test]
    fn multiplication_by_quantity() {
        assert_eq!((Price::from_cents(3000) * 2).cents(), 6000);
    }
}
