//! Money stored as integer cents.
//!
//! Amounts never pass through floating point. Storage and arithmetic use
//! whole cents (`i64`); [`Decimal`] is only used at the edges (JSON, config,
//! percentage rates) where exact base-10 values are needed.
//!
//! On the wire an amount is a decimal string with two places (`"55.00"`).
//! Deserialization also accepts JSON numbers, but rejects anything with more
//! than two decimal places or a negative sign.

use core::fmt;
use core::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors produced when building or computing [`Money`] values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount cannot be negative")]
    Negative,
    #[error("amount has more than two decimal places")]
    TooPrecise,
    #[error("amount is out of range")]
    Overflow,
    #[error("invalid amount: {0}")]
    Parse(String),
}

/// A non-negative amount of the store currency, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Build from a whole number of cents.
    ///
    /// Negative inputs are clamped to zero; amounts in this store are never
    /// negative.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        if cents < 0 { Self(0) } else { Self(cents) }
    }

    /// The amount in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Build from a decimal amount in currency units (e.g. `49.99`).
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] for negative values,
    /// [`MoneyError::TooPrecise`] if the value has sub-cent digits and
    /// [`MoneyError::Overflow`] if it does not fit in `i64` cents.
    pub fn from_decimal(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }

        let cents = amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(MoneyError::Overflow)?;
        if cents.fract() != Decimal::ZERO {
            return Err(MoneyError::TooPrecise);
        }

        cents.to_i64().map(Self).ok_or(MoneyError::Overflow)
    }

    /// The amount in currency units with exactly two decimal places.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Subtract, returning `None` if the result would be negative.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0
            .checked_sub(other.0)
            .filter(|cents| *cents >= 0)
            .map(Self)
    }

    /// Multiply by a quantity (line totals).
    #[must_use]
    pub fn checked_mul(self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(i64::from(quantity)).map(Self)
    }

    /// Multiply by a rate and round to the cent, half away from zero.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] for a negative rate and
    /// [`MoneyError::Overflow`] if the product does not fit.
    pub fn apply_rate(self, rate: Decimal) -> Result<Self, MoneyError> {
        if rate.is_sign_negative() && !rate.is_zero() {
            return Err(MoneyError::Negative);
        }

        Decimal::from(self.0)
            .checked_mul(rate)
            .ok_or(MoneyError::Overflow)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.to_decimal())
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s.trim()).map_err(|e| MoneyError::Parse(e.to_string()))?;
        Self::from_decimal(amount)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.to_decimal(), serializer)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = <Decimal as Deserialize>::deserialize(deserializer)?;
        Self::from_decimal(amount).map_err(serde::de::Error::custom)
    }
}

impl core::iter::Sum for Money {
    /// Saturates at `i64::MAX` cents; callers that must detect overflow use
    /// [`Money::checked_add`].
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.fold(0_i64, |acc, m| acc.saturating_add(m.0)))
    }
}
