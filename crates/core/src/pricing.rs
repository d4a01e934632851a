//! Cart and order totals.
//!
//! ```text
//! subtotal = Σ unit_price × quantity
//! shipping = 0 if subtotal ≥ threshold, else flat fee   (online only)
//! tax      = round(taxable × tax_rate), half away from zero
//! total    = subtotal − discount + shipping + tax
//! ```
//!
//! `taxable` is `subtotal − discount`. Online carts never carry a discount.
//! Point-of-sale orders are picked up in store, so they carry no shipping.
//!
//! The same [`PricingPolicy`] prices the cart the client sees and the order
//! the server writes, so the two cannot disagree.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{Money, MoneyError};

/// Errors from pricing configuration or computation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("tax rate must be between 0 and 1, got {0}")]
    InvalidTaxRate(Decimal),
    #[error("discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { discount: Money, subtotal: Money },
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Configurable pricing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingPolicy {
    free_shipping_threshold: Money,
    flat_shipping_fee: Money,
    tax_rate: Decimal,
}

impl Default for PricingPolicy {
    /// $50.00 free-shipping threshold, $5.00 flat fee, 15% tax.
    fn default() -> Self {
        Self {
            free_shipping_threshold: Money::from_cents(5_000),
            flat_shipping_fee: Money::from_cents(500),
            tax_rate: Decimal::new(15, 2),
        }
    }
}

/// Computed totals for a cart or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct Totals {
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

impl PricingPolicy {
    /// Create a policy.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidTaxRate`] if `tax_rate` is outside
    /// `[0, 1]`.
    pub fn new(
        free_shipping_threshold: Money,
        flat_shipping_fee: Money,
        tax_rate: Decimal,
    ) -> Result<Self, PricingError> {
        if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE {
            return Err(PricingError::InvalidTaxRate(tax_rate));
        }

        Ok(Self {
            free_shipping_threshold,
            flat_shipping_fee,
            tax_rate,
        })
    }

    #[must_use]
    pub const fn free_shipping_threshold(&self) -> Money {
        self.free_shipping_threshold
    }

    #[must_use]
    pub const fn flat_shipping_fee(&self) -> Money {
        self.flat_shipping_fee
    }

    #[must_use]
    pub const fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    /// Sum of `unit_price × quantity` over all lines.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the sum does not fit.
    pub fn subtotal<I>(lines: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = (Money, u32)>,
    {
        lines.into_iter().try_fold(Money::ZERO, |acc, (price, qty)| {
            price
                .checked_mul(qty)
                .and_then(|line| acc.checked_add(line))
                .ok_or(MoneyError::Overflow)
        })
    }

    /// Shipping for an online order with this subtotal.
    ///
    /// An empty cart is below any positive threshold and is charged the flat
    /// fee; checkout refuses empty carts before this matters.
    #[must_use]
    pub fn shipping_for(&self, subtotal: Money) -> Money {
        if subtotal >= self.free_shipping_threshold {
            Money::ZERO
        } else {
            self.flat_shipping_fee
        }
    }

    /// Totals for an online cart: no discount, shipping applies.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::Money`] on overflow.
    pub fn quote_online<I>(&self, lines: I) -> Result<Totals, PricingError>
    where
        I: IntoIterator<Item = (Money, u32)>,
    {
        let subtotal = Self::subtotal(lines)?;
        self.finish(subtotal, Money::ZERO, self.shipping_for(subtotal))
    }

    /// Totals for an in-store sale: optional discount, no shipping.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::DiscountExceedsSubtotal`] if the discount is
    /// larger than the subtotal, or [`PricingError::Money`] on overflow.
    pub fn quote_pos<I>(&self, lines: I, discount: Money) -> Result<Totals, PricingError>
    where
        I: IntoIterator<Item = (Money, u32)>,
    {
        let subtotal = Self::subtotal(lines)?;
        self.finish(subtotal, discount, Money::ZERO)
    }

    fn finish(
        &self,
        subtotal: Money,
        discount: Money,
        shipping: Money,
    ) -> Result<Totals, PricingError> {
        let taxable = subtotal
            .checked_sub(discount)
            .ok_or(PricingError::DiscountExceedsSubtotal { discount, subtotal })?;
        let tax = taxable.apply_rate(self.tax_rate)?;
        let total = taxable
            .checked_add(shipping)
            .and_then(|t| t.checked_add(tax))
            .ok_or(MoneyError::Overflow)?;

        Ok(Totals {
            subtotal,
            discount,
            shipping,
            tax,
            total,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn m(cents: i64) -> Money {
        Money::from_cents(cents)
    }

    #[test]
    fn test_free_shipping_over_threshold() {
        let totals = PricingPolicy::default()
            .quote_online([(m(3000), 1), (m(2500), 1)])
            .unwrap();

        assert_eq!(totals.subtotal, m(5500));
        assert_eq!(totals.shipping, Money::ZERO);
        assert_eq!(totals.tax, m(825));
        assert_eq!(totals.total, m(6325));
        assert_eq!(totals.discount, Money::ZERO);
    }

    #[test]
    fn test_flat_fee_under_threshold() {
        let totals = PricingPolicy::default().quote_online([(m(1000), 2)]).unwrap();

        assert_eq!(totals.subtotal, m(2000));
        assert_eq!(totals.shipping, m(500));
        assert_eq!(totals.tax, m(300));
        assert_eq!(totals.total, m(2800));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let policy = PricingPolicy::default();
        assert_eq!(policy.shipping_for(m(5000)), Money::ZERO);
        assert_eq!(policy.shipping_for(m(4999)), m(500));
    }

    #[test]
    fn test_empty_cart() {
        let totals = PricingPolicy::default()
            .quote_online(std::iter::empty())
            .unwrap();
        assert_eq!(totals.subtotal, Money::ZERO);
        assert_eq!(totals.tax, Money::ZERO);
        assert_eq!(totals.shipping, m(500));
        assert_eq!(totals.total, m(500));
    }

    #[test]
    fn test_total_identity_holds_for_many_carts() {
        let policy = PricingPolicy::default();
        for price in [1_i64, 99, 333, 1999, 4999, 5000, 12_345] {
            for qty in 1..=4_u32 {
                let t = policy.quote_online([(m(price), qty)]).unwrap();
                assert_eq!(t.subtotal.cents(), price * i64::from(qty));
                assert_eq!(
                    t.total.cents(),
                    t.subtotal.cents() + t.shipping.cents() + t.tax.cents()
                );
                assert_eq!(t.shipping.is_zero(), t.subtotal >= m(5000));
            }
        }
    }

    #[test]
    fn test_pos_discount_reduces_taxable_and_skips_shipping() {
        let totals = PricingPolicy::default()
            .quote_pos([(m(2000), 1)], m(500))
            .unwrap();

        assert_eq!(totals.subtotal, m(2000));
        assert_eq!(totals.discount, m(500));
        assert_eq!(totals.shipping, Money::ZERO);
        assert_eq!(totals.tax, m(225));
        assert_eq!(totals.total, m(1725));
    }

    #[test]
    fn test_pos_discount_cannot_exceed_subtotal() {
        let err = PricingPolicy::default()
            .quote_pos([(m(1000), 1)], m(1001))
            .unwrap_err();
        assert!(matches!(err, PricingError::DiscountExceedsSubtotal { .. }));
    }

    #[test]
    fn test_policy_rejects_bad_rate() {
        assert!(PricingPolicy::new(m(5000), m(500), Decimal::new(-1, 2)).is_err());
        assert!(PricingPolicy::new(m(5000), m(500), Decimal::new(101, 2)).is_err());
        assert!(PricingPolicy::new(m(5000), m(500), Decimal::ONE).is_ok());
    }

    #[test]
    fn test_custom_policy() {
        let policy = PricingPolicy::new(m(10_000), m(799), Decimal::ZERO).unwrap();
        let totals = policy.quote_online([(m(6000), 1)]).unwrap();
        assert_eq!(totals.shipping, m(799));
        assert_eq!(totals.tax, Money::ZERO);
        assert_eq!(totals.total, m(6799));
    }

    #[test]
    fn test_subtotal_overflow() {
        let err = PricingPolicy::subtotal([(m(i64::MAX), 2)]).unwrap_err();
        assert_eq!(err, MoneyError::Overflow);
    }

    #[test]
    fn test_totals_serialize_as_strings() {
        let totals = PricingPolicy::default().quote_online([(m(1000), 2)]).unwrap();
        let json = serde_json::to_value(totals).unwrap();
        assert_eq!(json["total"], "28.00");
        assert_eq!(json["shipping"], "5.00");
    }
}
