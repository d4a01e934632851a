//! Stock-aware cart lines.
//!
//! A cart is a list of lines keyed by `(product, size)`. Stock is tracked per
//! product, so the quantity a line may hold is the product's stock minus what
//! the same product already takes up in other sizes.
//!
//! Invariants kept by every operation here:
//! - no line has a quantity below 1
//! - per product, the sum of line quantities never exceeds stock
//!
//! Requests that would break the second invariant are clamped rather than
//! rejected, and the caller is told about it through [`QuantityChange`] or a
//! [`CartAdjustment`].

use serde::Serialize;

use crate::types::{ProductId, Size};

/// Errors from cart operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("product {0} is out of stock")]
    OutOfStock(ProductId),
    #[error("product {product_id} in size {size} is not in the cart")]
    LineNotFound { product_id: ProductId, size: Size },
}

/// One line of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub size: Size,
    pub quantity: u32,
}

/// Outcome of a quantity request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QuantityChange {
    /// The requested quantity was stored as-is.
    Applied { quantity: u32 },
    /// The request was clamped to what stock allows.
    Clamped { requested: u32, quantity: u32 },
}

impl QuantityChange {
    #[must_use]
    pub const fn quantity(self) -> u32 {
        match self {
            Self::Applied { quantity } | Self::Clamped { quantity, .. } => quantity,
        }
    }

    #[must_use]
    pub const fn was_clamped(self) -> bool {
        matches!(self, Self::Clamped { .. })
    }

    fn resolve(requested: u32, available: u32) -> Self {
        let quantity = requested.clamp(1, available.max(1));
        if quantity == requested {
            Self::Applied { quantity }
        } else {
            Self::Clamped {
                requested,
                quantity,
            }
        }
    }
}

/// Current sellable state of a product, as seen by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub active: bool,
    pub stock: u32,
}

/// Why reconciliation removed a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// The product no longer exists or was deactivated.
    Unavailable,
    /// No stock left for this line.
    SoldOut,
}

/// A change reconciliation applied to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjustmentKind {
    Removed { reason: RemovalReason },
    Clamped { from: u32, to: u32 },
}

/// A line the server changed instead of keeping what the client had.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartAdjustment {
    pub product_id: ProductId,
    pub size: Size,
    #[serde(flatten)]
    pub kind: AdjustmentKind,
}

/// An in-memory cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a cart from stored lines, in the order given.
    ///
    /// Lines are taken as-is; call [`Cart::reconcile`] to bring them in line
    /// with current stock.
    #[must_use]
    pub const fn from_lines(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn into_lines(self) -> Vec<CartLine> {
        self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn line(&self, product_id: ProductId, size: Size) -> Option<&CartLine> {
        self.lines
            .iter()
            .find(|l| l.product_id == product_id && l.size == size)
    }

    /// Total quantity of a product across all sizes.
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.lines
            .iter()
            .filter(|l| l.product_id == product_id)
            .map(|l| l.quantity)
            .sum()
    }

    /// How many units the `(product, size)` line may hold given `stock`.
    #[must_use]
    pub fn available_for(&self, product_id: ProductId, size: Size, stock: u32) -> u32 {
        let elsewhere: u32 = self
            .lines
            .iter()
            .filter(|l| l.product_id == product_id && l.size != size)
            .map(|l| l.quantity)
            .sum();
        stock.saturating_sub(elsewhere)
    }

    /// Add `quantity` units, merging into an existing line of the same size.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] for zero and
    /// [`CartError::OutOfStock`] when not a single further unit fits.
    pub fn add(
        &mut self,
        product_id: ProductId,
        size: Size,
        quantity: u32,
        stock: u32,
    ) -> Result<QuantityChange, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        let available = self.available_for(product_id, size, stock);
        let current = self.line(product_id, size).map_or(0, |l| l.quantity);
        if available <= current {
            return Err(CartError::OutOfStock(product_id));
        }

        let requested = current.saturating_add(quantity);
        let change = QuantityChange::resolve(requested, available);
        self.upsert(product_id, size, change.quantity());
        Ok(change)
    }

    /// Set the quantity of an existing line, clamped to `[1, available]`.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] if the line does not exist,
    /// [`CartError::InvalidQuantity`] for zero (remove the line instead) and
    /// [`CartError::OutOfStock`] if stock no longer covers even one unit.
    pub fn set_quantity(
        &mut self,
        product_id: ProductId,
        size: Size,
        quantity: u32,
        stock: u32,
    ) -> Result<QuantityChange, CartError> {
        if self.line(product_id, size).is_none() {
            return Err(CartError::LineNotFound { product_id, size });
        }
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        let available = self.available_for(product_id, size, stock);
        if available == 0 {
            return Err(CartError::OutOfStock(product_id));
        }

        let change = QuantityChange::resolve(quantity, available);
        self.upsert(product_id, size, change.quantity());
        Ok(change)
    }

    /// Remove a line. Returns whether it existed.
    pub fn remove(&mut self, product_id: ProductId, size: Size) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|l| !(l.product_id == product_id && l.size == size));
        self.lines.len() != before
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Re-check every line against current product state.
    ///
    /// Lines of missing or inactive products are dropped. Stock is handed
    /// out to a product's lines in cart order; lines that get nothing are
    /// dropped and lines that get less than they hold are clamped.
    pub fn reconcile<F>(&mut self, mut lookup: F) -> Vec<CartAdjustment>
    where
        F: FnMut(ProductId) -> Option<Availability>,
    {
        let mut adjustments = Vec::new();
        let mut kept: Vec<CartLine> = Vec::with_capacity(self.lines.len());

        for line in self.lines.drain(..) {
            let removed = |reason| CartAdjustment {
                product_id: line.product_id,
                size: line.size,
                kind: AdjustmentKind::Removed { reason },
            };

            let Some(availability) = lookup(line.product_id).filter(|a| a.active) else {
                adjustments.push(removed(RemovalReason::Unavailable));
                continue;
            };

            let used: u32 = kept
                .iter()
                .filter(|k| k.product_id == line.product_id)
                .map(|k| k.quantity)
                .sum();
            let remaining = availability.stock.saturating_sub(used);

            if remaining == 0 {
                adjustments.push(removed(RemovalReason::SoldOut));
                continue;
            }

            if line.quantity > remaining {
                adjustments.push(CartAdjustment {
                    product_id: line.product_id,
                    size: line.size,
                    kind: AdjustmentKind::Clamped {
                        from: line.quantity,
                        to: remaining,
                    },
                });
                kept.push(CartLine {
                    quantity: remaining,
                    ..line
                });
            } else {
                kept.push(line);
            }
        }

        self.lines = kept;
        adjustments
    }

    fn upsert(&mut self, product_id: ProductId, size: Size, quantity: u32) {
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id && l.size == size)
        {
            line.quantity = quantity;
        } else {
            self.lines.push(CartLine {
                product_id,
                size,
                quantity,
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SHIRT: ProductId = ProductId::new(1);
    const SCARF: ProductId = ProductId::new(2);

    fn assert_invariants(cart: &Cart, stock: &HashMap<ProductId, u32>) {
        for line in cart.lines() {
            assert!(line.quantity >= 1);
        }
        for (id, s) in stock {
            assert!(cart.quantity_of(*id) <= *s);
        }
    }

    #[test]
    fn test_add_new_line() {
        let mut cart = Cart::new();
        let change = cart.add(SHIRT, Size::M, 2, 10).unwrap();
        assert_eq!(change, QuantityChange::Applied { quantity: 2 });
        assert_eq!(cart.line(SHIRT, Size::M).unwrap().quantity, 2);
    }

    #[test]
    fn test_add_merges_same_size() {
        let mut cart = Cart::new();
        cart.add(SHIRT, Size::M, 2, 10).unwrap();
        cart.add(SHIRT, Size::M, 3, 10).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of(SHIRT), 5);
    }

    #[test]
    fn test_add_other_size_is_separate_line() {
        let mut cart = Cart::new();
        cart.add(SHIRT, Size::M, 1, 10).unwrap();
        cart.add(SHIRT, Size::L, 1, 10).unwrap();
        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.quantity_of(SHIRT), 2);
    }

    #[test]
    fn test_add_clamps_to_stock() {
        let mut cart = Cart::new();
        let change = cart.add(SHIRT, Size::S, 7, 4).unwrap();
        assert_eq!(
            change,
            QuantityChange::Clamped {
                requested: 7,
                quantity: 4
            }
        );
        assert!(change.was_clamped());
    }

    #[test]
    fn test_add_out_of_stock() {
        let mut cart = Cart::new();
        assert_eq!(
            cart.add(SHIRT, Size::M, 1, 0),
            Err(CartError::OutOfStock(SHIRT))
        );
        assert!(cart.is_empty());

        cart.add(SHIRT, Size::M, 3, 3).unwrap();
        assert_eq!(
            cart.add(SHIRT, Size::L, 1, 3),
            Err(CartError::OutOfStock(SHIRT))
        );
        assert_eq!(
            cart.add(SHIRT, Size::M, 1, 3),
            Err(CartError::OutOfStock(SHIRT))
        );
    }

    #[test]
    fn test_add_zero_rejected() {
        let mut cart = Cart::new();
        assert_eq!(
            cart.add(SHIRT, Size::M, 0, 5),
            Err(CartError::InvalidQuantity)
        );
    }

    #[test]
    fn test_set_quantity_counts_other_sizes() {
        let mut cart = Cart::new();
        cart.add(SHIRT, Size::M, 3, 5).unwrap();
        cart.add(SHIRT, Size::L, 1, 5).unwrap();

        let change = cart.set_quantity(SHIRT, Size::L, 4, 5).unwrap();
        assert_eq!(
            change,
            QuantityChange::Clamped {
                requested: 4,
                quantity: 2
            }
        );
        assert_eq!(cart.quantity_of(SHIRT), 5);
    }

    #[test]
    fn test_set_quantity_applied_and_missing_line() {
        let mut cart = Cart::new();
        cart.add(SCARF, Size::OneSize, 1, 9).unwrap();
        assert_eq!(
            cart.set_quantity(SCARF, Size::OneSize, 6, 9).unwrap(),
            QuantityChange::Applied { quantity: 6 }
        );
        assert_eq!(
            cart.set_quantity(SCARF, Size::M, 1, 9),
            Err(CartError::LineNotFound {
                product_id: SCARF,
                size: Size::M
            })
        );
        assert_eq!(
            cart.set_quantity(SCARF, Size::OneSize, 0, 9),
            Err(CartError::InvalidQuantity)
        );
    }

    #[test]
    fn test_set_quantity_never_breaks_invariants() {
        let stock = HashMap::from([(SHIRT, 6_u32)]);
        let mut cart = Cart::new();
        cart.add(SHIRT, Size::M, 1, 6).unwrap();
        cart.add(SHIRT, Size::Xl, 1, 6).unwrap();

        for requested in [1_u32, 2, 5, 6, 7, 100, u32::MAX] {
            for size in [Size::M, Size::Xl] {
                let change = cart.set_quantity(SHIRT, size, requested, 6).unwrap();
                assert!(change.quantity() >= 1);
                assert_invariants(&cart, &stock);
            }
        }
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = Cart::new();
        cart.add(SHIRT, Size::M, 1, 5).unwrap();
        cart.add(SCARF, Size::OneSize, 1, 5).unwrap();
        assert!(cart.remove(SHIRT, Size::M));
        assert!(!cart.remove(SHIRT, Size::M));
        assert_eq!(cart.lines().len(), 1);
        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_reconcile_drops_and_clamps() {
        let mut cart = Cart::from_lines(vec![
            CartLine {
                product_id: SHIRT,
                size: Size::M,
                quantity: 3,
            },
            CartLine {
                product_id: SHIRT,
                size: Size::L,
                quantity: 2,
            },
            CartLine {
                product_id: SCARF,
                size: Size::OneSize,
                quantity: 1,
            },
            CartLine {
                product_id: ProductId::new(99),
                size: Size::S,
                quantity: 1,
            },
        ]);

        let products = HashMap::from([
            (
                SHIRT,
                Availability {
                    active: true,
                    stock: 4,
                },
            ),
            (
                SCARF,
                Availability {
                    active: false,
                    stock: 10,
                },
            ),
        ]);

        let adjustments = cart.reconcile(|id| products.get(&id).copied());

        assert_eq!(
            cart.lines(),
            &[
                CartLine {
                    product_id: SHIRT,
                    size: Size::M,
                    quantity: 3
                },
                CartLine {
                    product_id: SHIRT,
                    size: Size::L,
                    quantity: 1
                },
            ]
        );
        assert_eq!(adjustments.len(), 3);
        assert_eq!(
            adjustments[0].kind,
            AdjustmentKind::Clamped { from: 2, to: 1 }
        );
        assert_eq!(
            adjustments[1].kind,
            AdjustmentKind::Removed {
                reason: RemovalReason::Unavailable
            }
        );
        assert_eq!(adjustments[2].product_id, ProductId::new(99));
    }

    #[test]
    fn test_reconcile_sold_out() {
        let mut cart = Cart::from_lines(vec![CartLine {
            product_id: SHIRT,
            size: Size::M,
            quantity: 2,
        }]);
        let adjustments = cart.reconcile(|_| {
            Some(Availability {
                active: true,
                stock: 0,
            })
        });
        assert!(cart.is_empty());
        assert_eq!(
            adjustments[0].kind,
            AdjustmentKind::Removed {
                reason: RemovalReason::SoldOut
            }
        );
    }

    #[test]
    fn test_reconcile_untouched_cart_reports_nothing() {
        let mut cart = Cart::new();
        cart.add(SHIRT, Size::M, 2, 5).unwrap();
        let before = cart.clone();
        let adjustments = cart.reconcile(|_| {
            Some(Availability {
                active: true,
                stock: 5,
            })
        });
        assert!(adjustments.is_empty());
        assert_eq!(cart, before);
    }

    #[test]
    fn test_adjustment_json_shape() {
        let adj = CartAdjustment {
            product_id: SHIRT,
            size: Size::L,
            kind: AdjustmentKind::Clamped { from: 3, to: 1 },
        };
        let json = serde_json::to_value(adj).unwrap();
        assert_eq!(json["kind"], "clamped");
        assert_eq!(json["product_id"], 1);
        assert_eq!(json["size"], "L");
        assert_eq!(json["to"], 1);
    }
}
