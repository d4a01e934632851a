//! Cart views returned by the cart endpoints.

use serde::Serialize;

use kitshop_core::{CartAdjustment, Money, ProductId, QuantityChange, Size, Totals};

/// One priced cart line.
#[derive(Debug, Clone, Serialize)]
pub struct CartItemView {
    pub product_id: ProductId,
    pub name: String,
    pub size: Size,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
    pub image_url: Option<String>,
    /// Units this line could hold right now.
    pub max_quantity: u32,
}

/// A reconciled, priced cart.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub item_count: u32,
    #[serde(flatten)]
    pub totals: Totals,
    /// Changes the server made to the stored or submitted lines.
    pub adjustments: Vec<CartAdjustment>,
}

/// Result of adding to or updating a cart line.
#[derive(Debug, Clone, Serialize)]
pub struct CartUpdate {
    pub change: QuantityChange,
    pub cart: CartView,
}
