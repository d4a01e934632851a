//! Order domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kitshop_core::{
    Money, OrderChannel, OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId, Size,
    Totals, UserId,
};

use super::Product;

/// Where an online order is shipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingDetails {
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
}

/// An order header.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    /// Submitter: the customer online, the cashier at the point of sale.
    pub placed_by: Option<UserId>,
    /// Customer the order belongs to.
    pub customer_id: Option<UserId>,
    pub channel: OrderChannel,
    pub status: OrderStatus,
    #[serde(flatten)]
    pub totals: Totals,
    pub payment_method: PaymentMethod,
    pub shipping: Option<ShippingDetails>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether `user` may see this order without being staff.
    #[must_use]
    pub fn belongs_to(&self, user: UserId) -> bool {
        self.customer_id == Some(user)
    }
}

/// A line of an order, with name and price captured at checkout.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub size: Size,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

/// Dashboard figures.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    /// One entry per status, zero counts included.
    pub orders_by_status: Vec<StatusCount>,
    /// Sum of totals of paid, shipped and delivered orders.
    pub revenue: Money,
    pub active_products: i64,
    pub low_stock: Vec<Product>,
}
