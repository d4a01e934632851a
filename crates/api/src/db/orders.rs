//! Order repository for database operations.
//!
//! Reads go through [`OrderRepository`]. Writes only happen inside the
//! checkout and status transactions, so they are exposed as functions over
//! a `PgConnection`.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use kitshop_core::{
    Money, OrderChannel, OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId, Size,
    Totals, UserId,
};

use super::{RepositoryError, conflict_on_unique, to_count};
use crate::models::order::{Order, OrderItem, OrderWithItems, ShippingDetails, StatusCount};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    placed_by: Option<UserId>,
    customer_id: Option<UserId>,
    channel: OrderChannel,
    status: OrderStatus,
    subtotal_cents: i64,
    discount_cents: i64,
    shipping_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    payment_method: PaymentMethod,
    ship_name: Option<String>,
    ship_address: Option<String>,
    ship_city: Option<String>,
    ship_postal_code: Option<String>,
    ship_phone: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn money(cents: i64, column: &str) -> Result<Money, RepositoryError> {
    if cents < 0 {
        return Err(RepositoryError::DataCorruption(format!(
            "negative {column}: {cents}"
        )));
    }
    Ok(Money::from_cents(cents))
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let totals = Totals {
            subtotal: money(row.subtotal_cents, "subtotal")?,
            discount: money(row.discount_cents, "discount")?,
            shipping: money(row.shipping_cents, "shipping")?,
            tax: money(row.tax_cents, "tax")?,
            total: money(row.total_cents, "total")?,
        };

        let shipping = match (row.ship_name, row.ship_address, row.ship_city) {
            (Some(full_name), Some(address), Some(city)) => Some(ShippingDetails {
                full_name,
                address,
                city,
                postal_code: row.ship_postal_code,
                phone: row.ship_phone,
            }),
            _ => None,
        };

        Ok(Self {
            id: row.id,
            placed_by: row.placed_by,
            customer_id: row.customer_id,
            channel: row.channel,
            status: row.status,
            totals,
            payment_method: row.payment_method,
            shipping,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    product_id: ProductId,
    product_name: String,
    size: Size,
    unit_price_cents: i64,
    quantity: i32,
    line_total_cents: i64,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            size: row.size,
            unit_price: money(row.unit_price_cents, "unit price")?,
            quantity: to_count(row.quantity, "quantity")?,
            line_total: money(row.line_total_cents, "line total")?,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
    rows.into_iter().map(Order::try_from).collect()
}

const ORDER_COLUMNS: &str = r"
    id, placed_by, customer_id, channel, status,
    subtotal_cents, discount_cents, shipping_cents, tax_cents, total_cents,
    payment_method, ship_name, ship_address, ship_city, ship_postal_code, ship_phone,
    notes, created_at, updated_at
";

// =============================================================================
// Insert Types
// =============================================================================

/// Header of an order about to be written.
#[derive(Debug)]
pub struct NewOrder<'a> {
    pub placed_by: UserId,
    pub customer_id: Option<UserId>,
    pub channel: OrderChannel,
    pub status: OrderStatus,
    pub totals: Totals,
    pub payment_method: PaymentMethod,
    pub shipping: Option<&'a ShippingDetails>,
    pub notes: Option<&'a str>,
    pub idempotency_key: Option<&'a str>,
}

/// An order line about to be written.
#[derive(Debug)]
pub struct NewOrderItem<'a> {
    pub product_id: ProductId,
    pub product_name: &'a str,
    pub size: Size,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order reads.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an order header by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    /// Get an order with its items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_with_items(
        &self,
        id: OrderId,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let Some(order) = self.get(id).await? else {
            return Ok(None);
        };
        let mut conn = self.pool.acquire().await?;
        let items = items(&mut *conn, id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    /// Orders belonging to a customer, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_customer(
        &self,
        customer_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM shop.order
            WHERE customer_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(customer_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        into_orders(rows)
    }

    /// All orders, optionally filtered by status, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM shop.order
            WHERE ($1::shop.order_status IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        into_orders(rows)
    }

    /// The order a user already submitted under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_idempotency_key(
        &self,
        placed_by: UserId,
        key: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let id = {
            let mut conn = self.pool.acquire().await?;
            order_for_key(&mut conn, placed_by, key).await?
        };
        match id {
            Some(id) => self.get_with_items(id).await,
            None => Ok(None),
        }
    }

    /// Order counts for every status, zero counts included.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn status_counts(&self) -> Result<Vec<StatusCount>, RepositoryError> {
        let rows: Vec<(OrderStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM shop.order GROUP BY status")
                .fetch_all(self.pool)
                .await?;

        Ok(OrderStatus::ALL
            .iter()
            .map(|&status| StatusCount {
                status,
                count: rows
                    .iter()
                    .find(|(s, _)| *s == status)
                    .map_or(0, |(_, count)| *count),
            })
            .collect())
    }

    /// Sum of totals of settled orders (paid, shipped, delivered).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn revenue(&self) -> Result<Money, RepositoryError> {
        let cents: i64 = sqlx::query_scalar(
            r"
            SELECT COALESCE(SUM(total_cents), 0)::BIGINT
            FROM shop.order
            WHERE status IN ('paid', 'shipped', 'delivered')
            ",
        )
        .fetch_one(self.pool)
        .await?;

        money(cents, "revenue")
    }
}

// =============================================================================
// Transaction helpers
// =============================================================================

/// Insert an order header.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the idempotency key was already used
/// by the same user.
/// Returns `RepositoryError::Database` for other database errors.
pub async fn insert_order(
    conn: &mut PgConnection,
    order: &NewOrder<'_>,
) -> Result<Order, RepositoryError> {
    let shipping = order.shipping;
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        INSERT INTO shop.order (
            placed_by, customer_id, channel, status,
            subtotal_cents, discount_cents, shipping_cents, tax_cents, total_cents,
            payment_method, ship_name, ship_address, ship_city, ship_postal_code,
            ship_phone, notes, idempotency_key
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(order.placed_by)
    .bind(order.customer_id)
    .bind(order.channel)
    .bind(order.status)
    .bind(order.totals.subtotal.cents())
    .bind(order.totals.discount.cents())
    .bind(order.totals.shipping.cents())
    .bind(order.totals.tax.cents())
    .bind(order.totals.total.cents())
    .bind(order.payment_method)
    .bind(shipping.map(|s| s.full_name.as_str()))
    .bind(shipping.map(|s| s.address.as_str()))
    .bind(shipping.map(|s| s.city.as_str()))
    .bind(shipping.and_then(|s| s.postal_code.as_deref()))
    .bind(shipping.and_then(|s| s.phone.as_deref()))
    .bind(order.notes)
    .bind(order.idempotency_key)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| conflict_on_unique(e, "idempotency key already used"))?;

    row.try_into()
}

/// Insert one order line.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn insert_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    item: &NewOrderItem<'_>,
) -> Result<OrderItem, RepositoryError> {
    let quantity = i32::try_from(item.quantity)
        .map_err(|_| RepositoryError::Conflict("quantity too large".to_owned()))?;

    let row = sqlx::query_as::<_, OrderItemRow>(
        r"
        INSERT INTO shop.order_item
            (order_id, product_id, product_name, size, unit_price_cents, quantity, line_total_cents)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, product_id, product_name, size, unit_price_cents, quantity, line_total_cents
        ",
    )
    .bind(order_id)
    .bind(item.product_id)
    .bind(item.product_name)
    .bind(item.size)
    .bind(item.unit_price.cents())
    .bind(quantity)
    .bind(item.line_total.cents())
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

/// Items of an order, in insertion order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn items(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Vec<OrderItem>, RepositoryError> {
    let rows = sqlx::query_as::<_, OrderItemRow>(
        r"
        SELECT id, product_id, product_name, size, unit_price_cents, quantity, line_total_cents
        FROM shop.order_item
        WHERE order_id = $1
        ORDER BY id
        ",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(OrderItem::try_from).collect()
}

/// ID of the order `placed_by` created with idempotency key `key`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn order_for_key(
    conn: &mut PgConnection,
    placed_by: UserId,
    key: &str,
) -> Result<Option<OrderId>, RepositoryError> {
    let id = sqlx::query_scalar(
        "SELECT id FROM shop.order WHERE placed_by = $1 AND idempotency_key = $2",
    )
    .bind(placed_by)
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

/// Lock an order row for a status change.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock(conn: &mut PgConnection, id: OrderId) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM shop.order WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Order::try_from).transpose()
}

/// Write a new status.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order does not exist.
/// Returns `RepositoryError::Database` for other database errors.
pub async fn set_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: OrderStatus,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        UPDATE shop.order
        SET status = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(id)
    .bind(status)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(RepositoryError::NotFound)?;

    row.try_into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> OrderRow {
        OrderRow {
            id: OrderId::new(1),
            placed_by: Some(UserId::new(2)),
            customer_id: Some(UserId::new(2)),
            channel: OrderChannel::Online,
            status: OrderStatus::Pending,
            subtotal_cents: 5_500,
            discount_cents: 0,
            shipping_cents: 0,
            tax_cents: 825,
            total_cents: 6_325,
            payment_method: PaymentMethod::Card,
            ship_name: Some("Lionel Messi".to_string()),
            ship_address: Some("Avinguda Diagonal 1".to_string()),
            ship_city: Some("Barcelona".to_string()),
            ship_postal_code: None,
            ship_phone: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_order_row_conversion() {
        let order = Order::try_from(row()).ok();
        let order = order.as_ref();
        assert_eq!(order.map(|o| o.totals.total), Some(Money::from_cents(6_325)));
        assert_eq!(
            order.and_then(|o| o.shipping.as_ref()).map(|s| s.city.as_str()),
            Some("Barcelona")
        );
    }

    #[test]
    fn test_pos_row_has_no_shipping() {
        let mut pos = row();
        pos.channel = OrderChannel::Pos;
        pos.ship_name = None;
        pos.ship_address = None;
        pos.ship_city = None;
        let order = Order::try_from(pos).ok();
        assert!(order.is_some_and(|o| o.shipping.is_none()));
    }

    #[test]
    fn test_negative_amount_is_corruption() {
        let mut bad = row();
        bad.tax_cents = -1;
        assert!(matches!(
            Order::try_from(bad),
            Err(RepositoryError::DataCorruption(_))
        ));
    }
}
