//! Order placement and lifecycle.
//!
//! Every write here runs in a single transaction: product rows are locked in
//! ID order, stock is verified against the locked rows, and the order, its
//! items and the stock changes commit together or not at all. Concurrent
//! checkouts of the same product serialize on the row lock, so the later one
//! sees the reduced stock. Online checkouts of one user also serialize on
//! the account row, so a double submit cannot place the same cart twice.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::instrument;

use kitshop_core::{
    CartLine, Money, OrderChannel, OrderId, OrderStatus, PaymentMethod, PricingError,
    PricingPolicy, ProductId, Size, Totals, UserId,
};

use crate::db::orders::{self, NewOrder, NewOrderItem};
use crate::db::{OrderRepository, RepositoryError, UserRepository, carts, products, users};
use crate::models::{CurrentUser, OrderWithItems, Product, ShippingDetails};

/// Errors from checkout and order status changes.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("product {0} is not available")]
    ProductUnavailable(ProductId),

    #[error("insufficient stock for {name}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        name: String,
        requested: u32,
        available: u32,
    },

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("customer {0} not found")]
    CustomerNotFound(UserId),

    #[error("not allowed to change this order")]
    Forbidden,

    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for CheckoutError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// Online checkout input. Items come from the stored cart.
#[derive(Debug, Clone, Deserialize)]
pub struct OnlineCheckout {
    pub shipping: ShippingDetails,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

/// One line of an in-store sale.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SaleItem {
    pub product_id: ProductId,
    #[serde(default)]
    pub size: Size,
    pub quantity: u32,
}

/// In-store sale input.
#[derive(Debug, Clone, Deserialize)]
pub struct PosSale {
    pub items: Vec<SaleItem>,
    pub payment_method: PaymentMethod,
    pub discount: Option<Money>,
    pub customer_id: Option<UserId>,
    pub notes: Option<String>,
}

/// A placed order and whether it was an idempotent replay.
#[derive(Debug)]
pub struct Placed {
    pub order: OrderWithItems,
    pub replayed: bool,
}

/// Everything about an order except its lines.
struct Draft<'a> {
    placed_by: UserId,
    customer_id: Option<UserId>,
    channel: OrderChannel,
    status: OrderStatus,
    discount: Money,
    payment_method: PaymentMethod,
    shipping: Option<&'a ShippingDetails>,
    notes: Option<&'a str>,
    idempotency_key: Option<&'a str>,
}

/// Checkout service.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    pricing: &'a PricingPolicy,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, pricing: &'a PricingPolicy) -> Self {
        Self { pool, pricing }
    }

    /// Turn the user's stored cart into a pending online order.
    ///
    /// Checkouts of one user run one at a time under the account row lock,
    /// and the cart is read only after it is taken. A second submit of the
    /// same cart therefore finds it empty, and a repeated idempotency key
    /// returns the order the first request created.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` for an empty cart,
    /// `CheckoutError::InsufficientStock` or `CheckoutError::ProductUnavailable`
    /// when stock changed since the cart was filled.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn place_online(
        &self,
        user_id: UserId,
        input: &OnlineCheckout,
        idempotency_key: Option<&str>,
    ) -> Result<Placed, CheckoutError> {
        validate_shipping(&input.shipping)?;

        let mut tx = self.pool.begin().await?;
        if !users::lock_for_checkout(&mut tx, user_id).await? {
            return Err(RepositoryError::NotFound.into());
        }

        let already_placed = match idempotency_key {
            Some(key) => orders::order_for_key(&mut tx, user_id, key).await?.is_some(),
            None => false,
        };
        if already_placed {
            tx.rollback().await?;
            return self
                .replay(user_id, idempotency_key)
                .await?
                .ok_or_else(|| CheckoutError::InvalidOrder("idempotent order vanished".to_owned()));
        }

        let lines = carts::lines(&mut tx, user_id).await?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let draft = Draft {
            placed_by: user_id,
            customer_id: Some(user_id),
            channel: OrderChannel::Online,
            status: OrderStatus::Pending,
            discount: Money::ZERO,
            payment_method: input.payment_method,
            shipping: Some(&input.shipping),
            notes: non_blank(input.notes.as_deref()),
            idempotency_key,
        };

        let order = self.write_order(&mut tx, &draft, &lines).await?;

        carts::clear(&mut tx, user_id).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.order.id,
            total = %order.order.totals.total,
            items = order.items.len(),
            "online order placed"
        );
        Ok(Placed {
            order,
            replayed: false,
        })
    }

    /// Record an in-store sale. Stock leaves immediately and the order is
    /// created as delivered.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidOrder` for empty or zero-quantity items,
    /// `CheckoutError::CustomerNotFound` for an unknown customer reference,
    /// `CheckoutError::Pricing` if the discount exceeds the subtotal, and
    /// the stock errors of [`Self::place_online`].
    #[instrument(skip(self, sale), fields(cashier_id = %cashier))]
    pub async fn place_pos(
        &self,
        cashier: UserId,
        sale: &PosSale,
    ) -> Result<OrderWithItems, CheckoutError> {
        let lines = sale_lines(&sale.items)?;

        if let Some(customer_id) = sale.customer_id {
            UserRepository::new(self.pool)
                .get_by_id(customer_id)
                .await?
                .ok_or(CheckoutError::CustomerNotFound(customer_id))?;
        }

        let draft = Draft {
            placed_by: cashier,
            customer_id: sale.customer_id,
            channel: OrderChannel::Pos,
            status: OrderStatus::Delivered,
            discount: sale.discount.unwrap_or(Money::ZERO),
            payment_method: sale.payment_method,
            shipping: None,
            notes: non_blank(sale.notes.as_deref()),
            idempotency_key: None,
        };

        let mut tx = self.pool.begin().await?;
        let order = self.write_order(&mut tx, &draft, &lines).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.order.id,
            total = %order.order.totals.total,
            "point of sale order recorded"
        );
        Ok(order)
    }

    /// Move an order to `next`.
    ///
    /// Staff may apply any valid transition. Customers may only cancel their
    /// own pending orders. Cancelling returns every item to stock in the same
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` if the order does not exist or
    /// is not visible to `actor`, `CheckoutError::Forbidden` for a customer
    /// attempting anything but cancelling a pending order, and
    /// `CheckoutError::InvalidTransition` for transitions the lifecycle does
    /// not allow.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn transition(
        &self,
        actor: &CurrentUser,
        order_id: OrderId,
        next: OrderStatus,
    ) -> Result<OrderWithItems, CheckoutError> {
        let mut tx = self.pool.begin().await?;

        let order = orders::lock(&mut tx, order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        if !actor.is_staff() {
            if !order.belongs_to(actor.id) {
                return Err(CheckoutError::OrderNotFound(order_id));
            }
            if next != OrderStatus::Cancelled || order.status != OrderStatus::Pending {
                return Err(CheckoutError::Forbidden);
            }
        }

        if !order.status.can_transition_to(next) {
            return Err(CheckoutError::InvalidTransition {
                from: order.status,
                to: next,
            });
        }

        let items = orders::items(&mut tx, order_id).await?;
        if next == OrderStatus::Cancelled {
            for item in &items {
                products::restock(&mut tx, item.product_id, item.quantity).await?;
            }
        }

        let updated = orders::set_status(&mut tx, order_id, next).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            from = %order.status,
            to = %next,
            "order status changed"
        );
        Ok(OrderWithItems {
            order: updated,
            items,
        })
    }

    /// Cancel an order and restock its items.
    ///
    /// # Errors
    ///
    /// See [`Self::transition`].
    pub async fn cancel(
        &self,
        actor: &CurrentUser,
        order_id: OrderId,
    ) -> Result<OrderWithItems, CheckoutError> {
        self.transition(actor, order_id, OrderStatus::Cancelled).await
    }

    async fn replay(
        &self,
        user_id: UserId,
        key: Option<&str>,
    ) -> Result<Option<Placed>, CheckoutError> {
        let Some(key) = key else {
            return Ok(None);
        };
        let existing = OrderRepository::new(self.pool)
            .find_by_idempotency_key(user_id, key)
            .await?;

        if let Some(order) = &existing {
            tracing::info!(order_id = %order.order.id, "idempotent checkout replayed");
        }
        Ok(existing.map(|order| Placed {
            order,
            replayed: true,
        }))
    }

    /// Lock, verify, price and write an order with its lines.
    async fn write_order(
        &self,
        conn: &mut PgConnection,
        draft: &Draft<'_>,
        lines: &[CartLine],
    ) -> Result<OrderWithItems, CheckoutError> {
        let requested = aggregate(lines);
        let ids: Vec<ProductId> = requested.keys().copied().collect();

        let locked = products::lock_for_update(conn, &ids).await?;
        check_stock(&requested, &locked)?;

        let priced = price_lines(lines, &locked)?;
        let totals = self.totals(draft, &priced)?;

        let order = orders::insert_order(
            conn,
            &NewOrder {
                placed_by: draft.placed_by,
                customer_id: draft.customer_id,
                channel: draft.channel,
                status: draft.status,
                totals,
                payment_method: draft.payment_method,
                shipping: draft.shipping,
                notes: draft.notes,
                idempotency_key: draft.idempotency_key,
            },
        )
        .await?;

        let mut items = Vec::with_capacity(priced.len());
        for (line, product, line_total) in &priced {
            let item = orders::insert_item(
                conn,
                order.id,
                &NewOrderItem {
                    product_id: line.product_id,
                    product_name: &product.name,
                    size: line.size,
                    unit_price: product.price,
                    quantity: line.quantity,
                    line_total: *line_total,
                },
            )
            .await?;
            items.push(item);
        }

        for (&id, &quantity) in &requested {
            products::decrement_stock(conn, id, quantity).await?;
        }

        Ok(OrderWithItems { order, items })
    }

    fn totals(
        &self,
        draft: &Draft<'_>,
        priced: &[(CartLine, &Product, Money)],
    ) -> Result<Totals, PricingError> {
        let lines = priced.iter().map(|(l, p, _)| (p.price, l.quantity));
        match draft.channel {
            OrderChannel::Online => self.pricing.quote_online(lines),
            OrderChannel::Pos => self.pricing.quote_pos(lines, draft.discount),
        }
    }
}

/// Total requested quantity per product, in ID order so iteration follows
/// lock order.
fn aggregate(lines: &[CartLine]) -> BTreeMap<ProductId, u32> {
    let mut requested = BTreeMap::new();
    for line in lines {
        let entry = requested.entry(line.product_id).or_insert(0_u32);
        *entry = entry.saturating_add(line.quantity);
    }
    requested
}

/// Verify every requested product is active and has enough stock.
fn check_stock(
    requested: &BTreeMap<ProductId, u32>,
    locked: &HashMap<ProductId, Product>,
) -> Result<(), CheckoutError> {
    for (&product_id, &quantity) in requested {
        let product = locked
            .get(&product_id)
            .filter(|p| p.active)
            .ok_or(CheckoutError::ProductUnavailable(product_id))?;

        if product.stock < quantity {
            return Err(CheckoutError::InsufficientStock {
                product_id,
                name: product.name.clone(),
                requested: quantity,
                available: product.stock,
            });
        }
    }
    Ok(())
}

/// Attach current product and line total to each line.
fn price_lines<'p>(
    lines: &[CartLine],
    locked: &'p HashMap<ProductId, Product>,
) -> Result<Vec<(CartLine, &'p Product, Money)>, CheckoutError> {
    lines
        .iter()
        .map(|line| {
            let product = locked
                .get(&line.product_id)
                .ok_or(CheckoutError::ProductUnavailable(line.product_id))?;
            let line_total = product
                .price
                .checked_mul(line.quantity)
                .ok_or(PricingError::Money(kitshop_core::MoneyError::Overflow))?;
            Ok((*line, product, line_total))
        })
        .collect()
}

/// Validate sale items and merge duplicates of the same `(product, size)`.
fn sale_lines(items: &[SaleItem]) -> Result<Vec<CartLine>, CheckoutError> {
    if items.is_empty() {
        return Err(CheckoutError::InvalidOrder("sale has no items".to_owned()));
    }
    let mut lines: Vec<CartLine> = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity == 0 {
            return Err(CheckoutError::InvalidOrder(format!(
                "quantity for product {} must be at least 1",
                item.product_id
            )));
        }
        match lines
            .iter_mut()
            .find(|l| l.product_id == item.product_id && l.size == item.size)
        {
            Some(line) => line.quantity = line.quantity.saturating_add(item.quantity),
            None => lines.push(CartLine {
                product_id: item.product_id,
                size: item.size,
                quantity: item.quantity,
            }),
        }
    }
    Ok(lines)
}

fn validate_shipping(shipping: &ShippingDetails) -> Result<(), CheckoutError> {
    for (field, value) in [
        ("full_name", &shipping.full_name),
        ("address", &shipping.address),
        ("city", &shipping.city),
    ] {
        if value.trim().is_empty() {
            return Err(CheckoutError::InvalidOrder(format!(
                "shipping {field} is required"
            )));
        }
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn product(id: i32, price_cents: i64, stock: u32, active: bool) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Kit {id}"),
            description: None,
            price: Money::from_cents(price_cents),
            stock,
            min_stock: 0,
            category: "kits".to_string(),
            image_url: None,
            active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(id: i32, size: Size, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            size,
            quantity,
        }
    }

    fn locked(products: Vec<Product>) -> HashMap<ProductId, Product> {
        products.into_iter().map(|p| (p.id, p)).collect()
    }

    #[test]
    fn test_aggregate_sums_sizes_in_id_order() {
        let requested = aggregate(&[line(9, Size::S, 1), line(2, Size::M, 2), line(9, Size::L, 3)]);
        assert_eq!(
            requested.into_iter().collect::<Vec<_>>(),
            vec![(ProductId::new(2), 2), (ProductId::new(9), 4)]
        );
    }

    #[test]
    fn test_check_stock_counts_all_sizes() {
        let requested = aggregate(&[line(1, Size::S, 2), line(1, Size::M, 2)]);
        let err = check_stock(&requested, &locked(vec![product(1, 1_000, 3, true)])).unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_check_stock_rejects_inactive_and_missing() {
        let requested = aggregate(&[line(1, Size::M, 1)]);
        assert!(matches!(
            check_stock(&requested, &locked(vec![product(1, 1_000, 3, false)])),
            Err(CheckoutError::ProductUnavailable(_))
        ));
        assert!(matches!(
            check_stock(&requested, &HashMap::new()),
            Err(CheckoutError::ProductUnavailable(_))
        ));
    }

    #[test]
    fn test_check_stock_exact_stock_is_enough() {
        let requested = aggregate(&[line(1, Size::M, 3)]);
        assert!(check_stock(&requested, &locked(vec![product(1, 1_000, 3, true)])).is_ok());
    }

    #[test]
    fn test_price_lines_uses_current_price() {
        let products = locked(vec![product(1, 1_000, 5, true)]);
        let priced = price_lines(&[line(1, Size::M, 2)], &products).unwrap();
        assert_eq!(priced[0].2, Money::from_cents(2_000));
    }

    #[test]
    fn test_sale_lines_merges_and_validates() {
        let items = [
            SaleItem {
                product_id: ProductId::new(1),
                size: Size::M,
                quantity: 1,
            },
            SaleItem {
                product_id: ProductId::new(1),
                size: Size::M,
                quantity: 2,
            },
        ];
        assert_eq!(sale_lines(&items).unwrap(), vec![line(1, Size::M, 3)]);

        assert!(matches!(sale_lines(&[]), Err(CheckoutError::InvalidOrder(_))));
        let zero = [SaleItem {
            product_id: ProductId::new(1),
            size: Size::M,
            quantity: 0,
        }];
        assert!(matches!(sale_lines(&zero), Err(CheckoutError::InvalidOrder(_))));
    }

    #[test]
    fn test_validate_shipping_requires_address_fields() {
        let mut shipping = ShippingDetails {
            full_name: "Alexia Putellas".to_string(),
            address: "Carrer 1".to_string(),
            city: "Barcelona".to_string(),
            postal_code: None,
            phone: None,
        };
        assert!(validate_shipping(&shipping).is_ok());

        shipping.city = "  ".to_string();
        assert!(matches!(
            validate_shipping(&shipping),
            Err(CheckoutError::InvalidOrder(msg)) if msg.contains("city")
        ));
    }

    #[test]
    fn test_sale_item_size_defaults() {
        let item: SaleItem = serde_json::from_str(r#"{"product_id": 4, "quantity": 1}"#).unwrap();
        assert_eq!(item.size, Size::OneSize);
    }
}
