//! Product repository for database operations.
//!
//! Besides the pool-backed [`ProductRepository`], this module exposes
//! connection-level helpers used inside checkout and cancellation
//! transactions, where product rows must be locked before stock changes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use kitshop_core::{Money, ProductId};

use super::{RepositoryError, to_count};
use crate::models::product::{NewProduct, Product, ProductFilter, ProductUpdate};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    description: Option<String>,
    price_cents: i64,
    stock: i32,
    min_stock: i32,
    category: String,
    image_url: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        if row.price_cents < 0 {
            return Err(RepositoryError::DataCorruption(format!(
                "negative price for product {}",
                row.id
            )));
        }
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: Money::from_cents(row.price_cents),
            stock: to_count(row.stock, "stock")?,
            min_stock: to_count(row.min_stock, "min_stock")?,
            category: row.category,
            image_url: row.image_url,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(Product::try_from).collect()
}

/// Convert a `u32` quantity for binding to an `INTEGER` column.
fn to_db_int(value: u32, what: &str) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| RepositoryError::Conflict(format!("{what} too large")))
}

const PRODUCT_COLUMNS: &str = r"
    id, name, description, price_cents, stock, min_stock, category,
    image_url, active, created_at, updated_at
";

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products matching `filter`, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            SELECT {PRODUCT_COLUMNS}
            FROM shop.product
            WHERE ($1 OR active)
              AND ($2::text IS NULL OR category = $2)
              AND ($3::text IS NULL OR strpos(lower(name), lower($3)) > 0)
            ORDER BY name ASC, id ASC
            LIMIT $4 OFFSET $5
            "
        ))
        .bind(filter.include_inactive)
        .bind(&filter.category)
        .bind(&filter.search)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(self.pool)
        .await?;

        into_products(rows)
    }

    /// Get a product by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the row is invalid.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    /// Get several products by ID. Missing IDs are simply absent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.product WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(self.pool)
        .await?;

        Ok(into_products(rows)?
            .into_iter()
            .map(|p| (p.id, p))
            .collect())
    }

    /// Distinct categories of active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        let categories = sqlx::query_scalar(
            "SELECT DISTINCT category FROM shop.product WHERE active ORDER BY category",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(categories)
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(&self, input: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO shop.product
                (name, description, price_cents, stock, min_stock, category, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price.cents())
        .bind(to_db_int(input.stock, "stock")?)
        .bind(to_db_int(input.min_stock, "min_stock")?)
        .bind(&input.category)
        .bind(&input.image_url)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let min_stock = update
            .min_stock
            .map(|v| to_db_int(v, "min_stock"))
            .transpose()?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE shop.product
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                price_cents = COALESCE($4, price_cents),
                min_stock = COALESCE($5, min_stock),
                category = COALESCE($6, category),
                image_url = COALESCE($7, image_url),
                active = COALESCE($8, active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(update.price.map(Money::cents))
        .bind(min_stock)
        .bind(&update.category)
        .bind(&update.image_url)
        .bind(update.active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Soft-delete a product. Order history keeps referring to it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn deactivate(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.product SET active = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Add a signed delta to stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` if stock would go below zero.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn adjust_stock(&self, id: ProductId, delta: i32) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE shop.product
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1 AND stock + $2 >= 0
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(delta)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None if self.get(id).await?.is_some() => Err(RepositoryError::Conflict(format!(
                "stock of product {id} cannot go below zero"
            ))),
            None => Err(RepositoryError::NotFound),
        }
    }

    /// Active products at or below their minimum stock, scarcest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn low_stock(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            SELECT {PRODUCT_COLUMNS}
            FROM shop.product
            WHERE active AND stock <= min_stock
            ORDER BY stock ASC, name ASC
            "
        ))
        .fetch_all(self.pool)
        .await?;

        into_products(rows)
    }

    /// Number of active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_active(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM shop.product WHERE active")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Transaction helpers
// =============================================================================

/// Lock the given product rows for update, in ID order.
///
/// Locking in a fixed order keeps concurrent checkouts over overlapping
/// products from deadlocking.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_for_update(
    conn: &mut PgConnection,
    ids: &[ProductId],
) -> Result<HashMap<ProductId, Product>, RepositoryError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        r"
        SELECT {PRODUCT_COLUMNS}
        FROM shop.product
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        "
    ))
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(into_products(rows)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect())
}

/// Remove `quantity` units from stock. The row must already be locked.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if stock is insufficient.
/// Returns `RepositoryError::Database` for other database errors.
pub async fn decrement_stock(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: u32,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE shop.product
        SET stock = stock - $2, updated_at = NOW()
        WHERE id = $1 AND stock >= $2
        ",
    )
    .bind(id)
    .bind(to_db_int(quantity, "quantity")?)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "insufficient stock for product {id}"
        )));
    }
    Ok(())
}

/// Return `quantity` units to stock.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn restock(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: u32,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE shop.product SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(to_db_int(quantity, "quantity")?)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(price_cents: i64, stock: i32) -> ProductRow {
        ProductRow {
            id: ProductId::new(7),
            name: "Home Jersey 24/25".to_string(),
            description: None,
            price_cents,
            stock,
            min_stock: 3,
            category: "jerseys".to_string(),
            image_url: None,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let product = Product::try_from(row(5_999, 2)).ok();
        let product = product.as_ref();
        assert_eq!(product.map(|p| p.price), Some(Money::from_cents(5_999)));
        assert_eq!(product.map(|p| p.stock), Some(2));
        assert_eq!(product.map(Product::is_low_stock), Some(true));
    }

    #[test]
    fn test_row_conversion_rejects_negative_values() {
        assert!(matches!(
            Product::try_from(row(-1, 2)),
            Err(RepositoryError::DataCorruption(_))
        ));
        assert!(matches!(
            Product::try_from(row(100, -2)),
            Err(RepositoryError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_to_db_int() {
        assert_eq!(to_db_int(12, "stock").ok(), Some(12));
        assert!(to_db_int(u32::MAX, "stock").is_err());
    }
}
