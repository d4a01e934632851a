//! Persisted cart lines of signed-in users.

use sqlx::{PgConnection, PgPool};

use kitshop_core::{CartLine, ProductId, Size, UserId};

use super::{RepositoryError, to_count};

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    product_id: ProductId,
    size: Size,
    quantity: i32,
}

impl TryFrom<CartItemRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: row.product_id,
            size: row.size,
            quantity: to_count(row.quantity, "cart quantity")?,
        })
    }
}

fn quantity_param(line: &CartLine) -> Result<i32, RepositoryError> {
    i32::try_from(line.quantity)
        .map_err(|_| RepositoryError::Conflict("quantity too large".to_owned()))
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Lines of a user's cart, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        lines(&mut *conn, user_id).await
    }

    /// Store the quantity of one line, inserting it if new.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(&self, user_id: UserId, line: &CartLine) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO shop.cart_item (user_id, product_id, size, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, product_id, size)
            DO UPDATE SET quantity = EXCLUDED.quantity
            ",
        )
        .bind(user_id)
        .bind(line.product_id)
        .bind(line.size)
        .bind(quantity_param(line)?)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Remove one line. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        size: Size,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM shop.cart_item WHERE user_id = $1 AND product_id = $2 AND size = $3",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(size)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the whole cart with `lines`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn replace(
        &self,
        user_id: UserId,
        lines: &[CartLine],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        clear(&mut *tx, user_id).await?;
        for line in lines {
            sqlx::query(
                r"
                INSERT INTO shop.cart_item (user_id, product_id, size, quantity)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(user_id)
            .bind(line.product_id)
            .bind(line.size)
            .bind(quantity_param(line)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Empty a user's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        clear(&mut *conn, user_id).await
    }
}

/// Lines of a user's cart on an existing connection.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lines(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Vec<CartLine>, RepositoryError> {
    let rows = sqlx::query_as::<_, CartItemRow>(
        r"
        SELECT product_id, size, quantity
        FROM shop.cart_item
        WHERE user_id = $1
        ORDER BY added_at ASC, product_id ASC, size ASC
        ",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(CartLine::try_from).collect()
}

/// Empty a user's cart on an existing connection.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn clear(conn: &mut PgConnection, user_id: UserId) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM shop.cart_item WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
