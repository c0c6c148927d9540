//! Postgres-backed cart line storage.
//!
//! Row-level locking gives the per-(user, product) serialization: increments
//! are a single `INSERT ... ON CONFLICT DO UPDATE`, decrements lock the row
//! for the read-modify-write, and drain is one `DELETE ... RETURNING`.
//! Restore replays the increment for every drained line in one transaction.

use async_trait::async_trait;
use sqlx::PgPool;

use cartwheel_core::{ProductId, Quantity, QuantityError, UserId};

use super::RepositoryError;
use crate::models::CartLine;
use crate::services::{CartStore, StoreError};

/// SQLSTATE for `numeric_value_out_of_range`.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    id: i64,
    user_id: UserId,
    product_id: ProductId,
    quantity: i32,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::try_from(row.quantity).map_err(|e| {
            RepositoryError::DataCorruption(format!("cart line {} has {e}", row.id))
        })?;
        Ok(Self {
            user_id: row.user_id,
            product_id: row.product_id,
            quantity,
        })
    }
}

const INCREMENT_SQL: &str = r"
    INSERT INTO cartwheel.cart_line (user_id, product_id, quantity)
    VALUES ($1, $2, $3)
    ON CONFLICT (user_id, product_id)
    DO UPDATE SET quantity = cartwheel.cart_line.quantity + EXCLUDED.quantity
    RETURNING quantity
";

/// Map an increment failure, surfacing integer overflow as a quantity error.
fn increment_error(product_id: ProductId, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(ref db) if db.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) => {
            StoreError::InvalidQuantity {
                product_id,
                source: QuantityError::OutOfRange(i64::MAX),
            }
        }
        other => StoreError::from(other),
    }
}

fn into_lines(rows: Vec<CartLineRow>) -> Result<Vec<CartLine>, StoreError> {
    rows.into_iter()
        .map(|row| CartLine::try_from(row).map_err(StoreError::from))
        .collect()
}

/// Cart store over `cartwheel.cart_line`.
#[derive(Debug, Clone)]
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn get_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>, StoreError> {
        let row = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT id, user_id, product_id, quantity
            FROM cartwheel.cart_line
            WHERE user_id = $1 AND product_id = $2
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CartLine::try_from).transpose()?)
    }

    async fn list_lines(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT id, user_id, product_id, quantity
            FROM cartwheel.cart_line
            WHERE user_id = $1
            ORDER BY id
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        into_lines(rows)
    }

    async fn upsert_increment(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: u32,
    ) -> Result<Quantity, StoreError> {
        if delta == 0 {
            return match self.get_line(user_id, product_id).await? {
                Some(line) => Ok(line.quantity),
                None => Err(StoreError::InvalidQuantity {
                    product_id,
                    source: QuantityError::Zero,
                }),
            };
        }

        let delta = i32::try_from(delta).map_err(|_| StoreError::InvalidQuantity {
            product_id,
            source: QuantityError::OutOfRange(i64::from(delta)),
        })?;

        let quantity: i32 = sqlx::query_scalar(INCREMENT_SQL)
            .bind(user_id)
            .bind(product_id)
            .bind(delta)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| increment_error(product_id, e))?;

        Quantity::try_from(quantity).map_err(|e| {
            StoreError::from(RepositoryError::DataCorruption(format!(
                "increment returned {e}"
            )))
        })
    }

    async fn decrement_or_delete(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: u32,
    ) -> Result<u32, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<i32> = sqlx::query_scalar(
            r"
            SELECT quantity
            FROM cartwheel.cart_line
            WHERE user_id = $1 AND product_id = $2
            FOR UPDATE
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            tx.commit().await?;
            return Ok(0);
        };

        let remaining = i64::from(current) - i64::from(delta);
        let remaining = if remaining > 0 {
            let remaining = i32::try_from(remaining).unwrap_or(i32::MAX);
            sqlx::query(
                r"
                UPDATE cartwheel.cart_line
                SET quantity = $3
                WHERE user_id = $1 AND product_id = $2
                ",
            )
            .bind(user_id)
            .bind(product_id)
            .bind(remaining)
            .execute(&mut *tx)
            .await?;
            remaining.unsigned_abs()
        } else {
            sqlx::query(
                r"
                DELETE FROM cartwheel.cart_line
                WHERE user_id = $1 AND product_id = $2
                ",
            )
            .bind(user_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
            0
        };

        tx.commit().await?;
        Ok(remaining)
    }

    async fn clear(&self, user_id: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cartwheel.cart_line WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn drain(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        let mut rows = sqlx::query_as::<_, CartLineRow>(
            r"
            DELETE FROM cartwheel.cart_line
            WHERE user_id = $1
            RETURNING id, user_id, product_id, quantity
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        // RETURNING has no defined order
        rows.sort_by_key(|row| row.id);
        into_lines(rows)
    }

    async fn restore(&self, user_id: UserId, lines: &[CartLine]) -> Result<(), StoreError> {
        if lines.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for line in lines {
            let quantity = i32::try_from(line.quantity.get()).map_err(|_| {
                StoreError::InvalidQuantity {
                    product_id: line.product_id,
                    source: QuantityError::OutOfRange(i64::from(line.quantity.get())),
                }
            })?;
            sqlx::query(INCREMENT_SQL)
                .bind(user_id)
                .bind(line.product_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await
                .map_err(|e| increment_error(line.product_id, e))?;
        }
        tx.commit().await?;
        Ok(())
    }
}
