//! Postgres-backed product catalog.

use async_trait::async_trait;
use sqlx::PgPool;

use cartwheel_core::{Price, ProductId};

use super::RepositoryError;
use crate::models::{CatalogPage, Product};
use crate::services::catalog::page_bounds;
use crate::services::{Catalog, CatalogError};

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    description: String,
    price: Price,
    image_url: String,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            image_url: row.image_url,
        }
    }
}

/// Fields for a product that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub image_url: String,
}

/// Catalog over `cartwheel.product`.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a product and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn insert(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO cartwheel.product (name, description, price, image_url)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, description, price, image_url
            ",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.image_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// Delete a product. Cart lines referencing it are left in place.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn delete(&self, product_id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cartwheel.product WHERE id = $1")
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM cartwheel.product")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of products in the catalog.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cartwheel.product")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>, CatalogError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, description, price, image_url
            FROM cartwheel.product
            WHERE id = $1
            ",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn list(&self, page: u32, page_size: u32) -> Result<CatalogPage, CatalogError> {
        let (page, page_size, offset) = page_bounds(page, page_size);

        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, description, price, image_url
            FROM cartwheel.product
            ORDER BY id
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(i64::from(page_size))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let total = self.count().await?;

        Ok(CatalogPage {
            products: rows.into_iter().map(Product::from).collect(),
            page,
            page_size,
            total,
        })
    }
}
