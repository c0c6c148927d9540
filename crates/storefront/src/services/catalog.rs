//! Product catalog capability.
//!
//! The cart only needs two things from the catalog: resolve a product by id,
//! and list a page of products for the index. Postgres backs it in
//! production (`db::PgCatalog`); [`MemoryCatalog`] serves tests and
//! [`CachedCatalog`] puts a short-lived lookup cache in front of either.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use parking_lot::RwLock;
use thiserror::Error;

use cartwheel_core::ProductId;

use crate::db::RepositoryError;
use crate::models::{CatalogPage, Product};

/// Maximum number of products kept in the lookup cache.
const PRODUCT_CACHE_CAPACITY: u64 = 10_000;

/// Errors from catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Read-only product lookup and pagination.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch a product by id, `None` if it does not exist.
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>, CatalogError>;

    /// List one page of products ordered by id.
    ///
    /// Pages are 1-based; page 0 is treated as page 1. A page past the end
    /// yields an empty product list.
    async fn list(&self, page: u32, page_size: u32) -> Result<CatalogPage, CatalogError>;
}

#[async_trait]
impl<T: Catalog + ?Sized> Catalog for Arc<T> {
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>, CatalogError> {
        (**self).get(product_id).await
    }

    async fn list(&self, page: u32, page_size: u32) -> Result<CatalogPage, CatalogError> {
        (**self).list(page, page_size).await
    }
}

/// Normalize a requested page and compute its row offset.
pub(crate) fn page_bounds(page: u32, page_size: u32) -> (u32, u32, u64) {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let offset = u64::from(page - 1) * u64::from(page_size);
    (page, page_size, offset)
}

// =============================================================================
// In-memory catalog
// =============================================================================

/// In-memory catalog ordered by product id.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    products: RwLock<BTreeMap<ProductId, Product>>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog holding `products`.
    #[must_use]
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let catalog = Self::new();
        for product in products {
            catalog.insert(product);
        }
        catalog
    }

    /// Insert or replace a product.
    pub fn insert(&self, product: Product) {
        self.products.write().insert(product.id, product);
    }

    /// Remove a product, as if it were pruned from the catalog.
    pub fn remove(&self, product_id: ProductId) -> Option<Product> {
        self.products.write().remove(&product_id)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>, CatalogError> {
        Ok(self.products.read().get(&product_id).cloned())
    }

    async fn list(&self, page: u32, page_size: u32) -> Result<CatalogPage, CatalogError> {
        let (page, page_size, offset) = page_bounds(page, page_size);
        let products = self.products.read();
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(page_size).unwrap_or(usize::MAX);

        Ok(CatalogPage {
            products: products.values().skip(skip).take(take).cloned().collect(),
            page,
            page_size,
            total: u64::try_from(products.len()).unwrap_or(u64::MAX),
        })
    }
}

// =============================================================================
// Cached catalog
// =============================================================================

/// Catalog wrapper caching successful product lookups.
///
/// Misses are not cached so a newly added product shows up immediately.
/// A found product is served until its TTL lapses even if it has since been
/// removed or repriced, so this is for display only. Pagination always goes
/// to the inner catalog.
pub struct CachedCatalog<C> {
    inner: C,
    products: Cache<ProductId, Product>,
}

impl<C: Catalog> CachedCatalog<C> {
    /// Wrap `inner`, keeping found products for `ttl`.
    #[must_use]
    pub fn new(inner: C, ttl: Duration) -> Self {
        let products = Cache::builder()
            .max_capacity(PRODUCT_CACHE_CAPACITY)
            .time_to_live(ttl)
            .build();
        Self { inner, products }
    }

    /// Wrap `inner` and erase the type for use in shared state.
    #[must_use]
    pub fn shared(inner: C, ttl: Duration) -> Arc<dyn Catalog>
    where
        C: 'static,
    {
        Arc::new(Self::new(inner, ttl))
    }
}

#[async_trait]
impl<C: Catalog> Catalog for CachedCatalog<C> {
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>, CatalogError> {
        if let Some(product) = self.products.get(&product_id).await {
            return Ok(Some(product));
        }

        let product = self.inner.get(product_id).await?;
        if let Some(found) = &product {
            self.products.insert(product_id, found.clone()).await;
        }
        Ok(product)
    }

    async fn list(&self, page: u32, page_size: u32) -> Result<CatalogPage, CatalogError> {
        self.inner.list(page, page_size).await
    }
}
