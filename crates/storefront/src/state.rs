//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{PgCartStore, PgCatalog};
use crate::services::{CachedCatalog, CartService, CartStore, Catalog};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    cart: CartService,
    pages: Arc<dyn Catalog>,
}

impl AppState {
    /// Create state backed by Postgres for carts and the catalog.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let store: Arc<dyn CartStore> = Arc::new(PgCartStore::new(pool.clone()));
        let catalog: Arc<dyn Catalog> = Arc::new(PgCatalog::new(pool.clone()));
        Self::with_backends(config, pool, store, catalog)
    }

    /// Create state with explicit cart and catalog backends.
    ///
    /// The cart prices against `catalog` directly. Product and index pages
    /// read through a lookup cache with the configured TTL, so a pruned or
    /// repriced product may still be displayed there until it expires.
    /// The pool is still used for accounts and health checks.
    #[must_use]
    pub fn with_backends(
        config: StorefrontConfig,
        pool: PgPool,
        store: Arc<dyn CartStore>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        let pages = CachedCatalog::shared(Arc::clone(&catalog), config.catalog.cache_ttl);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                cart: CartService::new(store, catalog),
                pages,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// The cart service.
    #[must_use]
    pub fn cart(&self) -> &CartService {
        &self.inner.cart
    }

    /// The cached catalog used to render product and index pages.
    #[must_use]
    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.inner.pages
    }
}
