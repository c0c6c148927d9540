//! Cart reconciliation and checkout.
//!
//! [`CartService`] keeps three views of a cart consistent: the persisted
//! lines in a [`CartStore`], the prices in the [`Catalog`], and the
//! flattened [`SessionCartView`] cached in the user's session. The store is
//! authoritative. The session copy is rebuilt from it after every mutation
//! and is never patched in place.

mod cache;
mod error;
mod store;

pub use cache::{CacheError, MemorySessionCart, SessionCartCache};
pub use error::CartError;
pub use store::{CartStore, MemoryCartStore, StoreError};

use std::sync::Arc;

use tracing::instrument;

use cartwheel_core::{Price, ProductId, Quantity, UserId};

use crate::models::{CartItem, CartLine, CartSummary, CheckoutReceipt, SessionCartView};
use crate::services::Catalog;

/// Cart operations for an acting user.
///
/// Every operation takes the acting identity explicitly; `None` means the
/// request is anonymous and is rejected before anything is read or written.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn CartStore>,
    catalog: Arc<dyn Catalog>,
}

impl CartService {
    #[must_use]
    pub fn new(store: Arc<dyn CartStore>, catalog: Arc<dyn Catalog>) -> Self {
        Self { store, catalog }
    }

    /// Add one unit of `product_id` to the actor's cart.
    ///
    /// Returns the line's new quantity.
    ///
    /// # Errors
    ///
    /// - `CartError::Unauthorized` if `actor` is `None`
    /// - `CartError::ProductNotFound` if the product is not in the catalog
    /// - `CartError::Store` / `CartError::Catalog` on backend failure
    #[instrument(skip_all, fields(user_id = ?actor, product_id = %product_id))]
    pub async fn add(
        &self,
        actor: Option<UserId>,
        product_id: ProductId,
        cache: &dyn SessionCartCache,
    ) -> Result<Quantity, CartError> {
        let user_id = actor.ok_or(CartError::Unauthorized)?;

        if self.catalog.get(product_id).await?.is_none() {
            return Err(CartError::ProductNotFound(product_id));
        }

        let quantity = self.store.upsert_increment(user_id, product_id, 1).await?;
        tracing::info!(
            user_id = %user_id,
            product_id = %product_id,
            quantity = quantity.get(),
            "Added product to cart"
        );

        self.rebuild_cache(user_id, cache).await?;
        Ok(quantity)
    }

    /// Remove one unit of `product_id` from the actor's cart.
    ///
    /// Returns the remaining quantity, 0 when the line was deleted or was
    /// never there.
    ///
    /// # Errors
    ///
    /// - `CartError::Unauthorized` if `actor` is `None`
    /// - `CartError::Store` on backend failure
    #[instrument(skip_all, fields(user_id = ?actor, product_id = %product_id))]
    pub async fn remove(
        &self,
        actor: Option<UserId>,
        product_id: ProductId,
        cache: &dyn SessionCartCache,
    ) -> Result<u32, CartError> {
        let user_id = actor.ok_or(CartError::Unauthorized)?;

        let remaining = self
            .store
            .decrement_or_delete(user_id, product_id, 1)
            .await?;
        tracing::info!(
            user_id = %user_id,
            product_id = %product_id,
            quantity = remaining,
            "Removed product from cart"
        );

        self.rebuild_cache(user_id, cache).await?;
        Ok(remaining)
    }

    /// The actor's cart lines resolved against the catalog, in line order.
    ///
    /// Lines whose product no longer exists are skipped.
    ///
    /// # Errors
    ///
    /// - `CartError::Unauthorized` if `actor` is `None`
    /// - `CartError::Store` / `CartError::Catalog` on backend failure
    pub async fn view(&self, actor: Option<UserId>) -> Result<Vec<CartItem>, CartError> {
        let user_id = actor.ok_or(CartError::Unauthorized)?;
        let lines = self.store.list_lines(user_id).await?;
        self.resolve(&lines).await
    }

    /// Sum of price times quantity over the actor's cart.
    ///
    /// # Errors
    ///
    /// Same as [`Self::view`].
    pub async fn total(&self, actor: Option<UserId>) -> Result<Price, CartError> {
        Ok(self.summary(actor).await?.total)
    }

    /// Items and total taken from a single read of the cart.
    ///
    /// # Errors
    ///
    /// Same as [`Self::view`].
    pub async fn summary(&self, actor: Option<UserId>) -> Result<CartSummary, CartError> {
        let items = self.view(actor).await?;
        Ok(CartSummary::from_items(items))
    }

    /// Empty the actor's cart and return what it held.
    ///
    /// The lines are removed and read in one atomic step, so an add racing
    /// with checkout is either on the receipt or still in the cart after.
    ///
    /// If pricing the drained lines fails they are put back in the cart and
    /// the error is returned. Once the receipt exists, failing to refresh
    /// the session view no longer fails the checkout.
    ///
    /// # Errors
    ///
    /// - `CartError::Unauthorized` if `actor` is `None`
    /// - `CartError::Store` / `CartError::Catalog` on backend failure
    #[instrument(skip_all, fields(user_id = ?actor))]
    pub async fn checkout(
        &self,
        actor: Option<UserId>,
        cache: &dyn SessionCartCache,
    ) -> Result<CheckoutReceipt, CartError> {
        let user_id = actor.ok_or(CartError::Unauthorized)?;

        let drained = self.store.drain(user_id).await?;
        let items = match self.resolve(&drained).await {
            Ok(items) => items,
            Err(e) => {
                self.restore_drained(user_id, &drained).await;
                return Err(e);
            }
        };

        let receipt = CheckoutReceipt::from(CartSummary::from_items(items));
        tracing::info!(
            user_id = %user_id,
            lines = drained.len(),
            item_count = receipt.item_count,
            total = %receipt.total,
            "Checked out cart"
        );

        if let Err(e) = self.rebuild_cache(user_id, cache).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to refresh cart after checkout");
            if let Err(e) = cache.clear().await {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to clear cart from session");
            }
        }
        Ok(receipt)
    }

    /// Put drained lines back after a failed checkout.
    async fn restore_drained(&self, user_id: UserId, drained: &[CartLine]) {
        match self.store.restore(user_id, drained).await {
            Ok(()) => tracing::warn!(
                user_id = %user_id,
                lines = drained.len(),
                "Checkout failed, cart restored"
            ),
            Err(e) => tracing::error!(
                user_id = %user_id,
                lines = ?drained,
                error = %e,
                "Checkout failed and cart could not be restored"
            ),
        }
    }

    /// Rebuild the session view from the actor's persisted cart.
    ///
    /// # Errors
    ///
    /// - `CartError::Unauthorized` if `actor` is `None`
    /// - `CartError::Store` on backend failure
    pub async fn refresh_cache(
        &self,
        actor: Option<UserId>,
        cache: &dyn SessionCartCache,
    ) -> Result<SessionCartView, CartError> {
        let user_id = actor.ok_or(CartError::Unauthorized)?;
        self.rebuild_cache(user_id, cache).await
    }

    /// Replace the cached view wholesale from the store.
    ///
    /// A failed session write is logged and otherwise ignored: the store has
    /// already committed and the cache is rebuilt on the next mutation.
    async fn rebuild_cache(
        &self,
        user_id: UserId,
        cache: &dyn SessionCartCache,
    ) -> Result<SessionCartView, CartError> {
        let lines = self.store.list_lines(user_id).await?;
        let view = SessionCartView::from_lines(&lines);
        if let Err(e) = cache.store(&view).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to store cart in session");
        }
        Ok(view)
    }

    async fn resolve(&self, lines: &[CartLine]) -> Result<Vec<CartItem>, CartError> {
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            match self.catalog.get(line.product_id).await? {
                Some(product) => items.push(CartItem {
                    product,
                    quantity: line.quantity,
                }),
                None => tracing::debug!(
                    user_id = %line.user_id,
                    product_id = %line.product_id,
                    "Skipping cart line for missing product"
                ),
            }
        }
        Ok(items)
    }
}
