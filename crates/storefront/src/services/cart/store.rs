//! Durable per-user cart line storage.
//!
//! A store owns the cart line invariants:
//! - at most one line per (user, product)
//! - every stored line has quantity >= 1; reaching zero deletes the line
//! - increments and decrements are atomic read-modify-writes, so concurrent
//!   adds for the same (user, product) never lose an update
//! - `clear`/`drain` remove a user's whole line set in one step
//! - `restore` merges drained lines back without losing lines added since
//!
//! Operations on different users never block each other.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use thiserror::Error;

use cartwheel_core::{ProductId, Quantity, QuantityError, UserId};

use crate::db::RepositoryError;
use crate::models::CartLine;

/// Errors from cart line storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write would create or leave a line with quantity <= 0.
    #[error("invalid quantity for product {product_id}: {source}")]
    InvalidQuantity {
        product_id: ProductId,
        #[source]
        source: QuantityError,
    },

    /// Backend failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Per-user cart line persistence.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The line for (user, product), if any.
    async fn get_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>, StoreError>;

    /// All lines for a user, in the order they were first added.
    async fn list_lines(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError>;

    /// Add `delta` units, creating the line if needed. Returns the new quantity.
    ///
    /// # Errors
    ///
    /// `StoreError::InvalidQuantity` when the line is absent and `delta` is 0,
    /// or when the sum overflows the storage range.
    async fn upsert_increment(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: u32,
    ) -> Result<Quantity, StoreError>;

    /// Remove `delta` units, deleting the line when it reaches zero.
    ///
    /// Returns the remaining quantity: 0 if the line was deleted or never
    /// existed. An absent line is not an error.
    async fn decrement_or_delete(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: u32,
    ) -> Result<u32, StoreError>;

    /// Delete every line for a user in one atomic step. Returns lines removed.
    async fn clear(&self, user_id: UserId) -> Result<u64, StoreError>;

    /// Atomically remove and return every line for a user, in insertion order.
    ///
    /// A concurrent add is either included in the returned lines or survives
    /// in the store afterwards; it is never lost.
    async fn drain(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError>;

    /// Put previously drained lines back, adding onto any line written since.
    ///
    /// All lines are restored or none are.
    ///
    /// # Errors
    ///
    /// `StoreError::InvalidQuantity` when a merged quantity overflows the
    /// storage range.
    async fn restore(&self, user_id: UserId, lines: &[CartLine]) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: CartStore + ?Sized> CartStore for Arc<T> {
    async fn get_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>, StoreError> {
        (**self).get_line(user_id, product_id).await
    }

    async fn list_lines(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        (**self).list_lines(user_id).await
    }

    async fn upsert_increment(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: u32,
    ) -> Result<Quantity, StoreError> {
        (**self).upsert_increment(user_id, product_id, delta).await
    }

    async fn decrement_or_delete(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: u32,
    ) -> Result<u32, StoreError> {
        (**self).decrement_or_delete(user_id, product_id, delta).await
    }

    async fn clear(&self, user_id: UserId) -> Result<u64, StoreError> {
        (**self).clear(user_id).await
    }

    async fn drain(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        (**self).drain(user_id).await
    }

    async fn restore(&self, user_id: UserId, lines: &[CartLine]) -> Result<(), StoreError> {
        (**self).restore(user_id, lines).await
    }
}

// =============================================================================
// In-memory store
// =============================================================================

type UserLines = IndexMap<ProductId, Quantity>;

/// In-memory cart store.
///
/// Each user's lines sit behind their own lock; the outer map lock is held
/// only long enough to find, create or drop that slot. A slot is dropped once
/// its cart is empty and no operation holds it.
#[derive(Debug, Default)]
pub struct MemoryCartStore {
    users: Mutex<HashMap<UserId, Arc<Mutex<UserLines>>>>,
}

impl MemoryCartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user_id: UserId) -> Arc<Mutex<UserLines>> {
        Arc::clone(self.users.lock().entry(user_id).or_default())
    }

    fn existing_slot(&self, user_id: UserId) -> Option<Arc<Mutex<UserLines>>> {
        self.users.lock().get(&user_id).cloned()
    }

    /// Drop the user's slot if it is empty and unshared.
    ///
    /// Slots are only handed out under the outer lock, so a count of one
    /// while holding it means no operation can still write to the slot.
    fn prune(&self, user_id: UserId) {
        let mut users = self.users.lock();
        let idle = users
            .get(&user_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1 && slot.lock().is_empty());
        if idle {
            users.remove(&user_id);
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.users.lock().len()
    }
}

fn to_lines(user_id: UserId, lines: &UserLines) -> Vec<CartLine> {
    lines
        .iter()
        .map(|(&product_id, &quantity)| CartLine {
            user_id,
            product_id,
            quantity,
        })
        .collect()
}

/// Restored lines keep their place ahead of anything added since the drain.
fn merge_restored(restored: &[CartLine], current: &UserLines) -> Result<UserLines, StoreError> {
    let mut merged: UserLines = restored
        .iter()
        .map(|line| (line.product_id, line.quantity))
        .collect();
    for (&product_id, &added) in current {
        let quantity = match merged.get(&product_id) {
            Some(quantity) => quantity
                .checked_add(added.get())
                .map_err(|source| StoreError::InvalidQuantity { product_id, source })?,
            None => added,
        };
        merged.insert(product_id, quantity);
    }
    Ok(merged)
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn get_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>, StoreError> {
        let Some(slot) = self.existing_slot(user_id) else {
            return Ok(None);
        };
        let quantity = slot.lock().get(&product_id).copied();
        Ok(quantity.map(|quantity| CartLine {
            user_id,
            product_id,
            quantity,
        }))
    }

    async fn list_lines(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        Ok(self
            .existing_slot(user_id)
            .map(|slot| to_lines(user_id, &slot.lock()))
            .unwrap_or_default())
    }

    async fn upsert_increment(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: u32,
    ) -> Result<Quantity, StoreError> {
        let slot = self.slot(user_id);
        let result = {
            let mut lines = slot.lock();
            let quantity = match lines.get(&product_id) {
                Some(current) => current.checked_add(delta),
                None => Quantity::new(delta),
            }
            .map_err(|source| StoreError::InvalidQuantity { product_id, source });
            if let Ok(quantity) = &quantity {
                lines.insert(product_id, *quantity);
            }
            quantity
        };

        if result.is_err() {
            drop(slot);
            self.prune(user_id);
        }
        result
    }

    async fn decrement_or_delete(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: u32,
    ) -> Result<u32, StoreError> {
        let Some(slot) = self.existing_slot(user_id) else {
            return Ok(0);
        };
        let remaining = {
            let mut lines = slot.lock();
            let Some(current) = lines.get(&product_id).copied() else {
                return Ok(0);
            };
            match Quantity::new(current.get().saturating_sub(delta)) {
                Ok(remaining) => {
                    lines.insert(product_id, remaining);
                    remaining.get()
                }
                Err(_) => {
                    // shift_remove keeps the remaining lines in insertion order
                    lines.shift_remove(&product_id);
                    0
                }
            }
        };

        if remaining == 0 {
            drop(slot);
            self.prune(user_id);
        }
        Ok(remaining)
    }

    async fn clear(&self, user_id: UserId) -> Result<u64, StoreError> {
        let drained = self.drain(user_id).await?;
        Ok(u64::try_from(drained.len()).unwrap_or(u64::MAX))
    }

    async fn drain(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        let Some(slot) = self.existing_slot(user_id) else {
            return Ok(Vec::new());
        };
        let taken = std::mem::take(&mut *slot.lock());
        drop(slot);
        self.prune(user_id);
        Ok(to_lines(user_id, &taken))
    }

    async fn restore(&self, user_id: UserId, lines: &[CartLine]) -> Result<(), StoreError> {
        if lines.is_empty() {
            return Ok(());
        }

        let slot = self.slot(user_id);
        let result = {
            let mut current = slot.lock();
            merge_restored(lines, &current).map(|merged| *current = merged)
        };

        if result.is_err() {
            drop(slot);
            self.prune(user_id);
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALICE: UserId = UserId::new(1);
    const BOB: UserId = UserId::new(2);
    const P7: ProductId = ProductId::new(7);
    const P8: ProductId = ProductId::new(8);

    #[tokio::test]
    async fn test_increment_creates_then_accumulates() {
        let store = MemoryCartStore::new();

        assert_eq!(store.upsert_increment(ALICE, P7, 1).await.unwrap().get(), 1);
        assert_eq!(store.upsert_increment(ALICE, P7, 2).await.unwrap().get(), 3);

        let lines = store.list_lines(ALICE).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity.get(), 3);
    }

    #[tokio::test]
    async fn test_zero_delta_on_missing_line_is_invalid() {
        let store = MemoryCartStore::new();
        let err = store.upsert_increment(ALICE, P7, 0).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidQuantity { product_id, .. } if product_id == P7
        ));
        assert!(store.get_line(ALICE, P7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decrement_to_zero_deletes_line() {
        let store = MemoryCartStore::new();
        store.upsert_increment(ALICE, P7, 2).await.unwrap();

        assert_eq!(store.decrement_or_delete(ALICE, P7, 1).await.unwrap(), 1);
        assert_eq!(store.decrement_or_delete(ALICE, P7, 1).await.unwrap(), 0);
        assert!(store.get_line(ALICE, P7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decrement_past_zero_deletes_line() {
        let store = MemoryCartStore::new();
        store.upsert_increment(ALICE, P7, 2).await.unwrap();
        assert_eq!(store.decrement_or_delete(ALICE, P7, 5).await.unwrap(), 0);
        assert!(store.list_lines(ALICE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decrement_absent_line_is_noop() {
        let store = MemoryCartStore::new();
        assert_eq!(store.decrement_or_delete(ALICE, P7, 1).await.unwrap(), 0);
        store.upsert_increment(ALICE, P8, 1).await.unwrap();
        assert_eq!(store.decrement_or_delete(ALICE, P7, 1).await.unwrap(), 0);
        assert_eq!(store.list_lines(ALICE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lines_keep_insertion_order_after_delete() {
        let store = MemoryCartStore::new();
        for id in [3, 1, 2] {
            store.upsert_increment(ALICE, ProductId::new(id), 1).await.unwrap();
        }
        store.decrement_or_delete(ALICE, ProductId::new(1), 1).await.unwrap();
        store.upsert_increment(ALICE, ProductId::new(3), 1).await.unwrap();

        let order: Vec<i32> = store
            .list_lines(ALICE)
            .await
            .unwrap()
            .iter()
            .map(|l| l.product_id.as_i32())
            .collect();
        assert_eq!(order, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_drain_returns_lines_and_empties_only_that_user() {
        let store = MemoryCartStore::new();
        store.upsert_increment(ALICE, P7, 3).await.unwrap();
        store.upsert_increment(ALICE, P8, 1).await.unwrap();
        store.upsert_increment(BOB, P7, 1).await.unwrap();

        let drained = store.drain(ALICE).await.unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].product_id, P7);
        assert_eq!(drained[0].quantity.get(), 3);

        assert!(store.list_lines(ALICE).await.unwrap().is_empty());
        assert_eq!(store.list_lines(BOB).await.unwrap().len(), 1);
        assert!(store.drain(ALICE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_counts_removed_lines() {
        let store = MemoryCartStore::new();
        assert_eq!(store.clear(ALICE).await.unwrap(), 0);
        store.upsert_increment(ALICE, P7, 3).await.unwrap();
        store.upsert_increment(ALICE, P8, 1).await.unwrap();
        assert_eq!(store.clear(ALICE).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_lose_no_updates() {
        let store = Arc::new(MemoryCartStore::new());
        let mut handles = Vec::new();
        for _ in 0..64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.upsert_increment(ALICE, P7, 1).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let line = store.get_line(ALICE, P7).await.unwrap().unwrap();
        assert_eq!(line.quantity.get(), 64);
    }

    #[tokio::test]
    async fn test_restore_merges_with_lines_added_after_drain() {
        let store = MemoryCartStore::new();
        store.upsert_increment(ALICE, P7, 2).await.unwrap();
        store.upsert_increment(ALICE, P8, 1).await.unwrap();

        let drained = store.drain(ALICE).await.unwrap();
        store.upsert_increment(ALICE, ProductId::new(9), 1).await.unwrap();
        store.upsert_increment(ALICE, P7, 1).await.unwrap();
        store.restore(ALICE, &drained).await.unwrap();

        let lines: Vec<(i32, u32)> = store
            .list_lines(ALICE)
            .await
            .unwrap()
            .iter()
            .map(|l| (l.product_id.as_i32(), l.quantity.get()))
            .collect();
        assert_eq!(lines, vec![(7, 3), (8, 1), (9, 1)]);
    }

    #[tokio::test]
    async fn test_restore_overflow_leaves_cart_untouched() {
        let store = MemoryCartStore::new();
        store
            .upsert_increment(ALICE, P7, i32::MAX.unsigned_abs())
            .await
            .unwrap();
        let drained = store.drain(ALICE).await.unwrap();
        store.upsert_increment(ALICE, P8, 1).await.unwrap();
        store.upsert_increment(ALICE, P7, 1).await.unwrap();

        let err = store.restore(ALICE, &drained).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidQuantity { product_id, .. } if product_id == P7
        ));

        let lines = store.list_lines(ALICE).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].product_id, P8);
        assert_eq!(lines[1].quantity.get(), 1);
    }

    #[tokio::test]
    async fn test_emptied_carts_release_their_slot() {
        let store = MemoryCartStore::new();

        store.upsert_increment(ALICE, P7, 1).await.unwrap();
        store.upsert_increment(BOB, P7, 1).await.unwrap();
        assert_eq!(store.tracked_users(), 2);

        store.drain(ALICE).await.unwrap();
        assert_eq!(store.tracked_users(), 1);

        store.upsert_increment(ALICE, P7, 2).await.unwrap();
        store.decrement_or_delete(ALICE, P7, 2).await.unwrap();
        store.clear(BOB).await.unwrap();
        assert_eq!(store.tracked_users(), 0);

        store.upsert_increment(ALICE, P7, 0).await.unwrap_err();
        store.restore(ALICE, &[]).await.unwrap();
        assert_eq!(store.tracked_users(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_drain_racing_increments_loses_nothing() {
        let store = Arc::new(MemoryCartStore::new());
        let mut handles = Vec::new();
        for _ in 0..64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.upsert_increment(ALICE, P7, 1).await.unwrap();
            }));
        }

        let mut drained = 0;
        for _ in 0..8 {
            drained += store
                .drain(ALICE)
                .await
                .unwrap()
                .iter()
                .map(|l| l.quantity.get())
                .sum::<u32>();
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let left = store
            .get_line(ALICE, P7)
            .await
            .unwrap()
            .map_or(0, |l| l.quantity.get());
        assert_eq!(drained + left, 64);
    }
}
