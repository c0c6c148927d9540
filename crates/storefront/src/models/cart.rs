//! Cart domain types.
//!
//! The persisted [`CartLine`] set is the only source of truth for a cart.
//! [`SessionCartView`] is a disposable projection of it for cheap display and
//! is always rebuilt wholesale, never patched.

use serde::{Deserialize, Serialize};

use cartwheel_core::{Price, ProductId, Quantity, UserId};

use super::Product;

/// One persisted line of a user's cart.
///
/// At most one line exists per (user, product) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// A cart line resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub product: Product,
    pub quantity: Quantity,
}

impl CartItem {
    /// Unit price multiplied by quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

/// Resolved cart contents and their total, taken from one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CartSummary {
    pub items: Vec<CartItem>,
    pub total: Price,
}

impl CartSummary {
    /// Build a summary from resolved items, computing the total.
    #[must_use]
    pub fn from_items(items: Vec<CartItem>) -> Self {
        let total = items.iter().map(CartItem::line_total).sum();
        Self { items, total }
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity.get()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// What the customer bought: the cart as it was right before checkout cleared it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckoutReceipt {
    pub items: Vec<CartItem>,
    pub total: Price,
    pub item_count: u32,
}

impl From<CartSummary> for CheckoutReceipt {
    fn from(summary: CartSummary) -> Self {
        let item_count = summary.item_count();
        Self {
            items: summary.items,
            total: summary.total,
            item_count,
        }
    }
}

impl CheckoutReceipt {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Flattened cart for session storage: one product id per unit of quantity.
///
/// `[line(7, qty 2), line(3, qty 1)]` becomes `[7, 7, 3]`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCartView(Vec<ProductId>);

impl SessionCartView {
    /// Flatten persisted lines, keeping line order.
    #[must_use]
    pub fn from_lines(lines: &[CartLine]) -> Self {
        let ids = lines
            .iter()
            .flat_map(|line| {
                let units = usize::try_from(line.quantity.get()).unwrap_or(usize::MAX);
                std::iter::repeat_n(line.product_id, units)
            })
            .collect();
        Self(ids)
    }

    #[must_use]
    pub fn product_ids(&self) -> &[ProductId] {
        &self.0
    }

    /// Number of units in the cart.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Units of `product_id` in the view.
    #[must_use]
    pub fn count_of(&self, product_id: ProductId) -> usize {
        self.0.iter().filter(|id| **id == product_id).count()
    }
}
