//! Catalog product types.

use serde::{Deserialize, Serialize};

use cartwheel_core::{Price, ProductId};

/// A catalog product.
///
/// Read-only from the cart's point of view; only the catalog mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    pub image_url: String,
}

/// One page of the catalog listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPage {
    /// Products on this page, ordered by id.
    pub products: Vec<Product>,
    /// 1-based page number.
    pub page: u32,
    /// Requested page size.
    pub page_size: u32,
    /// Total number of products in the catalog.
    pub total: u64,
}

impl CatalogPage {
    /// Number of pages needed to show every product (at least 1).
    #[must_use]
    pub fn total_pages(&self) -> u32 {
        let size = u64::from(self.page_size.max(1));
        let pages = self.total.div_ceil(size).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub const fn has_prev(&self) -> bool {
        self.page > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}
