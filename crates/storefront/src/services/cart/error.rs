//! Cart service errors.

use thiserror::Error;

use cartwheel_core::ProductId;

use super::StoreError;
use crate::services::CatalogError;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// No authenticated identity was supplied.
    #[error("login required")]
    Unauthorized,

    /// The product does not exist in the catalog.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("cart store error: {0}")]
    Store(#[from] StoreError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}
