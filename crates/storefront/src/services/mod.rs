//! Business logic services for storefront.
//!
//! # Services
//!
//! - `auth` - Account signup and password login
//! - `catalog` - Product lookup and pagination
//! - `cart` - Cart protocol: add, remove, view, total, checkout

pub mod auth;
pub mod cart;
pub mod catalog;

pub use auth::{AuthError, AuthService};
pub use cart::{
    CartError, CartService, CartStore, MemoryCartStore, MemorySessionCart, SessionCartCache,
    StoreError,
};
pub use catalog::{CachedCatalog, Catalog, CatalogError, MemoryCatalog};
