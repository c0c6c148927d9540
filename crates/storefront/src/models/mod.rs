//! Domain models for storefront.
//!
//! These are validated domain objects, separate from database row types.

pub mod cart;
pub mod product;
pub mod session;
pub mod user;

pub use cart::{CartItem, CartLine, CartSummary, CheckoutReceipt, SessionCartView};
pub use product::{CatalogPage, Product};
pub use session::{CurrentUser, keys as session_keys};
pub use user::User;
