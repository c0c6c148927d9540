//! Cartwheel Core - Shared types library.
//!
//! This crate provides the value types shared by every Cartwheel component:
//! - `storefront` - Catalog, cart, checkout and the HTTP surface
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP.
//! Database encoding is opt-in through the `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, usernames, prices and quantities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
