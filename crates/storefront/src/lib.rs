//! Cartwheel Storefront library.
//!
//! Catalog browsing, per-user carts kept in sync across the database and the
//! session, and checkout. The binary in `main.rs` wires this up to Postgres;
//! tests drive the same router with in-memory backends.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
