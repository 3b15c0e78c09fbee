//! TasteTrove Core - Shared types library.
//!
//! This crate provides the types shared by all TasteTrove components:
//! - `cart` - Cart reconciliation engine used by storefront clients
//! - `storefront` - JSON REST backend (catalog, remote carts, accounts)
//! - `cli` - Migrations and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, emails, and cart lines

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
