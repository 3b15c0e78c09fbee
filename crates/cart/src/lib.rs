//! TasteTrove cart reconciliation engine.
//!
//! One cart view for anonymous and signed-in shoppers. Anonymous carts live in
//! device-local storage; signed-in carts live in the storefront's remote cart
//! store, with edits applied optimistically and written back in debounced
//! batches.
//!
//! # Modules
//!
//! - [`engine`] - [`CartEngine`], the reconciliation state machine
//! - [`snapshot`] - Cart line set and pending-write queue
//! - [`catalog`] - Catalog lookup and totals computation
//! - [`ports`] - Remote store and local storage traits
//! - [`memory`], [`file`], [`http`] - Adapters for the ports
//! - [`debounce`] - Single-slot deferred task
//! - [`config`] - Environment-driven engine configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use tastetrove_cart::{CartEngine, Catalog, EngineConfig, FileStorage, HttpCartStore};
//! use tastetrove_core::ProductId;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = HttpCartStore::new("http://127.0.0.1:3000")?;
//! let local = FileStorage::new("cart.json");
//! let engine = CartEngine::start(remote, local, Catalog::default(), None, EngineConfig::from_env()?).await;
//!
//! engine.edit_cart(ProductId::parse("smoked-paprika")?, 2);
//! println!("{} items", engine.totals().quantity);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod event;
pub mod file;
pub mod http;
pub mod memory;
pub mod ports;
pub mod snapshot;

pub use catalog::{CartTotals, Catalog, CatalogLookup, get_totals};
pub use config::{ConfigError, EngineConfig, SignInPolicy};
pub use debounce::Debouncer;
pub use engine::CartEngine;
pub use event::{CartEvent, CartView};
pub use file::FileStorage;
pub use http::{HttpCartStore, HttpCatalogClient, SessionUser};
pub use memory::{MemoryCartStore, MemoryStorage, RemoteCall};
pub use ports::{LocalCartStorage, RemoteCartStore, RemoteError};
pub use snapshot::{CartSnapshot, PendingWrites};
