//! Core types for TasteTrove.
//!
//! Type-safe wrappers for identifiers, prices, emails, products and the cart
//! wire format.

pub mod cart;
pub mod email;
pub mod id;
pub mod price;
pub mod product;

pub use cart::{CartBody, CartLine, CartUpdateBody, LineUpdate};
pub use email::{Email, EmailError};
pub use id::{ProductId, ProductIdError, UserId};
pub use price::Price;
pub use product::Product;
