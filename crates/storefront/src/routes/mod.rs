//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                       - Liveness
//! GET  /health/ready                 - Database connectivity
//!
//! # Catalog
//! GET  /api/products                 - Product listing
//! GET  /api/products/{id}            - Product detail
//!
//! # Remote cart (requires auth, own cart only)
//! GET  /api/users/{user_id}/cart     - Cart lines
//! PUT  /api/users/{user_id}/cart     - Batch absolute-set updates
//!
//! # Auth
//! POST /api/auth/register            - Create account, start session
//! POST /api/auth/login               - Start session
//! POST /api/auth/logout              - End session
//! GET  /api/auth/me                  - Current user
//! ```

pub mod auth;
pub mod cart;
pub mod health;
pub mod products;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the auth API routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/products", product_routes())
        .route(
            "/api/users/{user_id}/cart",
            get(cart::show).put(cart::update),
        )
        .nest("/api/auth", auth_routes())
}
