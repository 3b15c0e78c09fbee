//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transactions)
//! 2. `TraceLayer` (request span carrying the request ID)
//! 3. Request ID (propagate or generate `x-request-id`)
//! 4. CORS (only when `STOREFRONT_CORS_ORIGIN` is set)
//! 5. Session layer (tower-sessions with `PostgreSQL` store)

pub mod auth;
pub mod request_id;
pub mod session;

pub use auth::{OptionalAuth, RequireAuth, clear_current_user, set_current_user};
pub use request_id::{make_request_span, request_id_middleware};
pub use session::create_session_layer;
