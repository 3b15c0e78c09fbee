//! Ports the engine talks through.
//!
//! The engine never touches the network or disk directly; it is handed a
//! [`RemoteCartStore`] and a [`LocalCartStorage`] at construction. The
//! in-memory adapters in [`crate::memory`] stand in for both in tests.

use std::future::Future;

use tastetrove_core::{CartLine, LineUpdate, UserId};
use thiserror::Error;

/// Errors from a remote cart store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed or the response body could not be decoded.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("unexpected status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Request URL could not be built.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The store is unreachable or refused the operation.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    /// Whether the store refused the request itself, so re-sending it
    /// cannot succeed.
    ///
    /// Client errors count, except those that can clear up on their own:
    /// 401/403 (session), 408 (timeout) and 429 (rate limit).
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                *status >= 400 && *status < 500 && !matches!(*status, 401 | 403 | 408 | 429)
            }
            Self::Http(_) | Self::Url(_) | Self::Unavailable(_) => false,
        }
    }
}

/// Server-side cart storage for signed-in users.
pub trait RemoteCartStore: Send + Sync + 'static {
    /// Fetch every line of the user's cart.
    fn fetch(&self, user: UserId)
    -> impl Future<Output = Result<Vec<CartLine>, RemoteError>> + Send;

    /// Apply a batch of absolute-set updates (`quantity == 0` deletes).
    fn write(
        &self,
        user: UserId,
        updates: Vec<LineUpdate>,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// Device-local cart persistence.
///
/// Synchronous and infallible from the engine's point of view: adapters log
/// their own I/O failures, and unreadable content reads as absent.
pub trait LocalCartStorage: Send + Sync + 'static {
    /// Read the stored cart; `None` if nothing usable is stored.
    fn read(&self) -> Option<Vec<CartLine>>;

    /// Replace the stored cart.
    fn write(&self, lines: &[CartLine]);

    /// Remove the stored cart.
    fn clear(&self);
}

/// Decode stored cart JSON, treating malformed content as absent.
pub(crate) fn decode_lines(raw: &str) -> Option<Vec<CartLine>> {
    match serde_json::from_str::<Vec<CartLine>>(raw) {
        Ok(lines) => Some(lines),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed local cart");
            None
        }
    }
}

/// Encode cart lines for local storage.
pub(crate) fn encode_lines(lines: &[CartLine]) -> Option<String> {
    serde_json::to_string(lines)
        .inspect_err(|e| tracing::error!(error = %e, "Failed to encode local cart"))
        .ok()
}
