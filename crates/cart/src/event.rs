//! Change notifications published by the engine.

use serde::Serialize;
use tastetrove_core::{CartLine, UserId};

use crate::catalog::CartTotals;

/// Something observable changed inside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartEvent {
    /// Cart lines changed; totals have been recomputed.
    CartChanged,
    /// The pending-write queue changed.
    PendingChanged,
    /// The active identity changed.
    IdentityChanged(Option<UserId>),
    /// The catalog was replaced; totals have been recomputed.
    CatalogChanged,
    /// A batch of `sent` updates reached the remote store.
    Flushed { sent: usize },
    /// A remote write failed; pending writes were kept.
    FlushFailed,
}

/// Read-only view of the engine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub totals: CartTotals,
    pub identity: Option<UserId>,
    /// Number of products with unflushed remote writes.
    pub pending: usize,
}
