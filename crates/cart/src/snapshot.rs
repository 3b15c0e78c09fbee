//! In-memory cart line set and the queue of unflushed remote edits.

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use tastetrove_core::{CartLine, LineUpdate, ProductId};

/// The set of lines currently in a cart.
///
/// At most one line per product; a quantity of zero is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartSnapshot {
    lines: BTreeMap<ProductId, NonZeroU32>,
}

impl CartSnapshot {
    /// An empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from untrusted lines.
    ///
    /// Zero-quantity lines are dropped and a later duplicate of a product
    /// replaces an earlier one.
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut snapshot = Self::new();
        for line in lines {
            snapshot.set(line.product_id, line.quantity);
        }
        snapshot
    }

    /// Set the absolute quantity for a product; `0` removes the line.
    ///
    /// Returns `true` if the cart changed.
    pub fn set(&mut self, product_id: ProductId, quantity: u32) -> bool {
        match NonZeroU32::new(quantity) {
            Some(quantity) => self.lines.insert(product_id, quantity) != Some(quantity),
            None => self.lines.remove(&product_id).is_some(),
        }
    }

    /// Quantity of a product, `0` if absent.
    #[must_use]
    pub fn quantity(&self, product_id: &ProductId) -> u32 {
        self.lines.get(product_id).map_or(0, |q| q.get())
    }

    /// Iterate `(product, quantity)` pairs in product order.
    pub fn iter(&self) -> impl Iterator<Item = (&ProductId, u32)> {
        self.lines.iter().map(|(id, q)| (id, q.get()))
    }

    /// The lines as wire values.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.iter()
            .map(|(id, quantity)| CartLine::new(id.clone(), quantity))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Latest desired quantity per product, not yet written to the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingWrites {
    entries: BTreeMap<ProductId, u32>,
}

impl PendingWrites {
    /// Record the latest desired quantity, replacing any earlier one.
    pub fn record(&mut self, product_id: ProductId, quantity: u32) {
        self.entries.insert(product_id, quantity);
    }

    /// Desired quantity for a product, if one is queued.
    #[must_use]
    pub fn get(&self, product_id: &ProductId) -> Option<u32> {
        self.entries.get(product_id).copied()
    }

    /// The whole queue as one batch.
    #[must_use]
    pub fn to_updates(&self) -> Vec<LineUpdate> {
        self.entries
            .iter()
            .map(|(id, quantity)| LineUpdate::new(id.clone(), *quantity))
            .collect()
    }

    /// Drop entries confirmed by a successful write.
    ///
    /// An entry is only removed if it still holds the value that was sent, so
    /// an edit queued while the write was in flight survives for the next
    /// flush. Returns the number of entries removed.
    pub fn acknowledge(&mut self, sent: &[LineUpdate]) -> usize {
        let before = self.entries.len();
        for update in sent {
            if self.entries.get(&update.product_id) == Some(&update.quantity) {
                self.entries.remove(&update.product_id);
            }
        }
        before - self.entries.len()
    }

    /// Iterate `(product, quantity)` pairs in product order.
    pub fn iter(&self) -> impl Iterator<Item = (&ProductId, u32)> {
        self.entries.iter().map(|(id, q)| (id, *q))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
