//! Cart wire types shared by the storefront API and the cart engine.

use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// One product/quantity pair in a cart.
///
/// A stored cart never contains a line with `quantity == 0`; consumers that
/// read lines from untrusted sources (local storage, the network) drop such
/// lines instead of keeping them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartLine {
    /// Create a cart line.
    #[must_use]
    pub const fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// One entry of a batch cart write.
///
/// Absolute-set semantics: `quantity` replaces whatever is stored for the
/// product, and `0` deletes the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineUpdate {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl LineUpdate {
    /// Create a line update.
    #[must_use]
    pub const fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }

    /// Whether this update deletes the line.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        self.quantity == 0
    }
}

/// Body of `GET`/`PUT /api/users/{id}/cart` responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartBody {
    pub lines: Vec<CartLine>,
}

/// Body of `PUT /api/users/{id}/cart` requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartUpdateBody {
    pub updates: Vec<LineUpdate>,
}
