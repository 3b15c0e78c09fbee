//! Catalog lookup and cart totals.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tastetrove_core::{Price, Product, ProductId};

use crate::snapshot::CartSnapshot;

/// Read access to product data owned by the catalog service.
pub trait CatalogLookup: Send + Sync {
    /// Look up a product; `None` if the catalog does not know it.
    fn get(&self, product_id: &ProductId) -> Option<Product>;

    /// Unit price of a product, if known.
    fn price(&self, product_id: &ProductId) -> Option<Price> {
        self.get(product_id).map(|product| product.price)
    }
}

impl<T: CatalogLookup + ?Sized> CatalogLookup for Arc<T> {
    fn get(&self, product_id: &ProductId) -> Option<Product> {
        (**self).get(product_id)
    }

    fn price(&self, product_id: &ProductId) -> Option<Price> {
        (**self).price(product_id)
    }
}

/// In-memory catalog keyed by product ID.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: HashMap<ProductId, Product>,
}

impl Catalog {
    /// Build a catalog; a later product with the same ID replaces an earlier one.
    pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub fn insert(&mut self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl CatalogLookup for Catalog {
    fn get(&self, product_id: &ProductId) -> Option<Product> {
        self.products.get(product_id).cloned()
    }

    fn price(&self, product_id: &ProductId) -> Option<Price> {
        self.products.get(product_id).map(|p| p.price)
    }
}

/// Aggregate quantity and price of a cart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub quantity: u64,
    pub price: Price,
}

/// Compute cart totals with a full pass over the lines.
///
/// Products missing from the catalog count toward `quantity` but add nothing
/// to `price`. The price is rounded to cents, half-up, after summing.
pub fn get_totals(cart: &CartSnapshot, catalog: &(impl CatalogLookup + ?Sized)) -> CartTotals {
    let quantity = cart.iter().map(|(_, q)| u64::from(q)).sum();
    let price = cart
        .iter()
        .filter_map(|(id, q)| catalog.price(id).map(|unit| unit.times(q)))
        .sum::<Price>()
        .round_to_cents();

    CartTotals { quantity, price }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use tastetrove_core::CartLine;

    use super::*;

    fn pid(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    fn product(id: &str, price: Decimal) -> Product {
        Product {
            id: pid(id),
            name: id.to_uppercase(),
            description: None,
            price: Price::new(price),
            image_url: None,
        }
    }

    #[test]
    fn test_totals_round_half_up() {
        let catalog = Catalog::new([
            product("a", Decimal::new(1000, 2)),
            product("b", Decimal::new(2505, 3)),
        ]);
        let cart = CartSnapshot::from_lines([CartLine::new(pid("a"), 2), CartLine::new(pid("b"), 1)]);

        let totals = get_totals(&cart, &catalog);
        assert_eq!(totals.quantity, 3);
        assert_eq!(totals.price.amount(), Decimal::new(2251, 2));
    }

    #[test]
    fn test_totals_missing_product_contributes_zero_price() {
        let catalog = Catalog::new([product("a", Decimal::new(350, 2))]);
        let cart =
            CartSnapshot::from_lines([CartLine::new(pid("a"), 1), CartLine::new(pid("gone"), 4)]);

        let totals = get_totals(&cart, &catalog);
        assert_eq!(totals.quantity, 5);
        assert_eq!(totals.price, Price::from_cents(350));
    }

    #[test]
    fn test_totals_empty_cart() {
        let totals = get_totals(&CartSnapshot::new(), &Catalog::default());
        assert_eq!(totals, CartTotals::default());
    }

    #[test]
    fn test_arc_dyn_lookup() {
        let catalog: Arc<dyn CatalogLookup> = Arc::new(Catalog::new([product("a", Decimal::ONE)]));
        assert_eq!(catalog.price(&pid("a")), Some(Price::new(Decimal::ONE)));
        assert!(catalog.get(&pid("b")).is_none());
    }
}
