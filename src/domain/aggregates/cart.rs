//! Cart Aggregate
//!
//! One type serves both the guest cart kept in local storage and the account cart kept in the
//! remote `cart` document. Entries are keyed by product title: two catalog records sharing a
//! title are the same line item.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::domain::aggregates::product::ProductSnapshot;
use crate::domain::value_objects::{Money, Quantity};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartEntry {
    #[serde(flatten)]
    pub product: ProductSnapshot,
    pub quantity: Quantity,
}

impl CartEntry {
    pub fn new(product: ProductSnapshot, quantity: Quantity) -> Self { Self { product, quantity } }
    pub fn title(&self) -> &str { &self.product.title }
    pub fn unit_price(&self, currency: &str) -> Money { Money::new(self.product.price, currency) }
    pub fn line_total(&self, currency: &str) -> Money { self.unit_price(currency).multiply(self.quantity) }
}

/// Aggregates shown on cart badges and the order summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub quantity: u64,
    pub price: Money,
}

impl CartTotals {
    pub fn empty(currency: &str) -> Self { Self { quantity: 0, price: Money::zero(currency) } }
}

/// What a merge did to the receiving cart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub combined: usize,
    pub appended: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cart {
    entries: Vec<CartEntry>,
    currency: String,
    totals: CartTotals,
}

impl Cart {
    pub fn new(currency: &str) -> Self {
        Self { entries: vec![], currency: currency.to_string(), totals: CartTotals::empty(currency) }
    }

    /// Builds a cart from stored entries, folding any repeated titles into one line.
    pub fn from_entries(entries: Vec<CartEntry>, currency: &str) -> Self {
        let mut cart = Self::new(currency);
        for entry in entries { cart.upsert(entry); }
        cart.recalculate();
        cart
    }

    pub fn entries(&self) -> &[CartEntry] { &self.entries }
    pub fn into_entries(self) -> Vec<CartEntry> { self.entries }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn totals(&self) -> &CartTotals { &self.totals }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn get(&self, title: &str) -> Option<&CartEntry> { self.entries.iter().find(|e| e.title() == title) }

    /// Adds the entry, or adds its quantity to an existing line with the same title.
    pub fn add_or_update(&mut self, entry: CartEntry) {
        self.upsert(entry);
        self.recalculate();
    }

    pub fn remove(&mut self, title: &str) -> Result<(), CartError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.title() != title);
        if self.entries.len() == before { return Err(CartError::ItemNotFound(title.to_string())); }
        self.recalculate();
        Ok(())
    }

    /// Sets an absolute quantity; anything below one becomes one.
    pub fn set_quantity(&mut self, title: &str, quantity: i64) -> Result<(), CartError> {
        self.entry_mut(title)?.quantity = Quantity::new(quantity);
        self.recalculate();
        Ok(())
    }

    pub fn increase(&mut self, title: &str) -> Result<(), CartError> {
        let entry = self.entry_mut(title)?;
        entry.quantity = entry.quantity.increment();
        self.recalculate();
        Ok(())
    }

    pub fn decrease(&mut self, title: &str) -> Result<(), CartError> {
        let entry = self.entry_mut(title)?;
        entry.quantity = entry.quantity.decrement();
        self.recalculate();
        Ok(())
    }

    pub fn clear(&mut self) { self.entries.clear(); self.recalculate(); }

    /// Folds `other` into this cart: matching titles sum their quantities, new titles are
    /// appended in the order they appear in `other`.
    pub fn merge_from(&mut self, other: &Cart) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for entry in other.entries() {
            if self.get(entry.title()).is_some() { outcome.combined += 1; } else { outcome.appended += 1; }
            self.upsert(entry.clone());
        }
        self.recalculate();
        outcome
    }

    fn upsert(&mut self, entry: CartEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.title() == entry.title()) {
            existing.quantity = existing.quantity.saturating_add(entry.quantity);
        } else {
            self.entries.push(entry);
        }
    }

    fn entry_mut(&mut self, title: &str) -> Result<&mut CartEntry, CartError> {
        self.entries.iter_mut().find(|e| e.title() == title).ok_or_else(|| CartError::ItemNotFound(title.to_string()))
    }

    fn recalculate(&mut self) {
        let currency = self.currency.clone();
        self.totals = self.entries.iter().fold(CartTotals::empty(&currency), |acc, e| CartTotals {
            quantity: acc.quantity + u64::from(e.quantity.get()),
            price: acc.price.add(&e.line_total(&currency)).unwrap_or(acc.price),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart has no item titled {0:?}")]
    ItemNotFound(String),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal::Decimal;

    pub(crate) fn snapshot(title: &str, price: i64) -> ProductSnapshot {
        ProductSnapshot {
            id: 0, title: title.into(), price: Decimal::new(price, 0), description: String::new(),
            category: "misc".into(), brand: None, thumbnail: String::new(), images: vec![],
            discount_percentage: 0.0, rating: 4.0, stock: 10,
        }
    }

    pub(crate) fn entry(title: &str, price: i64, qty: i64) -> CartEntry { CartEntry::new(snapshot(title, price), Quantity::new(qty)) }

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::new("INR");
        cart.add_or_update(entry("Widget", 10, 2));
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.totals().price.amount(), Decimal::new(20, 0));
        cart.add_or_update(entry("Widget", 10, 1));
        assert_eq!(cart.entries()[0].quantity.get(), 3); // Merged
        cart.add_or_update(entry("Gadget", 5, 1));
        assert_eq!(cart.totals().quantity, 4);
        assert_eq!(cart.totals().price.amount(), Decimal::new(35, 0));
        cart.remove("Widget").unwrap();
        assert_eq!(cart.totals().quantity, 1);
        assert_eq!(cart.remove("Widget"), Err(CartError::ItemNotFound("Widget".into())));
    }

    #[test]
    fn test_set_quantity_clamps_to_one() {
        let mut cart = Cart::new("INR");
        cart.add_or_update(entry("A", 10, 3));
        cart.set_quantity("A", 0).unwrap();
        assert_eq!(cart.get("A").unwrap().quantity.get(), 1);
        cart.set_quantity("A", -4).unwrap();
        assert_eq!(cart.get("A").unwrap().quantity.get(), 1);
        cart.decrease("A").unwrap();
        assert_eq!(cart.get("A").unwrap().quantity.get(), 1);
        cart.increase("A").unwrap();
        assert_eq!(cart.get("A").unwrap().quantity.get(), 2);
    }

    #[test]
    fn test_merge_sums_matching_titles() {
        let mut remote = Cart::from_entries(vec![entry("A", 10, 3), entry("B", 1, 1)], "INR");
        let local = Cart::from_entries(vec![entry("A", 10, 2), entry("C", 7, 4)], "INR");
        let before = remote.totals().quantity + local.totals().quantity;

        let outcome = remote.merge_from(&local);

        assert_eq!(outcome, MergeOutcome { combined: 1, appended: 1 });
        let titles: Vec<&str> = remote.entries().iter().map(CartEntry::title).collect();
        assert_eq!(titles, ["A", "B", "C"]);
        assert_eq!(remote.get("A").unwrap().quantity.get(), 5);
        assert_eq!(remote.totals().quantity, before);
    }

    #[test]
    fn test_from_entries_folds_duplicate_titles() {
        let cart = Cart::from_entries(vec![entry("A", 10, 1), entry("A", 10, 2)], "INR");
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.get("A").unwrap().quantity.get(), 3);
    }

    #[test]
    fn test_entry_wire_shape_is_flat() {
        let json = serde_json::to_value(entry("A", 10, 2)).unwrap();
        assert_eq!(json["title"], "A");
        assert_eq!(json["quantity"], 2);
        assert!(json.get("product").is_none());
    }
}
