//! In-progress order for one terminal or customer session.
//!
//! Lines reference menu items by id. The name and price on a line mirror the
//! menu item as last seen and are only frozen into value copies at checkout.

use serde::{Deserialize, Serialize};

use crate::menu::MenuCatalog;
use crate::models::{MenuItem, OrderItem};
use crate::pricing::{self, Totals};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the line for `item`, inserting it with quantity 1 if absent.
    pub fn add(&mut self, item: &MenuItem) {
        if let Some(line) = self.line_mut(&item.id) {
            line.quantity = line.quantity.saturating_add(1);
            return;
        }
        self.lines.push(CartLine {
            item_id: item.id.clone(),
            name: item.name.clone(),
            price: item.price,
            quantity: 1,
        });
    }

    /// Set a line's quantity; zero or negative removes it. Unknown ids are ignored.
    pub fn set_quantity(&mut self, item_id: &str, quantity: i64) {
        if quantity <= 0 {
            self.remove(item_id);
            return;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        if let Some(line) = self.line_mut(item_id) {
            line.quantity = quantity;
        }
    }

    pub fn decrement(&mut self, item_id: &str) {
        if let Some(current) = self.quantity_of(item_id) {
            self.set_quantity(item_id, i64::from(current) - 1);
        }
    }

    pub fn remove(&mut self, item_id: &str) {
        self.lines.retain(|line| line.item_id != item_id);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Refresh names and prices from the catalog and drop lines whose item
    /// was deleted.
    pub fn reprice(&mut self, catalog: &MenuCatalog) {
        self.lines.retain_mut(|line| match catalog.get(&line.item_id) {
            Some(item) => {
                line.name = item.name.clone();
                line.price = item.price;
                true
            }
            None => false,
        });
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across all lines.
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    pub fn quantity_of(&self, item_id: &str) -> Option<u32> {
        self.lines
            .iter()
            .find(|l| l.item_id == item_id)
            .map(|l| l.quantity)
    }

    pub fn totals(&self, tax_rate_percent: f64) -> Totals {
        pricing::compute(&self.lines, tax_rate_percent)
    }

    /// Value copies of every line, as frozen into an order.
    pub fn snapshot(&self) -> Vec<OrderItem> {
        self.lines
            .iter()
            .map(|line| OrderItem {
                id: line.item_id.clone(),
                name: line.name.clone(),
                price: line.price,
                quantity: line.quantity,
            })
            .collect()
    }

    fn line_mut(&mut self, item_id: &str) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|l| l.item_id == item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{espresso, green_tea};

    #[test]
    fn test_repeated_add_aggregates_per_item() {
        let mut cart = Cart::new();
        let sequence = [espresso(), green_tea(), espresso(), espresso(), green_tea()];
        for item in &sequence {
            cart.add(item);
        }
        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.quantity_of("1"), Some(3));
        assert_eq!(cart.quantity_of("3"), Some(2));
        assert_eq!(cart.item_count(), 5);
        // First-added item keeps its position.
        assert_eq!(cart.lines()[0].item_id, "1");
    }

    #[test]
    fn test_set_quantity_zero_or_negative_removes() {
        let mut cart = Cart::new();
        cart.add(&espresso());
        cart.add(&green_tea());

        cart.set_quantity("1", 4);
        assert_eq!(cart.quantity_of("1"), Some(4));

        cart.set_quantity("1", 0);
        assert_eq!(cart.quantity_of("1"), None);

        cart.set_quantity("3", -2);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity_unknown_item_is_noop() {
        let mut cart = Cart::new();
        cart.add(&espresso());
        cart.set_quantity("missing", 3);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of("missing"), None);
    }

    #[test]
    fn test_decrement_to_zero_removes_line() {
        let mut cart = Cart::new();
        cart.add(&espresso());
        cart.add(&espresso());
        cart.decrement("1");
        assert_eq!(cart.quantity_of("1"), Some(1));
        cart.decrement("1");
        assert!(cart.is_empty());
        cart.decrement("1");
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = Cart::new();
        cart.add(&espresso());
        cart.add(&green_tea());
        cart.remove("missing");
        assert_eq!(cart.lines().len(), 2);
        cart.remove("1");
        assert_eq!(cart.lines().len(), 1);
        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_totals_follow_lines() {
        let mut cart = Cart::new();
        cart.add(&espresso());
        cart.add(&espresso());
        let totals = cart.totals(5.0);
        assert_eq!(totals.subtotal, 240.0);
        assert_eq!(totals.total, 252.0);
    }

    #[test]
    fn test_reprice_refreshes_and_drops_deleted_items() {
        let mut catalog = MenuCatalog::new(vec![espresso(), green_tea()], vec![]);
        let mut cart = Cart::new();
        cart.add(&espresso());
        cart.add(&green_tea());

        let mut repriced = espresso();
        repriced.price = 150.0;
        catalog.replace_item(repriced);
        catalog.remove_item("3");

        cart.reprice(&catalog);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].price, 150.0);
    }

    #[test]
    fn test_snapshot_is_a_value_copy() {
        let mut cart = Cart::new();
        cart.add(&espresso());
        let snapshot = cart.snapshot();
        cart.set_quantity("1", 9);
        assert_eq!(snapshot[0].quantity, 1);
        assert_eq!(snapshot[0].price, 120.0);
    }
}
