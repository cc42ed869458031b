//! Menu catalog for The Counter POS.
//!
//! Holds menu items and categories in memory. Persistence is the caller's
//! job: `PosService` writes each change to the catalog store first and only
//! then applies it here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PosError, PosResult};
use crate::models::{Category, MenuItem};

/// Items seeded on first start when the store has no menu yet.
pub fn default_menu() -> Vec<MenuItem> {
    [("1", "Espresso", 120.0), ("2", "Cappuccino", 160.0), ("3", "Green Tea", 100.0)]
        .into_iter()
        .map(|(id, name, price)| MenuItem {
            id: id.into(),
            name: name.into(),
            price,
            category: if name == "Green Tea" { "Tea" } else { "Coffee" }.into(),
            available: true,
            description: None,
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMenuItem {
    pub name: String,
    pub price: f64,
    #[serde(default, alias = "category_id")]
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewMenuItem {
    pub fn into_item(self) -> PosResult<MenuItem> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(PosError::Validation("menu item name is required".into()));
        }
        validate_price(self.price)?;
        Ok(MenuItem {
            id: format!("item-{}", Uuid::new_v4()),
            name,
            price: self.price,
            category: self.category.trim().to_string(),
            available: true,
            description: self.description,
        })
    }
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MenuItemPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, alias = "category_id")]
    pub category: Option<String>,
    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

impl MenuItemPatch {
    pub fn apply(&self, item: &MenuItem) -> PosResult<MenuItem> {
        let mut next = item.clone();
        if let Some(name) = &self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(PosError::Validation("menu item name is required".into()));
            }
            next.name = name.to_string();
        }
        if let Some(price) = self.price {
            validate_price(price)?;
            next.price = price;
        }
        if let Some(category) = &self.category {
            next.category = category.trim().to_string();
        }
        if let Some(available) = self.available {
            next.available = available;
        }
        if let Some(description) = &self.description {
            next.description = Some(description.clone());
        }
        Ok(next)
    }
}

fn validate_price(price: f64) -> PosResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(PosError::Validation(format!(
            "menu item price must be a non-negative number, got {price}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MenuCatalog {
    items: Vec<MenuItem>,
    categories: Vec<Category>,
}

impl MenuCatalog {
    pub fn new(items: Vec<MenuItem>, categories: Vec<Category>) -> Self {
        Self { items, categories }
    }

    pub fn get(&self, id: &str) -> Option<&MenuItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    /// Items in `category`, or every item when `category` is `None`.
    pub fn items_in(&self, category: Option<&str>) -> Vec<MenuItem> {
        self.items
            .iter()
            .filter(|item| category.map_or(true, |c| item.category == c))
            .cloned()
            .collect()
    }

    pub fn available_items(&self, category: Option<&str>) -> Vec<MenuItem> {
        self.items_in(category)
            .into_iter()
            .filter(|item| item.available)
            .collect()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Insert or replace by id.
    pub fn replace_item(&mut self, item: MenuItem) {
        match self.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    pub fn remove_item(&mut self, id: &str) -> Option<MenuItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn replace_category(&mut self, category: Category) {
        match self.categories.iter_mut().find(|c| c.id == category.id) {
            Some(existing) => *existing = category,
            None => self.categories.push(category),
        }
    }

    pub fn remove_category(&mut self, id: &str) -> Option<Category> {
        let index = self.categories.iter().position(|c| c.id == id)?;
        Some(self.categories.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{espresso, green_tea};

    #[test]
    fn test_default_menu_matches_counter_seed() {
        let menu = default_menu();
        assert_eq!(menu.len(), 3);
        assert_eq!(menu[0].name, "Espresso");
        assert_eq!(menu[0].price, 120.0);
        assert_eq!(menu[2].category, "Tea");
    }

    #[test]
    fn test_new_item_validation() {
        let ok = NewMenuItem {
            name: "  Veg Momo ".into(),
            price: 90.0,
            category: "Food".into(),
            description: None,
        }
        .into_item()
        .expect("valid item");
        assert_eq!(ok.name, "Veg Momo");
        assert!(ok.id.starts_with("item-"));
        assert!(ok.available);

        let negative = NewMenuItem {
            name: "Bad".into(),
            price: -1.0,
            category: String::new(),
            description: None,
        };
        assert!(matches!(negative.into_item(), Err(PosError::Validation(_))));

        let unnamed = NewMenuItem {
            name: "   ".into(),
            price: 1.0,
            category: String::new(),
            description: None,
        };
        assert!(unnamed.into_item().is_err());
    }

    #[test]
    fn test_patch_keeps_unspecified_fields() {
        let patch = MenuItemPatch {
            price: Some(150.0),
            ..Default::default()
        };
        let updated = patch.apply(&espresso()).unwrap();
        assert_eq!(updated.price, 150.0);
        assert_eq!(updated.name, "Espresso");
        assert_eq!(updated.category, "Coffee");

        let bad = MenuItemPatch {
            price: Some(f64::NAN),
            ..Default::default()
        };
        assert!(bad.apply(&espresso()).is_err());
    }

    #[test]
    fn test_filters_by_category_and_availability() {
        let mut tea = green_tea();
        tea.available = false;
        let catalog = MenuCatalog::new(vec![espresso(), tea], vec![]);
        assert_eq!(catalog.items_in(Some("Tea")).len(), 1);
        assert_eq!(catalog.available_items(Some("Tea")).len(), 0);
        assert_eq!(catalog.available_items(None).len(), 1);
    }

    #[test]
    fn test_replace_and_remove() {
        let mut catalog = MenuCatalog::default();
        catalog.replace_item(espresso());
        let mut updated = espresso();
        updated.name = "Double Espresso".into();
        catalog.replace_item(updated);
        assert_eq!(catalog.items().len(), 1);
        assert_eq!(catalog.get("1").unwrap().name, "Double Espresso");
        assert!(catalog.remove_item("1").is_some());
        assert!(catalog.remove_item("1").is_none());
    }
}
