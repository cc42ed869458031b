//! JSON snapshot store, the degraded fallback backend.
//!
//! Each collection lives in its own file under the data directory
//! (`pos_menu.json`, `pos_orders.json`, `pos_outlet.json`,
//! `pos_categories.json`, `pos_cart.json`). Files are read at open and
//! rewritten (temp file + rename) on every mutation. Order reads pick up
//! writes made by other processes by checking the file's modification stamp.
//! Order rows that fail to load are kept verbatim and written back with every
//! rewrite, so a bad row is never lost.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use super::{
    check_expected, sort_newest_first, CartStore, CatalogStore, NewOrder, OrderFilter,
    OrderPatch, OrderStore,
};
use crate::cart::Cart;
use crate::error::{PosError, PosResult};
use crate::models::{Category, MenuItem, Order, OrderStatus};
use crate::outlet::OutletProfile;

const KEY_MENU: &str = "pos_menu";
const KEY_ORDERS: &str = "pos_orders";
const KEY_OUTLET: &str = "pos_outlet";
const KEY_CATEGORIES: &str = "pos_categories";
const KEY_CART: &str = "pos_cart";

#[derive(Debug, Default)]
struct LocalState {
    menu: Option<Vec<MenuItem>>,
    categories: Vec<Category>,
    orders: Vec<Order>,
    /// Raw rows that did not load as orders.
    unreadable_orders: Vec<Value>,
    outlet: Option<OutletProfile>,
    orders_stamp: Option<(SystemTime, u64)>,
}

pub struct LocalStore {
    dir: PathBuf,
    state: Mutex<LocalState>,
}

impl LocalStore {
    pub fn open(dir: &Path) -> PosResult<Self> {
        fs::create_dir_all(dir)?;
        let store = Self {
            dir: dir.to_path_buf(),
            state: Mutex::new(LocalState::default()),
        };
        {
            let mut state = store.lock()?;
            state.menu = read_json(&store.path(KEY_MENU))?;
            state.categories = read_json(&store.path(KEY_CATEGORIES))?.unwrap_or_default();
            state.outlet = read_json(&store.path(KEY_OUTLET))?;
            store.reload_orders(&mut state)?;
            info!(
                dir = %dir.display(),
                orders = state.orders.len(),
                "Local store loaded"
            );
        }
        Ok(store)
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn lock(&self) -> PosResult<MutexGuard<'_, LocalState>> {
        self.state
            .lock()
            .map_err(|e| PosError::provider(format!("local store lock poisoned: {e}")))
    }

    fn reload_orders(&self, state: &mut LocalState) -> PosResult<()> {
        let path = self.path(KEY_ORDERS);
        let rows: Vec<Value> = read_json(&path)?.unwrap_or_default();
        let mut orders = Vec::with_capacity(rows.len());
        let mut unreadable = Vec::new();
        for row in rows {
            match serde_json::from_value::<Order>(row.clone()) {
                Ok(order) => match order.validate() {
                    Ok(()) => orders.push(order),
                    Err(e) => {
                        warn!(error = %e, "Skipping invalid stored order");
                        unreadable.push(row);
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Skipping malformed stored order");
                    unreadable.push(row);
                }
            }
        }
        state.orders = orders;
        state.unreadable_orders = unreadable;
        state.orders_stamp = file_stamp(&path);
        Ok(())
    }

    /// Re-read orders when another writer touched the file since our last look.
    fn refresh_orders(&self, state: &mut LocalState) -> PosResult<()> {
        if file_stamp(&self.path(KEY_ORDERS)) != state.orders_stamp {
            debug!("Orders file changed on disk, reloading");
            self.reload_orders(state)?;
        }
        Ok(())
    }

    fn write_orders(&self, state: &mut LocalState, orders: Vec<Order>) -> PosResult<()> {
        let path = self.path(KEY_ORDERS);
        let mut rows = orders
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        rows.extend(state.unreadable_orders.iter().cloned());
        write_json(&path, &rows)?;
        state.orders = orders;
        state.orders_stamp = file_stamp(&path);
        Ok(())
    }
}

fn file_stamp(path: &Path) -> Option<(SystemTime, u64)> {
    let meta = fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> PosResult<Option<T>> {
    match fs::read(path) {
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> PosResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl OrderStore for LocalStore {
    fn insert(&self, order: NewOrder) -> PosResult<Order> {
        let mut state = self.lock()?;
        self.refresh_orders(&mut state)?;
        if state.orders.iter().any(|o| o.id == order.id) {
            return Err(PosError::Validation(format!(
                "order {} already exists",
                order.id
            )));
        }
        // Unreadable rows still hold their numbers.
        let order_no = state
            .orders
            .iter()
            .map(|o| o.order_no)
            .chain(
                state
                    .unreadable_orders
                    .iter()
                    .filter_map(|row| row.get("order_no").and_then(Value::as_u64)),
            )
            .max()
            .unwrap_or(0)
            + 1;
        let order = order.into_order(order_no);

        let mut orders = state.orders.clone();
        orders.push(order.clone());
        self.write_orders(&mut state, orders)?;

        debug!(order_id = %order.id, order_no, "Inserted order");
        Ok(order)
    }

    fn get(&self, id: &str) -> PosResult<Order> {
        let mut state = self.lock()?;
        self.refresh_orders(&mut state)?;
        state
            .orders
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or_else(|| PosError::OrderNotFound(id.to_string()))
    }

    fn update(
        &self,
        id: &str,
        expected: Option<OrderStatus>,
        patch: &OrderPatch,
    ) -> PosResult<Order> {
        let mut state = self.lock()?;
        self.refresh_orders(&mut state)?;
        let index = state
            .orders
            .iter()
            .position(|o| o.id == id)
            .ok_or_else(|| PosError::OrderNotFound(id.to_string()))?;
        check_expected(&state.orders[index], expected, patch)?;

        let mut orders = state.orders.clone();
        patch.apply_to(&mut orders[index]);
        let updated = orders[index].clone();
        self.write_orders(&mut state, orders)?;

        debug!(order_id = %updated.id, status = %updated.status, "Updated order");
        Ok(updated)
    }

    fn list(&self, filter: &OrderFilter) -> PosResult<Vec<Order>> {
        let mut state = self.lock()?;
        self.refresh_orders(&mut state)?;
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        sort_newest_first(&mut orders);
        if let Some(limit) = filter.limit {
            orders.truncate(limit);
        }
        Ok(orders)
    }
}

impl CatalogStore for LocalStore {
    fn load_menu(&self) -> PosResult<Option<Vec<MenuItem>>> {
        Ok(self.lock()?.menu.clone())
    }

    fn save_menu_item(&self, item: &MenuItem) -> PosResult<()> {
        let mut state = self.lock()?;
        let mut menu = state.menu.clone().unwrap_or_default();
        match menu.iter_mut().find(|m| m.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => menu.push(item.clone()),
        }
        write_json(&self.path(KEY_MENU), &menu)?;
        state.menu = Some(menu);
        Ok(())
    }

    fn delete_menu_item(&self, id: &str) -> PosResult<bool> {
        let mut state = self.lock()?;
        let mut menu = state.menu.clone().unwrap_or_default();
        let before = menu.len();
        menu.retain(|m| m.id != id);
        if menu.len() == before {
            return Ok(false);
        }
        write_json(&self.path(KEY_MENU), &menu)?;
        state.menu = Some(menu);
        Ok(true)
    }

    fn load_categories(&self) -> PosResult<Vec<Category>> {
        Ok(self.lock()?.categories.clone())
    }

    fn save_category(&self, category: &Category) -> PosResult<()> {
        let mut state = self.lock()?;
        let mut categories = state.categories.clone();
        match categories.iter_mut().find(|c| c.id == category.id) {
            Some(existing) => *existing = category.clone(),
            None => categories.push(category.clone()),
        }
        write_json(&self.path(KEY_CATEGORIES), &categories)?;
        state.categories = categories;
        Ok(())
    }

    fn delete_category(&self, id: &str) -> PosResult<bool> {
        let mut state = self.lock()?;
        let mut categories = state.categories.clone();
        let before = categories.len();
        categories.retain(|c| c.id != id);
        if categories.len() == before {
            return Ok(false);
        }
        write_json(&self.path(KEY_CATEGORIES), &categories)?;
        state.categories = categories;
        Ok(true)
    }

    fn load_outlet(&self) -> PosResult<Option<OutletProfile>> {
        Ok(self.lock()?.outlet.clone())
    }

    fn save_outlet(&self, outlet: &OutletProfile) -> PosResult<()> {
        let mut state = self.lock()?;
        write_json(&self.path(KEY_OUTLET), outlet)?;
        state.outlet = Some(outlet.clone());
        Ok(())
    }
}

impl CartStore for LocalStore {
    fn load_cart(&self) -> PosResult<Cart> {
        match read_json::<Cart>(&self.path(KEY_CART)) {
            Ok(cart) => Ok(cart.unwrap_or_default()),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable saved cart");
                Ok(Cart::default())
            }
        }
    }

    fn save_cart(&self, cart: &Cart) -> PosResult<()> {
        write_json(&self.path(KEY_CART), cart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Transition;
    use crate::models::fixtures::{espresso, placed_order};
    use crate::models::{OrderItem, PaymentMethod};
    use crate::pricing::Totals;
    use chrono::Utc;

    fn new_order(id: &str) -> NewOrder {
        NewOrder {
            id: id.into(),
            items: vec![OrderItem {
                id: "1".into(),
                name: "Espresso".into(),
                price: 120.0,
                quantity: 1,
            }],
            totals: Totals {
                subtotal: 120.0,
                tax: 6.0,
                total: 126.0,
            },
            tax_rate: 5.0,
            payment_method: PaymentMethod::Card,
            created_at: Utc::now(),
            table_number: None,
        }
    }

    #[test]
    fn test_orders_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalStore::open(dir.path()).unwrap();
            assert_eq!(store.insert(new_order("a")).unwrap().order_no, 1);
            assert_eq!(store.insert(new_order("b")).unwrap().order_no, 2);
        }
        assert!(dir.path().join("pos_orders.json").exists());

        let reopened = LocalStore::open(dir.path()).unwrap();
        let orders = reopened.list(&OrderFilter::all()).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(reopened.insert(new_order("c")).unwrap().order_no, 3);
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.insert(new_order("a")).unwrap();
        assert!(matches!(
            store.insert(new_order("a")),
            Err(PosError::Validation(_))
        ));
        assert_eq!(store.list(&OrderFilter::all()).unwrap().len(), 1);
    }

    #[test]
    fn test_update_checks_persisted_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.insert(new_order("a")).unwrap();
        let now = Utc::now();

        let ready = Transition::MarkReady;
        assert!(matches!(
            store.update("a", Some(ready.source()), &ready.patch(now)),
            Err(PosError::InvalidTransition { .. })
        ));
        let prep = Transition::StartPreparing { eta_minutes: 15 };
        let updated = store
            .update("a", Some(prep.source()), &prep.patch(now))
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Preparing);
        assert!(matches!(
            store.update("zzz", None, &ready.patch(now)),
            Err(PosError::OrderNotFound(_))
        ));
    }

    #[test]
    fn test_second_instance_sees_writes_from_first() {
        let dir = tempfile::tempdir().unwrap();
        let staff = LocalStore::open(dir.path()).unwrap();
        let customer = LocalStore::open(dir.path()).unwrap();

        staff.insert(new_order("a")).unwrap();
        assert_eq!(customer.get("a").unwrap().status, OrderStatus::Placed);

        let prep = Transition::StartPreparing { eta_minutes: 5 };
        staff
            .update("a", Some(prep.source()), &prep.patch(Utc::now()))
            .unwrap();
        assert_eq!(customer.get("a").unwrap().status, OrderStatus::Preparing);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = placed_order("good", 1);
        let rows = serde_json::json!([
            good,
            { "id": "broken" },
            { "id": "zero", "order_no": 0, "items": [], "subtotal": 0, "tax": 0,
              "total": 0, "status": "PLACED", "created_at": "2026-01-01T00:00:00Z" }
        ]);
        fs::write(
            dir.path().join("pos_orders.json"),
            serde_json::to_vec(&rows).unwrap(),
        )
        .unwrap();

        let store = LocalStore::open(dir.path()).unwrap();
        let orders = store.list(&OrderFilter::all()).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, "good");
    }

    #[test]
    fn test_unreadable_rows_survive_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = serde_json::json!({
            "id": "legacy", "order_no": 7, "items": [], "subtotal": 0, "tax": 0,
            "total": 0, "status": "COLLECTED", "created_at": "2025-12-01T09:00:00Z"
        });
        let rows = serde_json::json!([placed_order("good", 1), legacy.clone(), "junk"]);
        fs::write(
            dir.path().join("pos_orders.json"),
            serde_json::to_vec(&rows).unwrap(),
        )
        .unwrap();

        let store = LocalStore::open(dir.path()).unwrap();
        let prep = Transition::StartPreparing { eta_minutes: 5 };
        store
            .update("good", Some(prep.source()), &prep.patch(Utc::now()))
            .unwrap();
        assert_eq!(store.insert(new_order("next")).unwrap().order_no, 8);

        let on_disk: Vec<Value> =
            serde_json::from_slice(&fs::read(dir.path().join("pos_orders.json")).unwrap())
                .unwrap();
        assert_eq!(on_disk.len(), 4);
        assert!(on_disk.contains(&legacy));
        assert!(on_disk.contains(&Value::String("junk".into())));
        assert_eq!(store.list(&OrderFilter::all()).unwrap().len(), 2);
    }

    #[test]
    fn test_checkout_fields_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let placed = store.insert(new_order("a")).unwrap();
        assert_eq!(placed.loyalty_points_earned, 1);

        let reopened = LocalStore::open(dir.path()).unwrap();
        let loaded = reopened.get("a").unwrap();
        assert_eq!(loaded.payment_method, PaymentMethod::Card);
        assert_eq!(loaded.tax_rate, Some(5.0));
        assert_eq!(loaded, placed);
    }

    #[test]
    fn test_catalog_and_outlet_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(store.load_menu().unwrap().is_none());

        store.save_menu_item(&espresso()).unwrap();
        assert!(store.delete_menu_item("1").unwrap());
        assert!(!store.delete_menu_item("1").unwrap());
        assert_eq!(store.load_menu().unwrap(), Some(vec![]));

        let mut outlet = OutletProfile::default();
        outlet.tax_rate = 18.0;
        store.save_outlet(&outlet).unwrap();
        store
            .save_category(&Category {
                id: "c1".into(),
                name: "Momos".into(),
            })
            .unwrap();

        let reopened = LocalStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load_outlet().unwrap().unwrap().tax_rate, 18.0);
        assert_eq!(reopened.load_categories().unwrap().len(), 1);
        assert_eq!(reopened.load_menu().unwrap(), Some(vec![]));
    }

    #[test]
    fn test_cart_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(store.load_cart().unwrap().is_empty());

        let mut cart = Cart::new();
        cart.add(&espresso());
        cart.add(&espresso());
        store.save_cart(&cart).unwrap();
        assert_eq!(store.load_cart().unwrap(), cart);

        fs::write(dir.path().join("pos_cart.json"), b"not json").unwrap();
        assert!(store.load_cart().unwrap().is_empty());
    }
}
