//! The POS application state object.
//!
//! `PosService` owns the stores, the in-memory menu and outlet, the notifier
//! and the retry policy. Every write goes to the store first; memory and
//! subscribers only see it once the store accepted it.
//!
//! Order writes are async and run on the blocking pool. Queries and catalog
//! edits are plain synchronous calls into the store.

use chrono::{NaiveDate, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cart::Cart;
use crate::config::{PosConfig, TransportMode};
use crate::error::{PosError, PosResult};
use crate::lifecycle::Transition;
use crate::menu::{default_menu, MenuCatalog, MenuItemPatch, NewMenuItem};
use crate::models::{Category, MenuItem, Order, PaymentMethod};
use crate::outlet::{OutletMerge, OutletPatch, OutletProfile};
use crate::realtime::{Notifier, OrderEvent, Scope, Subscription};
use crate::retry::RetryPolicy;
use crate::store::{run_blocking, NewOrder, OrderFilter, OrderPatch, Stores};
use crate::summary::DaySummary;
use crate::tickets::{self, PaperWidth};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PosService {
    stores: Stores,
    menu: Mutex<MenuCatalog>,
    outlet: Mutex<OutletProfile>,
    notifier: Notifier,
    retry: RetryPolicy,
    tracking_base_url: String,
    paper_width: PaperWidth,
}

impl PosService {
    /// Open the configured backend, seeding the default menu and outlet on
    /// first start.
    pub fn open(config: &PosConfig) -> PosResult<Self> {
        let stores = Stores::open(config)?;
        let notifier = Notifier::new(
            config.transport,
            stores.orders.clone(),
            config.poll_interval(),
        );
        let service = Self::from_parts(
            stores,
            notifier,
            config.retry_policy(),
            config.tracking_base_url.clone(),
            config.paper_width(),
        )?;
        info!(
            backend = ?config.backend,
            transport = ?config.transport,
            data_dir = %config.data_dir.display(),
            "POS service ready"
        );
        Ok(service)
    }

    pub fn from_parts(
        stores: Stores,
        notifier: Notifier,
        retry: RetryPolicy,
        tracking_base_url: String,
        paper_width: PaperWidth,
    ) -> PosResult<Self> {
        let items = match stores.catalog.load_menu()? {
            Some(items) => items,
            None => {
                info!("No menu stored yet, seeding defaults");
                let items = default_menu();
                for item in &items {
                    stores.catalog.save_menu_item(item)?;
                }
                items
            }
        };
        let mut categories = stores.catalog.load_categories()?;
        if categories.is_empty() {
            for name in ["Coffee", "Tea"] {
                let category = Category {
                    id: name.to_ascii_lowercase(),
                    name: name.into(),
                };
                stores.catalog.save_category(&category)?;
                categories.push(category);
            }
        }
        let outlet = match stores.catalog.load_outlet()? {
            Some(outlet) => outlet,
            None => {
                let outlet = OutletProfile::default();
                stores.catalog.save_outlet(&outlet)?;
                outlet
            }
        };

        Ok(Self {
            stores,
            menu: Mutex::new(MenuCatalog::new(items, categories)),
            outlet: Mutex::new(outlet),
            notifier,
            retry,
            tracking_base_url,
            paper_width,
        })
    }

    pub fn transport(&self) -> TransportMode {
        self.notifier.mode()
    }

    // -- orders ---------------------------------------------------------------

    /// Checkout. The cart is cleared only once the order is stored.
    pub async fn place_order(
        &self,
        cart: &mut Cart,
        table_number: Option<u32>,
        payment_method: PaymentMethod,
    ) -> PosResult<Order> {
        if cart.is_empty() {
            return Err(PosError::EmptyCart);
        }
        let tax_rate = lock(&self.outlet).tax_rate;
        let new_order = NewOrder {
            id: Uuid::new_v4().to_string(),
            items: cart.snapshot(),
            totals: cart.totals(tax_rate),
            tax_rate,
            payment_method,
            created_at: Utc::now(),
            table_number,
        };

        let orders = self.stores.orders.clone();
        let order = self
            .retry
            .run("insert_order", move || orders.insert(new_order.clone()))
            .await?;

        info!(
            order_id = %order.id,
            order_no = order.order_no,
            total = order.total,
            payment = %order.payment_method,
            loyalty_points = order.loyalty_points_earned,
            "Order placed"
        );
        self.notifier.publish(OrderEvent::Insert(order.clone()));
        cart.clear();
        let carts = self.stores.carts.clone();
        let emptied = cart.clone();
        if let Err(e) = run_blocking(move || carts.save_cart(&emptied)).await {
            warn!(order_id = %order.id, error = %e, "Failed to clear saved cart");
        }
        Ok(order)
    }

    pub async fn start_preparing(&self, order_id: &str, eta_minutes: u32) -> PosResult<Order> {
        self.transition(order_id, Transition::StartPreparing { eta_minutes })
            .await
    }

    pub async fn mark_ready(&self, order_id: &str) -> PosResult<Order> {
        self.transition(order_id, Transition::MarkReady).await
    }

    pub async fn collect(&self, order_id: &str) -> PosResult<Order> {
        self.transition(order_id, Transition::Collect).await
    }

    /// Move the order one step along its lifecycle.
    pub async fn advance(&self, order_id: &str, eta_minutes: u32) -> PosResult<Order> {
        let orders = self.stores.orders.clone();
        let id = order_id.to_string();
        let current = run_blocking(move || orders.get(&id)).await?;
        let transition = current
            .status
            .next()
            .and_then(|next| Transition::into_status(next, eta_minutes))
            .ok_or_else(|| PosError::InvalidTransition {
                order_id: order_id.to_string(),
                from: current.status,
                to: current.status,
            })?;
        self.transition(order_id, transition).await
    }

    /// Apply `transition` only if the stored status is still its source.
    pub async fn transition(&self, order_id: &str, transition: Transition) -> PosResult<Order> {
        let patch = transition.patch(Utc::now());
        let orders = self.stores.orders.clone();
        let id = order_id.to_string();
        let source = transition.source();
        let result = self
            .retry
            .run("update_order_status", move || {
                orders.update(&id, Some(source), &patch)
            })
            .await;

        match result {
            Ok(order) => {
                info!(order_id, status = %order.status, "Order status changed");
                self.notifier.publish(OrderEvent::Update(order.clone()));
                Ok(order)
            }
            Err(e) => {
                warn!(order_id, to = %transition.target(), error = %e, "Order transition refused");
                Err(e)
            }
        }
    }

    /// Customer rating, allowed in any status. Last write wins.
    pub async fn rate(
        &self,
        order_id: &str,
        rating: u8,
        feedback: Option<String>,
    ) -> PosResult<Order> {
        if !(1..=5).contains(&rating) {
            return Err(PosError::Validation(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }
        let feedback = feedback
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
        let patch = OrderPatch::rating(rating, feedback, Utc::now());
        let orders = self.stores.orders.clone();
        let id = order_id.to_string();
        let order = self
            .retry
            .run("rate_order", move || orders.update(&id, None, &patch))
            .await?;
        info!(order_id, rating, "Order rated");
        self.notifier.publish(OrderEvent::Update(order.clone()));
        Ok(order)
    }

    pub fn get_order(&self, order_id: &str) -> PosResult<Order> {
        self.stores.orders.get(order_id)
    }

    pub fn list_orders(&self, filter: &OrderFilter) -> PosResult<Vec<Order>> {
        self.stores.orders.list(filter)
    }

    pub fn active_orders(&self) -> PosResult<Vec<Order>> {
        self.list_orders(&OrderFilter::active())
    }

    pub fn orders_for_day(&self, date: NaiveDate) -> PosResult<Vec<Order>> {
        self.list_orders(&OrderFilter::on_date(date))
    }

    pub fn day_summary(&self, date: NaiveDate) -> PosResult<DaySummary> {
        let orders = self.orders_for_day(date)?;
        Ok(DaySummary::from_orders(date, &orders))
    }

    /// Subscribe a dashboard (`Scope::All`) or a tracking page.
    pub fn subscribe(&self, scope: Scope) -> Subscription {
        debug!(scope = ?scope, "New order subscription");
        self.notifier.subscribe(scope)
    }

    // -- cart -----------------------------------------------------------------

    /// The cart this terminal saved last, repriced against the live menu.
    /// Lines for deleted items are dropped.
    pub fn saved_cart(&self) -> PosResult<Cart> {
        let mut cart = self.stores.carts.load_cart()?;
        cart.reprice(&lock(&self.menu));
        Ok(cart)
    }

    pub fn save_cart(&self, cart: &Cart) -> PosResult<()> {
        self.stores.carts.save_cart(cart)
    }

    // -- tickets --------------------------------------------------------------

    pub fn tracking_url(&self, order_id: &str) -> String {
        tickets::tracking_url(&self.tracking_base_url, order_id)
    }

    pub fn paper_width(&self) -> PaperWidth {
        self.paper_width
    }

    pub fn kot_text(&self, order_id: &str) -> PosResult<String> {
        let order = self.get_order(order_id)?;
        Ok(tickets::render_kot(&order, &self.outlet(), self.paper_width))
    }

    pub fn bill_text(&self, order_id: &str) -> PosResult<String> {
        let order = self.get_order(order_id)?;
        let url = self.tracking_url(&order.id);
        Ok(tickets::render_bill(
            &order,
            &self.outlet(),
            self.paper_width,
            &url,
        ))
    }

    // -- menu -----------------------------------------------------------------

    pub fn menu(&self) -> MenuCatalog {
        lock(&self.menu).clone()
    }

    pub fn menu_items(&self, category: Option<&str>) -> Vec<MenuItem> {
        lock(&self.menu).items_in(category)
    }

    pub fn available_items(&self, category: Option<&str>) -> Vec<MenuItem> {
        lock(&self.menu).available_items(category)
    }

    pub fn menu_item(&self, item_id: &str) -> PosResult<MenuItem> {
        lock(&self.menu)
            .get(item_id)
            .cloned()
            .ok_or_else(|| PosError::MenuItemNotFound(item_id.to_string()))
    }

    pub fn add_menu_item(&self, new_item: NewMenuItem) -> PosResult<MenuItem> {
        let item = new_item.into_item()?;
        self.stores.catalog.save_menu_item(&item)?;
        lock(&self.menu).replace_item(item.clone());
        info!(item_id = %item.id, name = %item.name, "Menu item added");
        Ok(item)
    }

    /// Price changes here never touch orders already placed.
    pub fn update_menu_item(&self, item_id: &str, patch: &MenuItemPatch) -> PosResult<MenuItem> {
        let updated = patch.apply(&self.menu_item(item_id)?)?;
        self.stores.catalog.save_menu_item(&updated)?;
        lock(&self.menu).replace_item(updated.clone());
        info!(item_id, price = updated.price, available = updated.available, "Menu item updated");
        Ok(updated)
    }

    pub fn set_availability(&self, item_id: &str, available: bool) -> PosResult<MenuItem> {
        let patch = MenuItemPatch {
            available: Some(available),
            ..Default::default()
        };
        self.update_menu_item(item_id, &patch)
    }

    pub fn delete_menu_item(&self, item_id: &str) -> PosResult<MenuItem> {
        let existing = self.menu_item(item_id)?;
        if !self.stores.catalog.delete_menu_item(item_id)? {
            warn!(item_id, "Menu item missing from store during delete");
        }
        lock(&self.menu).remove_item(item_id);
        info!(item_id, "Menu item deleted");
        Ok(existing)
    }

    pub fn categories(&self) -> Vec<Category> {
        lock(&self.menu).categories().to_vec()
    }

    pub fn add_category(&self, name: &str) -> PosResult<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PosError::Validation("category name is required".into()));
        }
        let category = Category {
            id: format!("cat-{}", Uuid::new_v4()),
            name: name.to_string(),
        };
        self.stores.catalog.save_category(&category)?;
        lock(&self.menu).replace_category(category.clone());
        Ok(category)
    }

    /// Returns false when no such category exists.
    pub fn delete_category(&self, category_id: &str) -> PosResult<bool> {
        let deleted = self.stores.catalog.delete_category(category_id)?;
        lock(&self.menu).remove_category(category_id);
        Ok(deleted)
    }

    // -- outlet ---------------------------------------------------------------

    pub fn outlet(&self) -> OutletProfile {
        lock(&self.outlet).clone()
    }

    /// Merge and persist. Rejected fields keep their prior values and are
    /// listed in the result.
    pub fn update_outlet(&self, patch: &OutletPatch) -> PosResult<OutletMerge> {
        let merge = patch.merge_into(&self.outlet());
        self.stores.catalog.save_outlet(&merge.profile)?;
        *lock(&self.outlet) = merge.profile.clone();
        info!(
            outlet = %merge.profile.name,
            tax_rate = merge.profile.tax_rate,
            rejected = merge.rejected.len(),
            "Outlet profile saved"
        );
        Ok(merge)
    }
}
