//! Persistence seams for orders, the menu catalog and the outlet profile.
//!
//! Two backends implement all three traits: `SqliteStore` (durable, shared
//! by every terminal on the machine) and `LocalStore` (JSON snapshots
//! rewritten on every mutation, the degraded fallback).
//!
//! Store calls are synchronous and may block on file locks. Async callers go
//! through [`run_blocking`] so a busy database never stalls a runtime worker.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use crate::cart::Cart;
use crate::config::{PosConfig, StorageBackend};
use crate::error::{PosError, PosResult};
use crate::models::{Category, MenuItem, Order, OrderItem, OrderStatus, PaymentMethod};
use crate::outlet::OutletProfile;
use crate::pricing::{loyalty_points, Totals};

pub mod local;
pub mod sqlite;

pub use local::LocalStore;
pub use sqlite::SqliteStore;

/// An order ready to persist, still waiting for its sequence number.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: String,
    pub items: Vec<OrderItem>,
    pub totals: Totals,
    /// Outlet tax rate (percent) the totals were computed with.
    pub tax_rate: f64,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    pub table_number: Option<u32>,
}

impl NewOrder {
    pub fn into_order(self, order_no: u64) -> Order {
        Order {
            id: self.id,
            order_no,
            items: self.items,
            subtotal: self.totals.subtotal,
            tax: self.totals.tax,
            total: self.totals.total,
            tax_rate: Some(self.tax_rate),
            payment_method: self.payment_method,
            loyalty_points_earned: loyalty_points(self.totals.total),
            status: OrderStatus::Placed,
            created_at: self.created_at,
            updated_at: None,
            ready_at: None,
            closed_at: None,
            table_number: self.table_number,
            rating: None,
            feedback: None,
        }
    }
}

/// Fields written by a status transition or a rating. `None` leaves the
/// stored value alone; `feedback: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub ready_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub rating: Option<u8>,
    pub feedback: Option<Option<String>>,
}

impl OrderPatch {
    pub fn rating(rating: u8, feedback: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            rating: Some(rating),
            feedback: Some(feedback),
            updated_at: Some(now),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, order: &mut Order) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(ready_at) = self.ready_at {
            order.ready_at = Some(ready_at);
        }
        if let Some(closed_at) = self.closed_at {
            order.closed_at = Some(closed_at);
        }
        if let Some(updated_at) = self.updated_at {
            order.updated_at = Some(updated_at);
        }
        if let Some(rating) = self.rating {
            order.rating = Some(rating);
        }
        if let Some(feedback) = &self.feedback {
            order.feedback = feedback.clone();
        }
    }
}

/// Reject a write whose expected source status no longer matches.
pub(crate) fn check_expected(
    order: &Order,
    expected: Option<OrderStatus>,
    patch: &OrderPatch,
) -> PosResult<()> {
    match expected {
        Some(expected) if order.status != expected => Err(PosError::InvalidTransition {
            order_id: order.id.clone(),
            from: order.status,
            to: patch.status.unwrap_or(order.status),
        }),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub statuses: Option<Vec<OrderStatus>>,
    /// UTC calendar day of `created_at`.
    pub created_on: Option<NaiveDate>,
    pub table_number: Option<u32>,
    pub limit: Option<usize>,
}

impl OrderFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: OrderStatus) -> Self {
        Self {
            statuses: Some(vec![status]),
            ..Default::default()
        }
    }

    /// Everything not yet collected.
    pub fn active() -> Self {
        Self {
            statuses: Some(vec![
                OrderStatus::Placed,
                OrderStatus::Preparing,
                OrderStatus::Ready,
            ]),
            ..Default::default()
        }
    }

    pub fn on_date(date: NaiveDate) -> Self {
        Self {
            created_on: Some(date),
            ..Default::default()
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&order.status) {
                return false;
            }
        }
        if let Some(date) = self.created_on {
            if order.created_at.date_naive() != date {
                return false;
            }
        }
        if let Some(table) = self.table_number {
            if order.table_number != Some(table) {
                return false;
            }
        }
        true
    }
}

/// Newest first, ties broken by sequence number.
pub(crate) fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.order_no.cmp(&a.order_no))
    });
}

pub trait OrderStore: Send + Sync {
    /// Persist a new order, assigning the next sequence number atomically.
    fn insert(&self, order: NewOrder) -> PosResult<Order>;

    fn get(&self, id: &str) -> PosResult<Order>;

    /// Apply `patch` if the persisted status still equals `expected`.
    fn update(
        &self,
        id: &str,
        expected: Option<OrderStatus>,
        patch: &OrderPatch,
    ) -> PosResult<Order>;

    fn list(&self, filter: &OrderFilter) -> PosResult<Vec<Order>>;
}

pub trait CatalogStore: Send + Sync {
    /// `None` when no menu was ever saved, so callers can seed defaults.
    fn load_menu(&self) -> PosResult<Option<Vec<MenuItem>>>;
    fn save_menu_item(&self, item: &MenuItem) -> PosResult<()>;
    /// Returns whether a row was removed.
    fn delete_menu_item(&self, id: &str) -> PosResult<bool>;

    fn load_categories(&self) -> PosResult<Vec<Category>>;
    fn save_category(&self, category: &Category) -> PosResult<()>;
    fn delete_category(&self, id: &str) -> PosResult<bool>;

    fn load_outlet(&self) -> PosResult<Option<OutletProfile>>;
    fn save_outlet(&self, outlet: &OutletProfile) -> PosResult<()>;
}

/// The in-progress cart of this terminal, kept across restarts.
pub trait CartStore: Send + Sync {
    /// An empty cart when nothing was saved or the saved copy is unreadable.
    fn load_cart(&self) -> PosResult<Cart>;
    fn save_cart(&self, cart: &Cart) -> PosResult<()>;
}

/// Run a synchronous store call on the blocking pool.
pub async fn run_blocking<T, F>(op: F) -> PosResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> PosResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| PosError::provider(format!("store task failed: {e}")))?
}

/// Every part of the configured backend.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub carts: Arc<dyn CartStore>,
}

impl Stores {
    /// Use one backend for orders, catalog and cart.
    pub fn single<S>(store: Arc<S>) -> Self
    where
        S: OrderStore + CatalogStore + CartStore + 'static,
    {
        Self {
            orders: store.clone(),
            catalog: store.clone(),
            carts: store,
        }
    }

    pub fn open(config: &PosConfig) -> PosResult<Self> {
        match config.backend {
            StorageBackend::Sqlite => Ok(Self::single(Arc::new(SqliteStore::open(
                &config.data_dir,
            )?))),
            StorageBackend::Local => Ok(Self::single(Arc::new(LocalStore::open(
                &config.data_dir,
            )?))),
        }
    }
}
