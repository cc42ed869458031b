//! SQLite order and catalog store.
//!
//! Uses rusqlite with WAL mode so several terminals (each with its own
//! connection) can share one `pos.db`. Provides schema migrations, the order
//! sequence counter and settings helpers.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    check_expected, CartStore, CatalogStore, NewOrder, OrderFilter, OrderPatch, OrderStore,
};
use crate::cart::Cart;
use crate::error::{PosError, PosResult};
use crate::models::{Category, MenuItem, Order, OrderItem, OrderStatus, PaymentMethod};
use crate::outlet::OutletProfile;

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 3;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ORDER_COLUMNS: &str = "id, order_no, items, subtotal, tax, total, status, created_at,
     updated_at, ready_at, closed_at, table_number, rating, feedback, tax_rate,
     payment_method, loyalty_points_earned";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl SqliteStore {
    /// Open `{data_dir}/pos.db`, creating the directory if needed.
    pub fn open(data_dir: &Path) -> PosResult<Self> {
        Self::open_with_busy_timeout(data_dir, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open failures never touch the existing file. They come back as
    /// transient provider errors so the caller can retry once the other
    /// holder lets go.
    pub fn open_with_busy_timeout(data_dir: &Path, busy_timeout: Duration) -> PosResult<Self> {
        fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("pos.db");
        info!("Opening database at {}", db_path.display());

        let conn = open_and_configure(&db_path, busy_timeout)
            .and_then(|conn| {
                run_migrations(&conn)?;
                Ok(conn)
            })
            .map_err(|e| {
                warn!(path = %db_path.display(), error = %e, "Database open failed");
                match e {
                    PosError::Provider { message, .. } => PosError::transient(format!(
                        "open {}: {message}",
                        db_path.display()
                    )),
                    other => other,
                }
            })?;
        info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Wrap an already-open connection (tests use `:memory:`).
    pub fn from_connection(conn: Connection) -> PosResult<Self> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn lock(&self) -> PosResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PosError::provider(format!("database lock poisoned: {e}")))
    }
}

/// Open the database file and apply pragmas. The busy timeout goes first so
/// switching to WAL waits for other connections instead of failing.
fn open_and_configure(path: &Path, busy_timeout: Duration) -> PosResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        debug!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    if current < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Migration v1: orders, sequence counter, menu and settings.
fn migrate_v1(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (setting_category, setting_key)
        );

        -- orders (items are a frozen JSON snapshot)
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            order_no INTEGER NOT NULL UNIQUE,
            items TEXT NOT NULL DEFAULT '[]',
            subtotal REAL NOT NULL DEFAULT 0,
            tax REAL NOT NULL DEFAULT 0,
            total REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'PLACED'
                CHECK (status IN ('PLACED', 'PREPARING', 'READY', 'COLLECTED')),
            created_at TEXT NOT NULL,
            updated_at TEXT,
            ready_at TEXT,
            closed_at TEXT,
            table_number INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
        CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(created_at);

        -- server-side order number sequence
        CREATE TABLE IF NOT EXISTS order_sequence (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS menu_items (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            price REAL NOT NULL CHECK (price >= 0),
            category TEXT NOT NULL DEFAULT '',
            available INTEGER NOT NULL DEFAULT 1,
            description TEXT,
            created_at TEXT DEFAULT (datetime('now'))
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )?;
    info!("Applied migration v1");
    Ok(())
}

/// Migration v2: post-collection rating and feedback.
fn migrate_v2(conn: &Connection) -> PosResult<()> {
    if !column_exists(conn, "orders", "rating")? {
        conn.execute_batch(
            "ALTER TABLE orders ADD COLUMN rating INTEGER CHECK (rating BETWEEN 1 AND 5);",
        )?;
    }
    if !column_exists(conn, "orders", "feedback")? {
        conn.execute_batch("ALTER TABLE orders ADD COLUMN feedback TEXT;")?;
    }
    conn.execute("INSERT INTO schema_version (version) VALUES (2)", [])?;
    info!("Applied migration v2");
    Ok(())
}

/// Migration v3: checkout tax rate, payment method and loyalty points.
fn migrate_v3(conn: &Connection) -> PosResult<()> {
    for (column, ddl) in [
        ("tax_rate", "ALTER TABLE orders ADD COLUMN tax_rate REAL;"),
        (
            "payment_method",
            "ALTER TABLE orders ADD COLUMN payment_method TEXT NOT NULL DEFAULT 'CASH';",
        ),
        (
            "loyalty_points_earned",
            "ALTER TABLE orders ADD COLUMN loyalty_points_earned INTEGER NOT NULL DEFAULT 0;",
        ),
    ] {
        if !column_exists(conn, "orders", column)? {
            conn.execute_batch(ddl)?;
        }
    }
    conn.execute("INSERT INTO schema_version (version) VALUES (3)", [])?;
    info!("Applied migration v3");
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> PosResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

pub fn get_setting(conn: &Connection, category: &str, key: &str) -> PosResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT setting_value FROM local_settings
             WHERE setting_category = ?1 AND setting_key = ?2",
            params![category, key],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> PosResult<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Timestamps are stored with microsecond precision; returned orders match
/// what a later read will produce.
fn truncate_to_stored_precision(order: &mut Order) {
    order.created_at = order.created_at.trunc_subsecs(6);
    for value in [&mut order.updated_at, &mut order.ready_at, &mut order.closed_at] {
        *value = value.map(|v| v.trunc_subsecs(6));
    }
}

fn opt_ts(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(ts)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|r| parse_ts(idx, r)).transpose()
}

#[derive(Debug)]
struct UnknownValue {
    column: &'static str,
    value: String,
}

impl std::fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {} {}", self.column, self.value)
    }
}

impl std::error::Error for UnknownValue {}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let items_json: String = row.get(2)?;
    let items: Vec<OrderItem> =
        serde_json::from_str(&items_json).map_err(|e| conversion_error(2, e))?;
    let status_raw: String = row.get(6)?;
    let status = OrderStatus::parse(&status_raw).ok_or_else(|| {
        conversion_error(
            6,
            UnknownValue {
                column: "status",
                value: status_raw.clone(),
            },
        )
    })?;
    let payment_raw: String = row.get(15)?;
    let payment_method = PaymentMethod::parse(&payment_raw).ok_or_else(|| {
        conversion_error(
            15,
            UnknownValue {
                column: "payment_method",
                value: payment_raw.clone(),
            },
        )
    })?;
    let order_no: i64 = row.get(1)?;
    let table_number: Option<i64> = row.get(11)?;
    let rating: Option<i64> = row.get(12)?;
    let points: i64 = row.get(16)?;

    Ok(Order {
        id: row.get(0)?,
        order_no: order_no.max(0) as u64,
        items,
        subtotal: row.get(3)?,
        tax: row.get(4)?,
        total: row.get(5)?,
        tax_rate: row.get(14)?,
        payment_method,
        loyalty_points_earned: u32::try_from(points).unwrap_or(0),
        status,
        created_at: parse_ts(7, row.get(7)?)?,
        updated_at: parse_opt_ts(8, row.get(8)?)?,
        ready_at: parse_opt_ts(9, row.get(9)?)?,
        closed_at: parse_opt_ts(10, row.get(10)?)?,
        table_number: table_number.and_then(|t| u32::try_from(t).ok()),
        rating: rating.and_then(|r| u8::try_from(r).ok()),
        feedback: row.get(13)?,
    })
}

fn load_order(conn: &Connection, id: &str) -> PosResult<Option<Order>> {
    Ok(conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
            params![id],
            order_from_row,
        )
        .optional()?)
}

fn menu_item_from_row(row: &Row<'_>) -> rusqlite::Result<MenuItem> {
    Ok(MenuItem {
        id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
        category: row.get(3)?,
        available: row.get::<_, i64>(4)? != 0,
        description: row.get(5)?,
    })
}

// ---------------------------------------------------------------------------
// OrderStore
// ---------------------------------------------------------------------------

impl OrderStore for SqliteStore {
    fn insert(&self, order: NewOrder) -> PosResult<Order> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO order_sequence (name, value) VALUES ('orders', 1)
             ON CONFLICT(name) DO UPDATE SET value = value + 1",
            [],
        )?;
        let order_no: i64 = tx.query_row(
            "SELECT value FROM order_sequence WHERE name = 'orders'",
            [],
            |row| row.get(0),
        )?;

        let mut order = order.into_order(order_no as u64);
        truncate_to_stored_precision(&mut order);
        let items_json = serde_json::to_string(&order.items)?;
        tx.execute(
            "INSERT INTO orders (id, order_no, items, subtotal, tax, total, status, created_at,
                                 table_number, tax_rate, payment_method, loyalty_points_earned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                order.id,
                order_no,
                items_json,
                order.subtotal,
                order.tax,
                order.total,
                order.status.as_str(),
                ts(order.created_at),
                order.table_number,
                order.tax_rate,
                order.payment_method.as_str(),
                order.loyalty_points_earned,
            ],
        )?;
        tx.commit()?;

        debug!(order_id = %order.id, order_no = order.order_no, "Inserted order");
        Ok(order)
    }

    fn get(&self, id: &str) -> PosResult<Order> {
        let conn = self.lock()?;
        load_order(&conn, id)?.ok_or_else(|| PosError::OrderNotFound(id.to_string()))
    }

    fn update(
        &self,
        id: &str,
        expected: Option<OrderStatus>,
        patch: &OrderPatch,
    ) -> PosResult<Order> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut order =
            load_order(&tx, id)?.ok_or_else(|| PosError::OrderNotFound(id.to_string()))?;
        check_expected(&order, expected, patch)?;
        let read_status = order.status;
        patch.apply_to(&mut order);
        truncate_to_stored_precision(&mut order);

        let changed = tx.execute(
            "UPDATE orders
             SET status = ?1, ready_at = ?2, closed_at = ?3, updated_at = ?4,
                 rating = ?5, feedback = ?6
             WHERE id = ?7 AND status = ?8",
            params![
                order.status.as_str(),
                opt_ts(order.ready_at),
                opt_ts(order.closed_at),
                opt_ts(order.updated_at),
                order.rating,
                order.feedback,
                order.id,
                read_status.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(PosError::transient(format!(
                "order {id} changed while updating"
            )));
        }
        tx.commit()?;

        debug!(order_id = %order.id, status = %order.status, "Updated order");
        Ok(order)
    }

    fn list(&self, filter: &OrderFilter) -> PosResult<Vec<Order>> {
        let conn = self.lock()?;
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1 = 1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(statuses) = &filter.statuses {
            if statuses.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders: Vec<String> = statuses
                .iter()
                .map(|status| {
                    args.push(Box::new(status.as_str()));
                    format!("?{}", args.len())
                })
                .collect();
            sql.push_str(&format!(" AND status IN ({})", placeholders.join(", ")));
        }
        if let Some(date) = filter.created_on {
            args.push(Box::new(date.format("%Y-%m-%d").to_string()));
            sql.push_str(&format!(" AND substr(created_at, 1, 10) = ?{}", args.len()));
        }
        if let Some(table) = filter.table_number {
            args.push(Box::new(table));
            sql.push_str(&format!(" AND table_number = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY created_at DESC, order_no DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let orders = stmt
            .query_map(
                rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
                order_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }
}

// ---------------------------------------------------------------------------
// CatalogStore
// ---------------------------------------------------------------------------

impl CatalogStore for SqliteStore {
    fn load_menu(&self) -> PosResult<Option<Vec<MenuItem>>> {
        let conn = self.lock()?;
        if get_setting(&conn, "menu", "initialized")?.is_none() {
            return Ok(None);
        }
        let mut stmt = conn.prepare(
            "SELECT id, name, price, category, available, description
             FROM menu_items ORDER BY created_at ASC, rowid ASC",
        )?;
        let items = stmt
            .query_map([], menu_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(items))
    }

    fn save_menu_item(&self, item: &MenuItem) -> PosResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO menu_items (id, name, price, category, available, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                category = excluded.category,
                available = excluded.available,
                description = excluded.description",
            params![
                item.id,
                item.name,
                item.price,
                item.category,
                item.available as i64,
                item.description,
            ],
        )?;
        set_setting(&conn, "menu", "initialized", "1")
    }

    fn delete_menu_item(&self, id: &str) -> PosResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM menu_items WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn load_categories(&self) -> PosResult<Vec<Category>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY rowid ASC")?;
        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn save_category(&self, category: &Category) -> PosResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO categories (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![category.id, category.name],
        )?;
        Ok(())
    }

    fn delete_category(&self, id: &str) -> PosResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn load_outlet(&self) -> PosResult<Option<OutletProfile>> {
        let conn = self.lock()?;
        match get_setting(&conn, "outlet", "profile")? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save_outlet(&self, outlet: &OutletProfile) -> PosResult<()> {
        let conn = self.lock()?;
        let raw = serde_json::to_string(outlet)?;
        set_setting(&conn, "outlet", "profile", &raw)
    }
}

// ---------------------------------------------------------------------------
// CartStore
// ---------------------------------------------------------------------------

impl CartStore for SqliteStore {
    fn load_cart(&self) -> PosResult<Cart> {
        let conn = self.lock()?;
        let Some(raw) = get_setting(&conn, "cart", "current")? else {
            return Ok(Cart::default());
        };
        match serde_json::from_str(&raw) {
            Ok(cart) => Ok(cart),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable saved cart");
                Ok(Cart::default())
            }
        }
    }

    fn save_cart(&self, cart: &Cart) -> PosResult<()> {
        let conn = self.lock()?;
        let raw = serde_json::to_string(cart)?;
        set_setting(&conn, "cart", "current", &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Transition;
    use crate::pricing::Totals;
    use std::sync::Arc;

    fn test_store() -> SqliteStore {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .expect("pragma setup");
        SqliteStore::from_connection(conn).expect("migrations")
    }

    fn new_order(id: &str) -> NewOrder {
        NewOrder {
            id: id.into(),
            items: vec![OrderItem {
                id: "1".into(),
                name: "Espresso".into(),
                price: 120.0,
                quantity: 2,
            }],
            totals: Totals {
                subtotal: 240.0,
                tax: 12.0,
                total: 252.0,
            },
            tax_rate: 5.0,
            payment_method: PaymentMethod::Upi,
            created_at: Utc::now(),
            table_number: Some(3),
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let store = test_store();
        let conn = store.lock().unwrap();
        run_migrations(&conn).expect("second run");
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
        assert!(column_exists(&conn, "orders", "rating").unwrap());
    }

    #[test]
    fn test_status_check_constraint() {
        let store = test_store();
        let conn = store.lock().unwrap();
        let bad = conn.execute(
            "INSERT INTO orders (id, order_no, items, status, created_at)
             VALUES ('bad', 1, '[]', 'pending', '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(bad.is_err(), "unknown status should be rejected");
    }

    #[test]
    fn test_insert_assigns_sequential_numbers_and_round_trips() {
        let store = test_store();
        let first = store.insert(new_order("ord-1")).unwrap();
        let second = store.insert(new_order("ord-2")).unwrap();
        assert_eq!(first.order_no, 1);
        assert_eq!(second.order_no, 2);

        let loaded = store.get("ord-1").unwrap();
        assert_eq!(loaded, first);
        assert_eq!(loaded.table_number, Some(3));
        assert_eq!(loaded.items[0].price, 120.0);
        assert_eq!(loaded.tax_rate, Some(5.0));
        assert_eq!(loaded.payment_method, PaymentMethod::Upi);
        assert_eq!(loaded.loyalty_points_earned, 2);
    }

    #[test]
    fn test_v2_rows_gain_checkout_defaults() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT DEFAULT (datetime('now'))
            );",
        )
        .unwrap();
        migrate_v1(&conn).unwrap();
        migrate_v2(&conn).unwrap();
        conn.execute(
            "INSERT INTO orders (id, order_no, items, subtotal, tax, total, status, created_at)
             VALUES ('old', 1, ?1, 120, 6, 126, 'READY', '2026-01-20T10:00:00Z')",
            params![r#"[{"id":"1","name":"Espresso","price":120.0,"quantity":1}]"#],
        )
        .unwrap();

        let store = SqliteStore::from_connection(conn).unwrap();
        let old = store.get("old").unwrap();
        assert_eq!(old.tax_rate, None);
        assert_eq!(old.payment_method, PaymentMethod::Cash);
        assert_eq!(old.loyalty_points_earned, 0);
        assert_eq!(old.status, OrderStatus::Ready);
    }

    #[test]
    fn test_locked_database_is_never_replaced() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SqliteStore::open(dir.path()).unwrap();
            store.insert(new_order("keep-me")).unwrap();
        }

        let holder = Connection::open(dir.path().join("pos.db")).unwrap();
        holder
            .execute_batch(
                "PRAGMA locking_mode = EXCLUSIVE;
                 BEGIN EXCLUSIVE;
                 UPDATE order_sequence SET value = value WHERE name = 'orders';",
            )
            .unwrap();

        let err = SqliteStore::open_with_busy_timeout(dir.path(), Duration::from_millis(50))
            .err()
            .expect("open blocked by the exclusive holder");
        assert!(err.is_transient(), "got {err}");

        holder.execute_batch("COMMIT;").unwrap();
        drop(holder);

        let store = SqliteStore::open(dir.path()).unwrap();
        let kept = store.get("keep-me").unwrap();
        assert_eq!(kept.order_no, 1);
        assert_eq!(store.insert(new_order("next")).unwrap().order_no, 2);
    }

    #[test]
    fn test_cart_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut cart = Cart::new();
        cart.add(&crate::models::fixtures::espresso());
        cart.add(&crate::models::fixtures::espresso());
        {
            let store = SqliteStore::open(dir.path()).unwrap();
            assert!(store.load_cart().unwrap().is_empty());
            store.save_cart(&cart).unwrap();
        }

        let store = SqliteStore::open(dir.path()).unwrap();
        assert_eq!(store.load_cart().unwrap(), cart);

        let conn = store.lock().unwrap();
        set_setting(&conn, "cart", "current", "not json").unwrap();
        drop(conn);
        assert!(store.load_cart().unwrap().is_empty());
    }

    #[test]
    fn test_get_unknown_order() {
        let store = test_store();
        assert!(matches!(
            store.get("nope"),
            Err(PosError::OrderNotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_update_is_compare_and_set() {
        let store = test_store();
        store.insert(new_order("ord-1")).unwrap();
        let now = Utc::now();

        let collect = Transition::Collect;
        let err = store
            .update("ord-1", Some(collect.source()), &collect.patch(now))
            .unwrap_err();
        assert!(matches!(
            err,
            PosError::InvalidTransition {
                from: OrderStatus::Placed,
                to: OrderStatus::Collected,
                ..
            }
        ));
        assert_eq!(store.get("ord-1").unwrap().status, OrderStatus::Placed);

        let prep = Transition::StartPreparing { eta_minutes: 10 };
        let updated = store
            .update("ord-1", Some(prep.source()), &prep.patch(now))
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Preparing);
        let reloaded = store.get("ord-1").unwrap();
        assert_eq!(reloaded.ready_at, updated.ready_at);
        assert_eq!(reloaded.updated_at, updated.updated_at);
    }

    #[test]
    fn test_update_unknown_order() {
        let store = test_store();
        let err = store
            .update("missing", None, &OrderPatch::rating(5, None, Utc::now()))
            .unwrap_err();
        assert!(matches!(err, PosError::OrderNotFound(_)));
    }

    #[test]
    fn test_list_filters_and_orders_newest_first() {
        let store = test_store();
        store.insert(new_order("ord-1")).unwrap();
        store.insert(new_order("ord-2")).unwrap();
        let mut third = new_order("ord-3");
        third.table_number = None;
        store.insert(third).unwrap();

        let prep = Transition::StartPreparing { eta_minutes: 5 };
        store
            .update("ord-2", Some(prep.source()), &prep.patch(Utc::now()))
            .unwrap();

        let all = store.list(&OrderFilter::all()).unwrap();
        let numbers: Vec<u64> = all.iter().map(|o| o.order_no).collect();
        assert_eq!(numbers, vec![3, 2, 1]);

        let placed = store
            .list(&OrderFilter::with_status(OrderStatus::Placed))
            .unwrap();
        assert_eq!(placed.len(), 2);

        let today = store
            .list(&OrderFilter::on_date(Utc::now().date_naive()))
            .unwrap();
        assert_eq!(today.len(), 3);

        let table = store
            .list(&OrderFilter {
                table_number: Some(3),
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].id, "ord-2");

        let none = store
            .list(&OrderFilter {
                statuses: Some(vec![]),
                ..Default::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_concurrent_connections_never_share_order_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let stores: Vec<Arc<SqliteStore>> = (0..3)
            .map(|_| Arc::new(SqliteStore::open(dir.path()).unwrap()))
            .collect();

        let handles: Vec<_> = stores
            .iter()
            .enumerate()
            .map(|(terminal, store)| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .map(|n| {
                            store
                                .insert(new_order(&format!("t{terminal}-{n}")))
                                .unwrap()
                                .order_no
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut numbers: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=30).collect::<Vec<u64>>());
    }

    #[test]
    fn test_catalog_round_trip() {
        let store = test_store();
        assert!(store.load_menu().unwrap().is_none());

        let item = MenuItem {
            id: "item-1".into(),
            name: "Veg Momo".into(),
            price: 90.0,
            category: "Food".into(),
            available: true,
            description: None,
        };
        store.save_menu_item(&item).unwrap();
        let mut updated = item.clone();
        updated.available = false;
        store.save_menu_item(&updated).unwrap();

        let menu = store.load_menu().unwrap().unwrap();
        assert_eq!(menu, vec![updated]);

        assert!(store.delete_menu_item("item-1").unwrap());
        assert!(!store.delete_menu_item("item-1").unwrap());
        assert_eq!(store.load_menu().unwrap(), Some(vec![]));

        let category = Category {
            id: "cat-1".into(),
            name: "Momos".into(),
        };
        store.save_category(&category).unwrap();
        assert_eq!(store.load_categories().unwrap(), vec![category]);
        assert!(store.delete_category("cat-1").unwrap());

        assert!(store.load_outlet().unwrap().is_none());
        let outlet = OutletProfile::default();
        store.save_outlet(&outlet).unwrap();
        assert_eq!(store.load_outlet().unwrap(), Some(outlet));
    }
}
