//! Order change fan-out.
//!
//! One `Notifier`, two transports behind the same `Subscription` type:
//!
//! - `Push`: every successful insert/update made through `PosService` is
//!   broadcast in-process.
//! - `Poll`: a background task re-reads the order store on a fixed interval
//!   and emits the differences. This also sees writes made by other
//!   processes sharing the same store.
//!
//! Delivery is at-least-once. A push subscriber that falls behind the
//! broadcast buffer re-reads its scope from the store and receives every
//! current order as an UPDATE. Subscribers apply events through
//! `OrderBoard`, which deduplicates by order id.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TransportMode;
use crate::error::{PosError, PosResult};
use crate::models::Order;
use crate::store::{run_blocking, OrderFilter, OrderStore};

pub mod board;
pub mod payload;

pub use board::{BoardChange, OrderBoard};

const PUSH_CAPACITY: usize = 256;
const POLL_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "eventType", content = "new", rename_all = "UPPERCASE")]
pub enum OrderEvent {
    Insert(Order),
    Update(Order),
}

impl OrderEvent {
    pub fn order(&self) -> &Order {
        match self {
            OrderEvent::Insert(order) | OrderEvent::Update(order) => order,
        }
    }
}

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Staff dashboard: every order.
    All,
    /// Customer tracking page: one order id.
    Order(String),
}

impl Scope {
    pub fn includes(&self, order: &Order) -> bool {
        match self {
            Scope::All => true,
            Scope::Order(id) => order.id == *id,
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    push: broadcast::Sender<OrderEvent>,
    mode: TransportMode,
    store: Arc<dyn OrderStore>,
    poll_interval: Duration,
}

impl Notifier {
    pub fn new(mode: TransportMode, store: Arc<dyn OrderStore>, poll_interval: Duration) -> Self {
        let (push, _) = broadcast::channel(PUSH_CAPACITY);
        Self {
            push,
            mode,
            store,
            poll_interval,
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Announce a committed write. Having no listeners is not an error.
    pub fn publish(&self, event: OrderEvent) {
        let receivers = self.push.send(event).unwrap_or(0);
        debug!(receivers, "Published order event");
    }

    /// Open a subscription on the configured transport. Poll subscriptions
    /// spawn a task, so this must run inside a Tokio runtime.
    pub fn subscribe(&self, scope: Scope) -> Subscription {
        match self.mode {
            TransportMode::Push => Subscription {
                scope,
                inner: Inner::Push {
                    rx: self.push.subscribe(),
                    store: self.store.clone(),
                    replay: VecDeque::new(),
                },
            },
            TransportMode::Poll => {
                spawn_poller(self.store.clone(), scope, self.poll_interval)
            }
        }
    }
}

enum Inner {
    Push {
        rx: broadcast::Receiver<OrderEvent>,
        store: Arc<dyn OrderStore>,
        /// Store rows queued after a lag, delivered before the channel.
        replay: VecDeque<OrderEvent>,
    },
    Poll {
        rx: mpsc::Receiver<OrderEvent>,
        cancel: CancellationToken,
    },
}

/// A live delivery channel for one mounted view. Dropping it unsubscribes.
pub struct Subscription {
    scope: Scope,
    inner: Inner,
}

impl Subscription {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Next event in scope; `None` once the transport has shut down.
    pub async fn next(&mut self) -> Option<OrderEvent> {
        match &mut self.inner {
            Inner::Push { rx, store, replay } => loop {
                if let Some(event) = replay.pop_front() {
                    return Some(event);
                }
                match rx.recv().await {
                    Ok(event) if self.scope.includes(event.order()) => return Some(event),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, scope = ?self.scope, "Order subscriber lagged, replaying from store");
                        if let Some(orders) = read_scope(store.clone(), self.scope.clone()).await {
                            // Oldest first, like the poll transport.
                            replay.extend(orders.into_iter().rev().map(OrderEvent::Update));
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            Inner::Poll { rx, .. } => rx.recv().await,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Inner::Poll { cancel, .. } = &self.inner {
            cancel.cancel();
        }
    }
}

fn scope_orders(store: &dyn OrderStore, scope: &Scope) -> PosResult<Vec<Order>> {
    match scope {
        Scope::All => store.list(&OrderFilter::all()),
        Scope::Order(id) => match store.get(id) {
            Ok(order) => Ok(vec![order]),
            Err(PosError::OrderNotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        },
    }
}

/// Current orders in `scope`, newest first. `None` when the store failed.
async fn read_scope(store: Arc<dyn OrderStore>, scope: Scope) -> Option<Vec<Order>> {
    match run_blocking(move || scope_orders(store.as_ref(), &scope)).await {
        Ok(orders) => Some(orders),
        Err(e) => {
            warn!(error = %e, "Order store read failed");
            None
        }
    }
}

/// Compare a fresh read with the previous snapshot.
pub(crate) fn diff_snapshot(
    known: &mut HashMap<String, Order>,
    fresh: Vec<Order>,
) -> Vec<OrderEvent> {
    let mut events = Vec::new();
    // Oldest first so inserts arrive in sequence order.
    for order in fresh.into_iter().rev() {
        match known.get(&order.id) {
            None => {
                known.insert(order.id.clone(), order.clone());
                events.push(OrderEvent::Insert(order));
            }
            Some(previous) if *previous != order => {
                known.insert(order.id.clone(), order.clone());
                events.push(OrderEvent::Update(order));
            }
            Some(_) => {}
        }
    }
    events
}

fn spawn_poller(store: Arc<dyn OrderStore>, scope: Scope, interval: Duration) -> Subscription {
    let (tx, rx) = mpsc::channel(POLL_BUFFER);
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let task_scope = scope.clone();

    tokio::spawn(async move {
        // The first read only seeds the snapshot; viewers load initial state
        // themselves.
        let mut known: HashMap<String, Order> = read_scope(store.clone(), task_scope.clone())
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|o| (o.id.clone(), o))
            .collect();
        debug!(scope = ?task_scope, interval_ms = interval.as_millis() as u64, "Order poller started");

        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            // A failed read keeps the previous snapshot.
            let Some(fresh) = read_scope(store.clone(), task_scope.clone()).await else {
                continue;
            };
            for event in diff_snapshot(&mut known, fresh) {
                if tx.send(event).await.is_err() {
                    debug!("Order poller receiver gone");
                    return;
                }
            }
        }
        debug!(scope = ?task_scope, "Order poller stopped");
    });

    Subscription {
        scope,
        inner: Inner::Poll { rx, cancel },
    }
}
