//! Subscriber-side view of the order list.
//!
//! Dashboards and tracking pages keep one `OrderBoard` and feed every
//! received event through `apply`. Duplicate inserts are ignored, updates
//! replace by id, and updates older than what the board already holds are
//! dropped so a late poll tick cannot roll a status back.

use serde_json::Value;
use std::collections::BTreeMap;

use super::{payload, OrderEvent, Scope};
use crate::error::PosResult;
use crate::models::{Order, OrderStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum BoardChange {
    Inserted,
    Replaced { previous_status: OrderStatus },
    Ignored,
}

impl BoardChange {
    /// True when this change is the moment an order turned READY; tracking
    /// pages use it to trigger the "ready" alert exactly once.
    pub fn became_ready(&self, order: &Order) -> bool {
        match self {
            BoardChange::Replaced { previous_status } => {
                *previous_status != OrderStatus::Ready && order.status == OrderStatus::Ready
            }
            BoardChange::Inserted => order.status == OrderStatus::Ready,
            BoardChange::Ignored => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderBoard {
    scope: Scope,
    // Newest first, same as the store's list order.
    orders: Vec<Order>,
}

impl OrderBoard {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            orders: Vec::new(),
        }
    }

    /// Board seeded with an initial fetch.
    pub fn with_orders(scope: Scope, orders: Vec<Order>) -> Self {
        let mut board = Self::new(scope);
        for order in orders.into_iter().rev() {
            board.apply(OrderEvent::Insert(order));
        }
        board
    }

    pub fn apply(&mut self, event: OrderEvent) -> BoardChange {
        let is_insert = matches!(event, OrderEvent::Insert(_));
        let order = match event {
            OrderEvent::Insert(order) | OrderEvent::Update(order) => order,
        };
        if !self.scope.includes(&order) {
            return BoardChange::Ignored;
        }

        match self.orders.iter().position(|o| o.id == order.id) {
            Some(_) if is_insert => BoardChange::Ignored,
            Some(idx) => {
                let current = &self.orders[idx];
                if order.last_modified() < current.last_modified() || *current == order {
                    return BoardChange::Ignored;
                }
                let previous_status = current.status;
                self.orders[idx] = order;
                BoardChange::Replaced { previous_status }
            }
            // An update for an order we never saw inserted is treated as new.
            None => {
                self.orders.insert(0, order);
                BoardChange::Inserted
            }
        }
    }

    /// Apply a raw change-feed payload.
    pub fn apply_raw(&mut self, raw: &Value) -> PosResult<BoardChange> {
        let event = payload::parse_change(raw)?;
        Ok(self.apply(event))
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn get(&self, id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    pub fn by_status(&self, status: OrderStatus) -> Vec<&Order> {
        self.orders.iter().filter(|o| o.status == status).collect()
    }

    pub fn active(&self) -> Vec<&Order> {
        self.orders
            .iter()
            .filter(|o| !o.status.is_terminal())
            .collect()
    }

    pub fn status_counts(&self) -> BTreeMap<OrderStatus, usize> {
        let mut counts = BTreeMap::new();
        for order in &self.orders {
            *counts.entry(order.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
