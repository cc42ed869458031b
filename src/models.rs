//! Domain records: menu items, categories, orders and their line items.
//!
//! Field names are snake_case. Older snapshots used `tableNumber`, `gst` and
//! `category_id`; those are accepted as aliases on read and never written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PosError, PosResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(default, alias = "category_id")]
    pub category: String,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Placed,
    Preparing,
    Ready,
    Collected,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Placed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Collected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Placed => "PLACED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Collected => "COLLECTED",
        }
    }

    /// Accepts stored names case-insensitively plus the dashboard label
    /// "Collected".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PLACED" => Some(OrderStatus::Placed),
            "PREPARING" => Some(OrderStatus::Preparing),
            "READY" => Some(OrderStatus::Ready),
            "COLLECTED" => Some(OrderStatus::Collected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == OrderStatus::Collected
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the customer paid at the counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Upi,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Upi => "UPI",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CASH" => Some(PaymentMethod::Cash),
            "CARD" => Some(PaymentMethod::Card),
            "UPI" => Some(PaymentMethod::Upi),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value copy of a cart line frozen into an order at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub order_no: u64,
    pub items: Vec<OrderItem>,
    pub subtotal: f64,
    #[serde(alias = "gst")]
    pub tax: f64,
    pub total: f64,
    /// Tax percent frozen at checkout. Orders written before it was recorded
    /// have none.
    #[serde(default, alias = "taxRate")]
    pub tax_rate: Option<f64>,
    #[serde(default, alias = "paymentMethod")]
    pub payment_method: PaymentMethod,
    #[serde(default, alias = "loyaltyPointsEarned")]
    pub loyalty_points_earned: u32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ready_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "tableNumber")]
    pub table_number: Option<u32>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl Order {
    /// Last moment the order was written; falls back to creation time.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    /// Tax percent shown on the bill. Falls back to the ratio of the frozen
    /// amounts for orders without a recorded rate.
    pub fn applied_tax_rate(&self) -> f64 {
        match self.tax_rate {
            Some(rate) => rate,
            None if self.subtotal > 0.0 => self.tax / self.subtotal * 100.0,
            None => 0.0,
        }
    }

    /// Structural checks applied to every order crossing a storage or
    /// change-feed boundary.
    pub fn validate(&self) -> PosResult<()> {
        if self.id.trim().is_empty() {
            return Err(PosError::Validation("order id is empty".into()));
        }
        if self.order_no == 0 {
            return Err(PosError::Validation(format!(
                "order {} has order_no 0",
                self.id
            )));
        }
        if self.items.is_empty() {
            return Err(PosError::Validation(format!(
                "order {} has no items",
                self.id
            )));
        }
        for item in &self.items {
            if item.quantity == 0 {
                return Err(PosError::Validation(format!(
                    "order {} item {} has zero quantity",
                    self.id, item.id
                )));
            }
            if !item.price.is_finite() || item.price < 0.0 {
                return Err(PosError::Validation(format!(
                    "order {} item {} has invalid price {}",
                    self.id, item.id, item.price
                )));
            }
        }
        for (label, value) in [
            ("subtotal", self.subtotal),
            ("tax", self.tax),
            ("total", self.total),
            ("tax_rate", self.tax_rate.unwrap_or(0.0)),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PosError::Validation(format!(
                    "order {} has invalid {label} {value}",
                    self.id
                )));
            }
        }
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(PosError::Validation(format!(
                    "order {} has rating {rating} outside 1-5",
                    self.id
                )));
            }
        }
        Ok(())
    }
}
