//! End-of-day figures for the counter.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{Order, OrderStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub order_count: usize,
    pub revenue: f64,
    pub status_counts: BTreeMap<OrderStatus, usize>,
    pub active_count: usize,
    /// Mean of submitted ratings, `None` when nobody rated.
    pub average_rating: Option<f64>,
}

impl DaySummary {
    /// Aggregate `orders`, which are expected to be pre-filtered to `date`.
    pub fn from_orders(date: NaiveDate, orders: &[Order]) -> Self {
        let mut status_counts: BTreeMap<OrderStatus, usize> =
            OrderStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut revenue = 0.0;
        let mut ratings = Vec::new();

        for order in orders {
            revenue += order.total;
            *status_counts.entry(order.status).or_insert(0) += 1;
            if let Some(rating) = order.rating {
                ratings.push(f64::from(rating));
            }
        }

        let average_rating = if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
        };

        Self {
            date,
            order_count: orders.len(),
            revenue,
            active_count: orders.iter().filter(|o| !o.status.is_terminal()).count(),
            status_counts,
            average_rating,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::placed_order;

    #[test]
    fn test_summary_totals_and_ratings() {
        let mut collected = placed_order("a", 1);
        collected.status = OrderStatus::Collected;
        collected.rating = Some(5);
        let mut rated = placed_order("b", 2);
        rated.status = OrderStatus::Collected;
        rated.rating = Some(4);
        let pending = placed_order("c", 3);

        let date = pending.created_at.date_naive();
        let summary = DaySummary::from_orders(date, &[collected, rated, pending]);

        assert_eq!(summary.order_count, 3);
        assert!((summary.revenue - 756.0).abs() < 1e-9);
        assert_eq!(summary.status_counts[&OrderStatus::Collected], 2);
        assert_eq!(summary.status_counts[&OrderStatus::Ready], 0);
        assert_eq!(summary.active_count, 1);
        assert_eq!(summary.average_rating, Some(4.5));
    }

    #[test]
    fn test_empty_day() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let summary = DaySummary::from_orders(date, &[]);
        assert_eq!(summary.order_count, 0);
        assert_eq!(summary.revenue, 0.0);
        assert_eq!(summary.average_rating, None);
        assert_eq!(summary.status_counts.len(), 4);
    }
}
