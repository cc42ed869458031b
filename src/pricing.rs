//! Cart and bill arithmetic.
//!
//! Values keep full `f64` precision; rounding happens only when a figure is
//! formatted for display, so repeated recomputation never drifts.

use serde::{Deserialize, Serialize};

use crate::cart::CartLine;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

/// Price a set of cart lines at `tax_rate_percent` (5.0 means 5 %).
pub fn compute(lines: &[CartLine], tax_rate_percent: f64) -> Totals {
    let subtotal: f64 = lines
        .iter()
        .map(|line| line.price * f64::from(line.quantity))
        .sum();
    let tax = subtotal * tax_rate_percent / 100.0;
    Totals {
        subtotal,
        tax,
        total: subtotal + tax,
    }
}

/// Points earned at checkout: one per full 100 of the grand total.
pub fn loyalty_points(total: f64) -> u32 {
    if !total.is_finite() || total <= 0.0 {
        return 0;
    }
    (total / 100.0).floor().min(f64::from(u32::MAX)) as u32
}

/// Two-decimal rendering used on tickets and screens.
pub fn format_money(value: f64) -> String {
    format!("{value:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, price: f64, quantity: u32) -> CartLine {
        CartLine {
            item_id: id.into(),
            name: format!("item {id}"),
            price,
            quantity,
        }
    }

    #[test]
    fn test_espresso_scenario() {
        let totals = compute(&[line("1", 120.0, 2)], 5.0);
        assert_eq!(totals.subtotal, 240.0);
        assert_eq!(totals.tax, 12.0);
        assert_eq!(totals.total, 252.0);
    }

    #[test]
    fn test_total_is_subtotal_plus_tax() {
        let carts = [
            vec![],
            vec![line("a", 0.1, 3)],
            vec![line("a", 19.99, 7), line("b", 4.25, 1), line("c", 0.0, 4)],
            vec![line("x", 1234.5, 12)],
        ];
        for lines in &carts {
            for rate in [0.0, 2.5, 5.0, 12.0, 18.0, 28.0] {
                let totals = compute(lines, rate);
                let expected: f64 = lines
                    .iter()
                    .map(|l| l.price * f64::from(l.quantity))
                    .sum();
                assert_eq!(totals.subtotal, expected);
                assert_eq!(totals.total, totals.subtotal + totals.tax);
                assert!(totals.tax >= 0.0);
            }
        }
    }

    #[test]
    fn test_compute_is_deterministic() {
        let lines = vec![line("a", 33.33, 3), line("b", 0.07, 11)];
        assert_eq!(compute(&lines, 7.5), compute(&lines, 7.5));
    }

    #[test]
    fn test_format_money_rounds_for_display_only() {
        let totals = compute(&[line("a", 10.005, 1)], 0.0);
        assert_eq!(totals.total, 10.005);
        assert_eq!(format_money(252.0), "252.00");
        assert_eq!(format_money(0.5), "0.50");
    }

    #[test]
    fn test_loyalty_points_floor_per_hundred() {
        assert_eq!(loyalty_points(252.0), 2);
        assert_eq!(loyalty_points(99.99), 0);
        assert_eq!(loyalty_points(100.0), 1);
        assert_eq!(loyalty_points(-5.0), 0);
        assert_eq!(loyalty_points(f64::NAN), 0);
    }
}
