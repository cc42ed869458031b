//! Plain-text kitchen tickets and customer bills.
//!
//! Output is monospace text sized to the configured roll width; the host
//! decides whether it goes to a printer, a spool file or a preview.

use chrono::{DateTime, Utc};

use crate::models::Order;
use crate::outlet::OutletProfile;
use crate::pricing::format_money;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperWidth {
    Mm58,
    Mm80,
}

impl PaperWidth {
    pub fn chars(self) -> usize {
        match self {
            PaperWidth::Mm58 => 32,
            PaperWidth::Mm80 => 48,
        }
    }

    pub fn from_mm(mm: u32) -> Self {
        if mm <= 58 {
            PaperWidth::Mm58
        } else {
            PaperWidth::Mm80
        }
    }
}

/// Customer tracking link for an order, e.g. `https://host/order/<id>`.
pub fn tracking_url(base: &str, order_id: &str) -> String {
    format!("{}/order/{}", base.trim_end_matches('/'), order_id)
}

struct TicketWriter {
    out: String,
    width: usize,
}

impl TicketWriter {
    fn new(paper: PaperWidth) -> Self {
        Self {
            out: String::new(),
            width: paper.chars(),
        }
    }

    fn line(&mut self, text: &str) -> &mut Self {
        self.out.push_str(text.trim_end());
        self.out.push('\n');
        self
    }

    fn center(&mut self, text: &str) -> &mut Self {
        let len = text.chars().count();
        let pad = self.width.saturating_sub(len) / 2;
        let padded = format!("{}{}", " ".repeat(pad), text);
        self.line(&padded)
    }

    fn rule(&mut self) -> &mut Self {
        let rule = "-".repeat(self.width);
        self.line(&rule)
    }

    /// Label on the left, value flush right. Long labels wrap and the value
    /// gets its own right-aligned line.
    fn pair(&mut self, label: &str, value: &str) -> &mut Self {
        let label_len = label.chars().count();
        let value_len = value.chars().count();
        if label_len + value_len < self.width {
            let gap = self.width - label_len - value_len;
            let joined = format!("{label}{}{value}", " ".repeat(gap));
            return self.line(&joined);
        }
        for part in wrap(label, self.width.saturating_sub(value_len + 1).max(8)) {
            self.line(&part);
        }
        let right = format!("{:>width$}", value, width = self.width);
        self.line(&right)
    }

    fn wrapped(&mut self, text: &str) -> &mut Self {
        for part in wrap(text, self.width) {
            self.line(&part);
        }
        self
    }

    fn finish(self) -> String {
        self.out
    }
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut line = String::new();
    for token in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(token);
            continue;
        }
        if line.chars().count() + 1 + token.chars().count() > width.max(8) {
            out.push(std::mem::take(&mut line));
            line.push_str(token);
        } else {
            line.push(' ');
            line.push_str(token);
        }
    }
    if !line.is_empty() || out.is_empty() {
        out.push(line);
    }
    out
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

/// Kitchen order ticket: what to make, never what it costs.
pub fn render_kot(order: &Order, outlet: &OutletProfile, paper: PaperWidth) -> String {
    let mut w = TicketWriter::new(paper);
    w.center("KOT").rule();
    w.pair("Outlet", &outlet.name)
        .pair("Order", &format!("#{}", order.order_no))
        .pair("Time", &stamp(order.created_at));
    if let Some(table) = order.table_number {
        w.pair("Table", &table.to_string());
    }
    w.rule();
    for item in &order.items {
        w.pair(&item.name, &format!("x{}", item.quantity));
    }
    w.rule().center("--- Kitchen Copy ---");
    w.finish()
}

/// Customer bill with line totals, tax and the tracking link.
pub fn render_bill(
    order: &Order,
    outlet: &OutletProfile,
    paper: PaperWidth,
    tracking_url: &str,
) -> String {
    let mut w = TicketWriter::new(paper);
    w.center(&outlet.name);
    if !outlet.address.trim().is_empty() {
        w.center(&outlet.address);
    }
    if !outlet.phone.trim().is_empty() {
        w.center(&format!("Ph: {}", outlet.phone));
    }
    w.rule()
        .pair("Order", &format!("#{}", order.order_no))
        .pair("Date", &stamp(order.created_at));
    if let Some(table) = order.table_number {
        w.pair("Table", &table.to_string());
    }
    w.rule();
    for item in &order.items {
        w.pair(
            &format!("{} x{}", item.name, item.quantity),
            &format_money(item.line_total()),
        );
    }
    w.rule()
        .pair("Subtotal", &format_money(order.subtotal))
        .pair(
            &format!("Tax ({}%)", trim_rate(order.applied_tax_rate())),
            &format_money(order.tax),
        )
        .pair("Total", &format_money(order.total))
        .pair("Paid by", order.payment_method.as_str());
    if order.loyalty_points_earned > 0 {
        w.pair("Points earned", &order.loyalty_points_earned.to_string());
    }
    w.rule()
        .center("Track your order:")
        .wrapped(tracking_url)
        .rule()
        .center("Thank you!");
    w.finish()
}

fn trim_rate(rate: f64) -> String {
    let text = format!("{rate:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
