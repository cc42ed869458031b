use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{err_message, id_arg, parse_payload, CommandResult};
use crate::cart::Cart;
use crate::lifecycle::Transition;
use crate::models::{OrderStatus, PaymentMethod};
use crate::service::PosService;
use crate::store::OrderFilter;

const ORDER_ID_KEYS: &[&str] = &["orderId", "order_id", "id"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreateItem {
    #[serde(alias = "menuItemId", alias = "menu_item_id", alias = "itemId")]
    id: String,
    #[serde(default = "default_quantity")]
    quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreatePayload {
    #[serde(default)]
    items: Vec<OrderCreateItem>,
    #[serde(default, alias = "table_number")]
    table_number: Option<u32>,
    #[serde(default, alias = "payment_method")]
    payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderUpdateStatusPayload {
    #[serde(alias = "order_id", alias = "id")]
    order_id: String,
    status: String,
    #[serde(default, alias = "estimated_time", alias = "etaMinutes")]
    estimated_time: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRatePayload {
    #[serde(alias = "order_id", alias = "id")]
    order_id: String,
    rating: u8,
    #[serde(default)]
    feedback: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderListPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "table_number")]
    table_number: Option<u32>,
    #[serde(default)]
    limit: Option<usize>,
}

/// Build a cart from `{ items: [{ id, quantity }], tableNumber?,
/// paymentMethod? }` against the live menu and check it out. Payment
/// defaults to CASH.
pub async fn order_create(service: &PosService, arg0: Option<Value>) -> CommandResult {
    let payload: OrderCreatePayload = parse_payload(arg0, "order create")?;
    let payment_method = match payload.payment_method.as_deref() {
        None => PaymentMethod::default(),
        Some(raw) => PaymentMethod::parse(raw)
            .ok_or_else(|| format!("Unknown payment method: {raw}"))?,
    };
    let mut cart = Cart::new();
    for line in &payload.items {
        let item = service.menu_item(line.id.trim()).map_err(err_message)?;
        if !item.available {
            return Err(format!("{} is not available", item.name));
        }
        // Repeated ids accumulate like repeated taps.
        let existing = i64::from(cart.quantity_of(&item.id).unwrap_or(0));
        cart.add(&item);
        cart.set_quantity(&item.id, existing + line.quantity);
    }

    let order = service
        .place_order(&mut cart, payload.table_number, payment_method)
        .await
        .map_err(err_message)?;
    Ok(json!({
        "success": true,
        "order": order,
        "trackingUrl": service.tracking_url(&order.id),
    }))
}

fn parse_order_update_status_payload(
    arg0: Option<Value>,
    arg1: Option<String>,
) -> Result<OrderUpdateStatusPayload, String> {
    let payload = match arg0 {
        Some(Value::Object(mut obj)) => {
            if obj.get("status").is_none() {
                if let Some(status) = arg1 {
                    obj.insert("status".to_string(), Value::String(status));
                }
            }
            Value::Object(obj)
        }
        Some(Value::String(order_id)) => json!({ "orderId": order_id, "status": arg1 }),
        Some(v) => v,
        None => json!({ "status": arg1 }),
    };
    let mut parsed: OrderUpdateStatusPayload = serde_json::from_value(payload)
        .map_err(|e| format!("Invalid order status payload: {e}"))?;
    parsed.order_id = parsed.order_id.trim().to_string();
    if parsed.order_id.is_empty() {
        return Err("Missing orderId".into());
    }
    Ok(parsed)
}

/// Move an order to the named status. Only the single legal transition into
/// that status is attempted.
pub async fn order_update_status(
    service: &PosService,
    arg0: Option<Value>,
    arg1: Option<String>,
) -> CommandResult {
    let payload = parse_order_update_status_payload(arg0, arg1)?;
    let target = OrderStatus::parse(&payload.status)
        .ok_or_else(|| format!("Unknown status: {}", payload.status))?;
    if target == OrderStatus::Preparing && payload.estimated_time.is_none() {
        return Err("estimatedTime is required to start preparing".into());
    }
    let transition = Transition::into_status(target, payload.estimated_time.unwrap_or(0))
        .ok_or_else(|| format!("Orders cannot be moved back to {target}"))?;

    let order = service
        .transition(&payload.order_id, transition)
        .await
        .map_err(err_message)?;
    info!(order_id = %order.id, status = %order.status, "Status updated via command");
    Ok(json!({
        "success": true,
        "orderId": order.id,
        "status": order.status,
        "order": order,
    }))
}

pub async fn order_rate(service: &PosService, arg0: Option<Value>) -> CommandResult {
    let payload: OrderRatePayload = parse_payload(arg0, "order rating")?;
    let order = service
        .rate(payload.order_id.trim(), payload.rating, payload.feedback)
        .await
        .map_err(err_message)?;
    Ok(json!({ "success": true, "order": order }))
}

pub fn order_get_by_id(service: &PosService, arg0: Option<Value>) -> CommandResult {
    let order_id = id_arg(arg0.as_ref(), ORDER_ID_KEYS)?;
    let order = service.get_order(&order_id).map_err(err_message)?;
    Ok(json!({
        "success": true,
        "order": order,
        "trackingUrl": service.tracking_url(&order.id),
    }))
}

pub fn order_get_all(service: &PosService, arg0: Option<Value>) -> CommandResult {
    let payload: OrderListPayload = parse_payload(arg0, "order list")?;
    let mut filter = match payload.status.as_deref().map(str::trim) {
        None | Some("") => OrderFilter::all(),
        Some("active") => OrderFilter::active(),
        Some(raw) => OrderFilter::with_status(
            OrderStatus::parse(raw).ok_or_else(|| format!("Unknown status: {raw}"))?,
        ),
    };
    filter.table_number = payload.table_number;
    filter.limit = payload.limit;

    let orders = service.list_orders(&filter).map_err(err_message)?;
    Ok(json!({ "success": true, "count": orders.len(), "orders": orders }))
}
