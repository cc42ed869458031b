//! Typed decoding of change-feed payloads.
//!
//! Hosted backends deliver changes as `{"eventType": "INSERT" | "UPDATE",
//! "new": {...order row...}}`. Rows are checked with `Order::validate` before
//! they reach a board, so a malformed push can never corrupt a view.

use serde::Deserialize;
use serde_json::Value;

use super::OrderEvent;
use crate::error::{PosError, PosResult};
use crate::models::Order;

#[derive(Debug, Deserialize)]
struct ChangePayload {
    #[serde(rename = "eventType", alias = "event_type", alias = "type")]
    event_type: String,
    #[serde(alias = "record")]
    new: Option<Value>,
}

pub fn parse_change(raw: &Value) -> PosResult<OrderEvent> {
    let payload: ChangePayload = serde_json::from_value(raw.clone())
        .map_err(|e| PosError::Validation(format!("malformed change payload: {e}")))?;

    let row = payload
        .new
        .ok_or_else(|| PosError::Validation("change payload has no order row".into()))?;
    let order: Order = serde_json::from_value(row)
        .map_err(|e| PosError::Validation(format!("malformed order row: {e}")))?;
    order.validate()?;

    match payload.event_type.to_ascii_uppercase().as_str() {
        "INSERT" => Ok(OrderEvent::Insert(order)),
        "UPDATE" => Ok(OrderEvent::Update(order)),
        other => Err(PosError::Validation(format!(
            "unsupported change type: {other}"
        ))),
    }
}
