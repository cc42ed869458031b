//! Front-end style entry points.
//!
//! Each command takes loosely shaped JSON arguments (camelCase or
//! snake_case), turns them into typed requests and answers with a
//! `{ "success": true, ... }` envelope or an error message.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::PosError;

pub mod menu;
pub mod orders;
pub mod settings;

pub type CommandResult = Result<Value, String>;

fn parse_payload<T: DeserializeOwned>(arg0: Option<Value>, what: &str) -> Result<T, String> {
    let payload = arg0.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(payload).map_err(|e| format!("Invalid {what} payload: {e}"))
}

fn err_message(e: PosError) -> String {
    e.to_string()
}

/// Accept either a bare id string or an object carrying one of `keys`.
fn id_arg(arg0: Option<&Value>, keys: &[&str]) -> Result<String, String> {
    let raw = match arg0 {
        Some(Value::String(id)) => Some(id.as_str()),
        Some(Value::Object(obj)) => keys
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str)),
        _ => None,
    };
    raw.map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("Missing {}", keys.first().copied().unwrap_or("id")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_arg_shapes() {
        assert_eq!(id_arg(Some(&json!(" abc ")), &["orderId"]).unwrap(), "abc");
        assert_eq!(
            id_arg(Some(&json!({ "order_id": "x" })), &["orderId", "order_id"]).unwrap(),
            "x"
        );
        assert_eq!(
            id_arg(None, &["orderId"]).unwrap_err(),
            "Missing orderId"
        );
        assert!(id_arg(Some(&json!({ "orderId": "" })), &["orderId"]).is_err());
    }
}
