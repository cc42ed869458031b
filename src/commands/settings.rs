use serde_json::{json, Value};

use super::{err_message, parse_payload, CommandResult};
use crate::outlet::OutletPatch;
use crate::service::PosService;

pub fn outlet_get(service: &PosService) -> CommandResult {
    Ok(json!({ "success": true, "outlet": service.outlet() }))
}

/// Save outlet settings. Fields that fail validation keep their previous
/// value and are listed under `rejected`.
pub fn outlet_update(service: &PosService, arg0: Option<Value>) -> CommandResult {
    let patch: OutletPatch = parse_payload(arg0, "outlet settings")?;
    let merge = service.update_outlet(&patch).map_err(err_message)?;
    Ok(json!({
        "success": true,
        "outlet": merge.profile,
        "rejected": merge.rejected,
    }))
}
