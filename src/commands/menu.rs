use serde::Deserialize;
use serde_json::{json, Value};

use super::{err_message, id_arg, parse_payload, CommandResult};
use crate::menu::{MenuItemPatch, NewMenuItem};
use crate::service::PosService;

const ITEM_ID_KEYS: &[&str] = &["itemId", "item_id", "id"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MenuListPayload {
    #[serde(default, alias = "category_id", alias = "categoryId")]
    category: Option<String>,
    #[serde(default, alias = "available_only")]
    available_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MenuUpdatePayload {
    #[serde(alias = "item_id", alias = "id")]
    item_id: String,
    #[serde(flatten)]
    patch: MenuItemPatch,
}

#[derive(Debug, Deserialize)]
struct CategoryPayload {
    name: String,
}

pub fn menu_get_items(service: &PosService, arg0: Option<Value>) -> CommandResult {
    let payload: MenuListPayload = parse_payload(arg0, "menu list")?;
    let category = payload
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let items = if payload.available_only {
        service.available_items(category)
    } else {
        service.menu_items(category)
    };
    Ok(json!({ "success": true, "items": items }))
}

pub fn menu_get_categories(service: &PosService) -> CommandResult {
    Ok(json!({ "success": true, "categories": service.categories() }))
}

pub fn menu_add_item(service: &PosService, arg0: Option<Value>) -> CommandResult {
    let payload: NewMenuItem = parse_payload(arg0, "menu item")?;
    let item = service.add_menu_item(payload).map_err(err_message)?;
    Ok(json!({ "success": true, "item": item }))
}

pub fn menu_update_item(service: &PosService, arg0: Option<Value>) -> CommandResult {
    let payload: MenuUpdatePayload = parse_payload(arg0, "menu update")?;
    let item = service
        .update_menu_item(payload.item_id.trim(), &payload.patch)
        .map_err(err_message)?;
    Ok(json!({ "success": true, "item": item }))
}

pub fn menu_delete_item(service: &PosService, arg0: Option<Value>) -> CommandResult {
    let item_id = id_arg(arg0.as_ref(), ITEM_ID_KEYS)?;
    let item = service.delete_menu_item(&item_id).map_err(err_message)?;
    Ok(json!({ "success": true, "itemId": item.id }))
}

pub fn menu_add_category(service: &PosService, arg0: Option<Value>) -> CommandResult {
    let payload: CategoryPayload = parse_payload(arg0, "category")?;
    let category = service.add_category(&payload.name).map_err(err_message)?;
    Ok(json!({ "success": true, "category": category }))
}

pub fn menu_delete_category(service: &PosService, arg0: Option<Value>) -> CommandResult {
    let category_id = id_arg(arg0.as_ref(), &["categoryId", "category_id", "id"])?;
    let deleted = service.delete_category(&category_id).map_err(err_message)?;
    Ok(json!({ "success": deleted, "categoryId": category_id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::memory_service;

    #[test]
    fn test_add_update_delete_item() {
        let service = memory_service();
        let added = menu_add_item(
            &service,
            Some(json!({ "name": "Masala Chai", "price": 60, "category_id": "Tea" })),
        )
        .unwrap();
        let id = added["item"]["id"].as_str().unwrap().to_string();
        assert_eq!(added["item"]["available"], true);

        let updated = menu_update_item(
            &service,
            Some(json!({ "itemId": id, "price": 70.0, "available": false })),
        )
        .unwrap();
        assert_eq!(updated["item"]["price"], 70.0);

        let tea = menu_get_items(&service, Some(json!({ "category": "Tea" }))).unwrap();
        assert_eq!(tea["items"].as_array().unwrap().len(), 2);
        let tea_available =
            menu_get_items(&service, Some(json!({ "category": "Tea", "availableOnly": true })))
                .unwrap();
        assert_eq!(tea_available["items"].as_array().unwrap().len(), 1);

        menu_delete_item(&service, Some(json!(id))).unwrap();
        let err = menu_delete_item(&service, Some(json!({ "id": id }))).unwrap_err();
        assert!(err.contains("menu item not found"));
    }

    #[test]
    fn test_invalid_items_are_rejected() {
        let service = memory_service();
        assert!(menu_add_item(&service, Some(json!({ "name": "", "price": 10 }))).is_err());
        assert!(menu_add_item(&service, Some(json!({ "name": "Free", "price": -1 }))).is_err());
        assert!(menu_add_item(&service, None).is_err());
        assert!(menu_update_item(&service, Some(json!({ "id": "1", "price": -5 }))).is_err());
        assert_eq!(service.menu_item("1").unwrap().price, 120.0);
    }

    #[test]
    fn test_categories() {
        let service = memory_service();
        let added = menu_add_category(&service, Some(json!({ "name": "Snacks" }))).unwrap();
        let id = added["category"]["id"].as_str().unwrap().to_string();
        let listed = menu_get_categories(&service).unwrap();
        assert_eq!(listed["categories"].as_array().unwrap().len(), 3);
        let deleted = menu_delete_category(&service, Some(json!({ "categoryId": id }))).unwrap();
        assert_eq!(deleted["success"], true);
    }
}
