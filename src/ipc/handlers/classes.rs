use crate::cascade;
use crate::ipc::helpers::{get_required_i64, get_required_str, to_value, with_store, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde_json::json;

fn classes_list(store: &Store, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classes = store.list_classes()?;
    Ok(json!({ "classes": to_value(&classes)? }))
}

fn classes_with_students(
    store: &Store,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({ "classNames": store.class_names_with_students()? }))
}

fn classes_create(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let class_id = store.create_class(&name)?;
    Ok(json!({ "classId": class_id, "name": name.trim() }))
}

fn classes_rename(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_i64(params, "classId")?;
    let name = get_required_str(params, "name")?;
    store.rename_class(class_id, &name)?;
    Ok(json!({ "ok": true }))
}

fn classes_delete_preview(
    store: &Store,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_i64(params, "classId")?;
    let impact = cascade::class_impact(store, class_id)?;
    Ok(json!({ "classId": class_id, "impact": to_value(&impact)? }))
}

fn classes_delete(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_i64(params, "classId")?;
    let removed = cascade::delete_class(store, class_id)?;
    Ok(json!({ "ok": true, "removed": to_value(&removed)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f = match req.method.as_str() {
        "classes.list" => classes_list,
        "classes.withStudents" => classes_with_students,
        "classes.create" => classes_create,
        "classes.rename" => classes_rename,
        "classes.deletePreview" => classes_delete_preview,
        "classes.delete" => classes_delete,
        _ => return None,
    };
    Some(with_store(state, req, f))
}
