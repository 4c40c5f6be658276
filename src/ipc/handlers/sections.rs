use crate::cascade;
use crate::ipc::helpers::{
    get_optional_i64, get_required_i64, get_required_str, to_value, with_store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde_json::json;

fn sections_list(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_optional_i64(params, "classId")?;
    let sections = store.list_sections(class_id)?;
    Ok(json!({ "sections": to_value(&sections)? }))
}

fn sections_create(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_i64(params, "classId")?;
    let name = get_required_str(params, "name")?;
    let section_id = store.create_section(class_id, &name)?;
    Ok(json!({ "sectionId": section_id, "classId": class_id, "name": name.trim() }))
}

fn sections_rename(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let section_id = get_required_i64(params, "sectionId")?;
    let name = get_required_str(params, "name")?;
    store.rename_section(section_id, &name)?;
    Ok(json!({ "ok": true }))
}

fn sections_delete_preview(
    store: &Store,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let section_id = get_required_i64(params, "sectionId")?;
    let impact = cascade::section_impact(store, section_id)?;
    Ok(json!({ "sectionId": section_id, "impact": to_value(&impact)? }))
}

fn sections_delete(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let section_id = get_required_i64(params, "sectionId")?;
    let removed = cascade::delete_section(store, section_id)?;
    Ok(json!({ "ok": true, "removed": to_value(&removed)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f = match req.method.as_str() {
        "sections.list" => sections_list,
        "sections.create" => sections_create,
        "sections.rename" => sections_rename,
        "sections.deletePreview" => sections_delete_preview,
        "sections.delete" => sections_delete,
        _ => return None,
    };
    Some(with_store(state, req, f))
}
