use crate::attendance::{self, AttendanceEntry, AttendanceStatus, RosterRow};
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_required_i64, get_required_i64_list, get_required_str, to_value, with_store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde_json::json;

fn parse_status(params: &serde_json::Value) -> Result<AttendanceStatus, HandlerErr> {
    Ok(get_required_str(params, "status")?.parse::<AttendanceStatus>()?)
}

fn parse_entries(params: &serde_json::Value) -> Result<Vec<AttendanceEntry>, HandlerErr> {
    let Some(items) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing entries"));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let student_id = get_required_i64(item, "studentId").map_err(|e| HandlerErr {
                message: format!("entries[{}]: {}", i, e.message),
                ..e
            })?;
            let status = parse_status(item).map_err(|e| HandlerErr {
                message: format!("entries[{}]: {}", i, e.message),
                ..e
            })?;
            Ok(AttendanceEntry::new(student_id, status))
        })
        .collect()
}

fn attendance_roster(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let section_id = get_required_i64(params, "sectionId")?;
    let date = attendance::parse_date(&get_required_str(params, "date")?)?;
    let rows = attendance::load_roster(store, section_id, date)?;
    Ok(json!({
        "date": date.format(attendance::DATE_FORMAT).to_string(),
        "rows": to_value(&rows)?
    }))
}

fn parse_rows(params: &serde_json::Value) -> Result<Vec<RosterRow>, HandlerErr> {
    let rows = params
        .get("rows")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing rows"))?;
    serde_json::from_value(rows).map_err(|e| HandlerErr::bad_params(format!("invalid rows: {}", e)))
}

fn attendance_apply_status(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let rows = parse_rows(params)?;
    let selected = get_required_i64_list(params, "studentIds")?;
    let status = parse_status(params)?;
    let rows = attendance::apply_status(rows, &selected, status);
    Ok(json!({ "rows": to_value(&rows)? }))
}

fn attendance_toggle(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let rows = parse_rows(params)?;
    let student_id = get_required_i64(params, "studentId")?;
    let rows = attendance::toggle_status(rows, student_id);
    Ok(json!({ "rows": to_value(&rows)? }))
}

fn attendance_save(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = attendance::parse_date(&get_required_str(params, "date")?)?;
    let entries = parse_entries(params)?;
    let outcome = attendance::save_attendance(store, date, &entries)?;
    Ok(json!({
        "date": date.format(attendance::DATE_FORMAT).to_string(),
        "inserted": outcome.inserted,
        "updated": outcome.updated
    }))
}

fn attendance_list(store: &Store, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let records = attendance::list_records(store)?;
    Ok(json!({ "records": to_value(&records)? }))
}

fn attendance_set_status(
    store: &Store,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_i64(params, "recordId")?;
    let status = parse_status(params)?;
    attendance::set_record_status(store, record_id, status)?;
    Ok(json!({ "ok": true }))
}

fn attendance_delete(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_i64(params, "recordId")?;
    attendance::delete_record(store, record_id)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    // Editing an in-memory batch needs no workspace.
    let edit: Option<fn(&serde_json::Value) -> Result<serde_json::Value, HandlerErr>> =
        match req.method.as_str() {
            "attendance.applyStatus" => Some(attendance_apply_status),
            "attendance.toggle" => Some(attendance_toggle),
            _ => None,
        };
    if let Some(edit) = edit {
        return Some(match edit(&req.params) {
            Ok(result) => ok(&req.id, result),
            Err(error) => error.response(&req.id),
        });
    }
    let f = match req.method.as_str() {
        "attendance.roster" => attendance_roster,
        "attendance.save" => attendance_save,
        "attendance.list" => attendance_list,
        "attendance.setStatus" => attendance_set_status,
        "attendance.delete" => attendance_delete,
        _ => return None,
    };
    Some(with_store(state, req, f))
}
