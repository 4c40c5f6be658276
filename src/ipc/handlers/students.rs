use crate::cascade;
use crate::error::EngineError;
use crate::ipc::helpers::{
    get_optional_i64, get_required_i64, get_required_str, to_value, with_store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{Store, StudentFilter};
use serde_json::json;

fn students_list(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_optional_i64(params, "classId")?;
    let section_id = get_optional_i64(params, "sectionId")?;
    let filter = match (class_id, section_id) {
        (_, Some(section_id)) => {
            if let Some(class_id) = class_id {
                // Reject a section picked from another class instead of listing nothing.
                let section = store.get_section(section_id)?;
                if section.class_id != class_id {
                    return Err(EngineError::SectionClassMismatch {
                        section_id,
                        class_id,
                    }
                    .into());
                }
            }
            StudentFilter::Section(section_id)
        }
        (Some(class_id), None) => StudentFilter::Class(class_id),
        (None, None) => StudentFilter::All,
    };
    let students = store.list_students(filter)?;
    Ok(json!({ "students": to_value(&students)? }))
}

fn students_create(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let class_id = get_required_i64(params, "classId")?;
    let section_id = get_required_i64(params, "sectionId")?;
    let student_id = store.create_student(&name, class_id, section_id)?;
    Ok(json!({ "studentId": student_id }))
}

fn students_rename(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let name = get_required_str(params, "name")?;
    store.rename_student(student_id, &name)?;
    Ok(json!({ "ok": true }))
}

fn students_delete_preview(
    store: &Store,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let impact = cascade::student_impact(store, student_id)?;
    Ok(json!({ "studentId": student_id, "impact": to_value(&impact)? }))
}

fn students_delete(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let removed = cascade::delete_student(store, student_id)?;
    Ok(json!({ "ok": true, "removed": to_value(&removed)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f = match req.method.as_str() {
        "students.list" => students_list,
        "students.create" => students_create,
        "students.rename" => students_rename,
        "students.deletePreview" => students_delete_preview,
        "students.delete" => students_delete,
        _ => return None,
    };
    Some(with_store(state, req, f))
}
