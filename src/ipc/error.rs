use crate::error::EngineError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn engine_details(e: &EngineError) -> Option<serde_json::Value> {
    match e {
        EngineError::DuplicateName { entity, name } => {
            Some(json!({ "entity": entity, "name": name }))
        }
        EngineError::NotFound { entity, key } => Some(json!({ "entity": entity, "key": key })),
        EngineError::SectionClassMismatch {
            section_id,
            class_id,
        } => Some(json!({ "sectionId": section_id, "classId": class_id })),
        EngineError::NoStudents(class_name) => Some(json!({ "className": class_name })),
        EngineError::Storage(_) => Some(json!({ "retryable": e.is_retryable() })),
        EngineError::InvalidInput(_) => None,
    }
}
