use crate::error::EngineError;
use crate::ipc::error::{engine_details, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use tracing::warn;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<EngineError> for HandlerErr {
    fn from(e: EngineError) -> Self {
        HandlerErr {
            code: e.code(),
            details: engine_details(&e),
            message: e.to_string(),
        }
    }
}

/// Runs `f` against the open store, mapping its outcome to a response.
pub fn with_store(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Store, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => {
            warn!(method = %req.method, code = error.code, message = %error.message, "request failed");
            error.response(&req.id)
        }
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Integer params arrive as JSON numbers or, from dropdowns, as numeric strings.
fn integer_from(v: &serde_json::Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
}

pub fn get_optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => integer_from(v)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

/// Every entry must be an integer; one bad entry rejects the whole list.
pub fn get_required_i64_list(params: &serde_json::Value, key: &str) -> Result<Vec<i64>, HandlerErr> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, v)| {
            integer_from(v)
                .ok_or_else(|| HandlerErr::bad_params(format!("{}[{}] must be an integer", key, i)))
        })
        .collect()
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    get_optional_i64(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_required_i32(params: &serde_json::Value, key: &str) -> Result<i32, HandlerErr> {
    let v = get_required_i64(params, key)?;
    i32::try_from(v).map_err(|_| HandlerErr::bad_params(format!("{} out of range", key)))
}

pub fn to_value<T: serde::Serialize>(v: &T) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(v).map_err(|e| HandlerErr {
        code: "encode_failed",
        message: e.to_string(),
        details: None,
    })
}
