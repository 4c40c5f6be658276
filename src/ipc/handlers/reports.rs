use crate::ipc::helpers::{
    get_required_i32, get_required_i64, get_required_str, to_value, with_store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::reports::{self, WorkingDaysScope};
use crate::store::Store;
use serde_json::json;

fn parse_month_param(params: &serde_json::Value) -> Result<u32, HandlerErr> {
    match params.get("month") {
        Some(serde_json::Value::Number(n)) => {
            let m = n
                .as_u64()
                .ok_or_else(|| HandlerErr::bad_params("month must be between 1 and 12"))?;
            Ok(reports::parse_month(&m.to_string())?)
        }
        Some(serde_json::Value::String(s)) => Ok(reports::parse_month(s)?),
        _ => Err(HandlerErr::bad_params("missing month")),
    }
}

fn reports_class_month(
    store: &Store,
    params: &serde_json::Value,
    default_scope: WorkingDaysScope,
) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_required_str(params, "className")?;
    let year = get_required_i32(params, "year")?;
    let month = parse_month_param(params)?;
    let scope = match params.get("workingDaysScope").and_then(|v| v.as_str()) {
        Some(raw) => raw.parse::<WorkingDaysScope>()?,
        None => default_scope,
    };
    let report = reports::class_monthly_report(store, &class_name, year, month, scope)?;
    to_value(&report)
}

fn reports_student_year(
    store: &Store,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let year = get_required_i32(params, "year")?;
    let summary = reports::student_yearly_summary(store, student_id, year)?;
    Ok(json!({ "summary": to_value(&summary)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.classMonth" => {
            let scope = state.config.working_days_scope;
            Some(with_store(state, req, |store, params| {
                reports_class_month(store, params, scope)
            }))
        }
        "reports.studentYear" => Some(with_store(state, req, reports_student_year)),
        _ => None,
    }
}
