use super::helpers::{prefer_late_map, require_snapshot, HandlerErr};
use crate::calc;
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "progress.statistics" => Some(match statistics(state, req) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}

fn statistics(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let snapshot = require_snapshot(state)?;
    let prefer_late = prefer_late_map(&req.params)?;

    let stats = calc::build_statistics(
        &snapshot.students,
        &snapshot.modules,
        &snapshot.assessments,
        &snapshot.submissions,
        &snapshot.attendance,
        &prefer_late,
    );
    serde_json::to_value(&stats)
        .map_err(|e| HandlerErr::new("internal", format!("serialize statistics: {}", e)))
        .map(|v| json!({ "statistics": v }))
}
