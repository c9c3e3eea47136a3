use crate::api::{ApiError, LmsClient};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, SnapshotState};
use crate::model::CourseSnapshot;
use std::collections::HashMap;
use std::sync::Arc;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ApiError> for HandlerErr {
    fn from(e: ApiError) -> Self {
        HandlerErr::new(e.code(), e.to_string())
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn get_bool(params: &serde_json::Value, key: &str, default: bool) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

/// `preferLate` arrives as a `{assessmentId: bool}` object. The toggle is
/// assessment-scoped, never per-student.
pub fn prefer_late_map(params: &serde_json::Value) -> Result<HashMap<String, bool>, HandlerErr> {
    let Some(raw) = params.get("preferLate") else {
        return Ok(HashMap::new());
    };
    if raw.is_null() {
        return Ok(HashMap::new());
    }
    serde_json::from_value(raw.clone())
        .map_err(|_| HandlerErr::new("bad_params", "preferLate must map assessment ids to booleans"))
}

pub fn require_client(state: &AppState) -> Result<Arc<LmsClient>, HandlerErr> {
    state
        .client
        .clone()
        .ok_or_else(|| HandlerErr::new("no_session", "session not configured"))
}

pub fn require_snapshot(state: &AppState) -> Result<&CourseSnapshot, HandlerErr> {
    match &state.snapshot {
        SnapshotState::Ready(snapshot) => Ok(snapshot),
        other => Err(HandlerErr::new(
            "no_snapshot",
            format!("snapshot is {}, load or fetch one first", other.label()),
        )),
    }
}
