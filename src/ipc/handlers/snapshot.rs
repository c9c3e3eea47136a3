use super::helpers::{get_required_str, require_client, HandlerErr};
use crate::fetch::{self, DEFAULT_CONCURRENCY};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request, SnapshotState};
use crate::model::{
    Assessment, AttendanceRecord, CourseModule, CourseSnapshot, Student, Submission,
};
use chrono::Utc;
use serde_json::json;

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "snapshot.load" => Some(match load_snapshot(state, req) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "snapshot.fetch" => Some(fetch_snapshot(state, req).await),
        "snapshot.status" => Some(ok(&req.id, status(state))),
        _ => None,
    }
}

fn parse_collection<T: serde::de::DeserializeOwned>(
    params: &serde_json::Value,
    key: &str,
) -> Result<Vec<T>, HandlerErr> {
    let Some(raw) = params.get(key) else {
        return Ok(Vec::new());
    };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::new("bad_params", format!("invalid {}: {}", key, e)))
}

/// Installs an already-fetched snapshot handed over by the host page.
fn load_snapshot(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(&req.params, "courseId")?;
    let students: Vec<Student> = parse_collection(&req.params, "students")?;
    let modules: Vec<CourseModule> = parse_collection(&req.params, "modules")?;
    let assessments: Vec<Assessment> = parse_collection(&req.params, "assessments")?;
    let submissions: Vec<Submission> = parse_collection(&req.params, "submissions")?;
    let attendance: Vec<AttendanceRecord> = parse_collection(&req.params, "attendance")?;

    let snapshot = CourseSnapshot {
        course_id,
        fetched_at: Utc::now(),
        students,
        modules,
        assessments,
        submissions,
        attendance,
        failures: Vec::new(),
    };
    let result = summarize(&snapshot);
    state.snapshot = SnapshotState::Ready(snapshot);
    Ok(result)
}

async fn fetch_snapshot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let client = match require_client(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let course_id = match get_required_str(&req.params, "courseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let concurrency = req
        .params
        .get("concurrency")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_CONCURRENCY);

    state.snapshot = SnapshotState::Loading;
    match fetch::fetch_course_snapshot(client, &course_id, concurrency).await {
        Ok(snapshot) => {
            let result = summarize(&snapshot);
            state.snapshot = SnapshotState::Ready(snapshot);
            ok(&req.id, result)
        }
        Err(e) => {
            tracing::warn!(%course_id, error = %e, "snapshot fetch failed");
            state.snapshot = SnapshotState::Failed {
                error: e.to_string(),
            };
            err(&req.id, e.code(), e.to_string(), None)
        }
    }
}

fn summarize(snapshot: &CourseSnapshot) -> serde_json::Value {
    json!({
        "courseId": snapshot.course_id,
        "fetchedAt": snapshot.fetched_at,
        "studentCount": snapshot.students.len(),
        "moduleCount": snapshot.modules.len(),
        "assessmentCount": snapshot.assessments.len(),
        "submissionCount": snapshot.submissions.len(),
        "attendanceCount": snapshot.attendance.len(),
        "failures": snapshot.failures,
    })
}

fn status(state: &AppState) -> serde_json::Value {
    match &state.snapshot {
        SnapshotState::Ready(snapshot) => {
            let mut result = summarize(snapshot);
            result["state"] = json!("ready");
            result
        }
        SnapshotState::Failed { error } => json!({
            "state": "failed",
            "error": error,
        }),
        other => json!({ "state": other.label() }),
    }
}
