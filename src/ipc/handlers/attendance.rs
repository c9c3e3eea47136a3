use super::helpers::{get_required_str, require_client, require_snapshot, HandlerErr};
use crate::api::{AttendancePatch, NewAttendance};
use crate::calc::{round_off_1_decimal, ManualAttendanceSummary};
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use crate::model::AttendanceStatus;
use chrono::NaiveDate;
use serde_json::json;
use std::collections::BTreeMap;

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.summary" => Some(match summary(state) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "attendance.forDate" => Some(match for_date(state, req).await {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "attendance.record" => Some(match record(state, req).await {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "attendance.update" => Some(match update(state, req).await {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}

/// Manual register roll-up: per-student counts/rates plus a per-date tally.
/// Kept apart from the submission-based participation proxy on purpose.
fn summary(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let snapshot = require_snapshot(state)?;

    let mut per_student: BTreeMap<&str, ManualAttendanceSummary> = BTreeMap::new();
    let mut per_date: BTreeMap<NaiveDate, (usize, usize, usize)> = BTreeMap::new();
    for record in &snapshot.attendance {
        let entry = per_student.entry(record.student_id.as_str()).or_default();
        let date_entry = per_date.entry(record.date).or_default();
        match record.status {
            AttendanceStatus::Present => {
                entry.present_count += 1;
                date_entry.0 += 1;
            }
            AttendanceStatus::Late => {
                entry.late_count += 1;
                date_entry.1 += 1;
            }
            AttendanceStatus::Absent => {
                entry.absent_count += 1;
                date_entry.2 += 1;
            }
        }
    }
    for entry in per_student.values_mut() {
        let recorded = entry.present_count + entry.late_count + entry.absent_count;
        entry.attendance_percent = if recorded > 0 {
            round_off_1_decimal(
                100.0 * (entry.present_count + entry.late_count) as f64 / recorded as f64,
            )
        } else {
            0.0
        };
    }

    let per_student_json: BTreeMap<&str, serde_json::Value> = per_student
        .iter()
        .map(|(id, s)| (*id, json!(s)))
        .collect();
    let per_date_json: Vec<serde_json::Value> = per_date
        .iter()
        .map(|(date, (present, late, absent))| {
            json!({
                "date": date,
                "presentCount": present,
                "lateCount": late,
                "absentCount": absent,
            })
        })
        .collect();

    Ok(json!({
        "recordCount": snapshot.attendance.len(),
        "perStudent": per_student_json,
        "perDate": per_date_json,
    }))
}

async fn for_date(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let client = require_client(state)?;
    let course_id = get_required_str(&req.params, "courseId")?;
    let raw_date = get_required_str(&req.params, "date")?;
    let date: NaiveDate = raw_date
        .parse()
        .map_err(|_| HandlerErr::new("bad_params", "date must be YYYY-MM-DD"))?;

    let records = client.list_attendance_for_date(&course_id, date).await?;
    Ok(json!({ "records": records }))
}

async fn record(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let client = require_client(state)?;
    let payload: NewAttendance = serde_json::from_value(req.params.clone())
        .map_err(|e| HandlerErr::new("bad_params", format!("invalid attendance record: {}", e)))?;

    let saved = client.record_attendance(&payload).await?;
    if let crate::ipc::types::SnapshotState::Ready(snapshot) = &mut state.snapshot {
        snapshot.attendance.push(saved.clone());
    }
    Ok(json!({ "record": saved }))
}

async fn update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let client = require_client(state)?;
    let attendance_id = get_required_str(&req.params, "attendanceId")?;
    let patch: AttendancePatch = serde_json::from_value(
        req.params.get("patch").cloned().unwrap_or(json!({})),
    )
    .map_err(|e| HandlerErr::new("bad_params", format!("invalid patch: {}", e)))?;

    let updated = client.update_attendance(&attendance_id, &patch).await?;
    if let crate::ipc::types::SnapshotState::Ready(snapshot) = &mut state.snapshot {
        if let Some(slot) = snapshot.attendance.iter_mut().find(|r| r.id == updated.id) {
            *slot = updated.clone();
        }
    }
    Ok(json!({ "record": updated }))
}
