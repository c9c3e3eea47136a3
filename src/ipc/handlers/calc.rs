use super::helpers::{get_bool, get_required_str, require_snapshot, HandlerErr};
use crate::calc;
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.submissionScore" => Some(match submission_score(state, req) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "calc.bestSubmission" => Some(match best_submission(state, req) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}

fn submission_score(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let snapshot = require_snapshot(state)?;
    let submission_id = get_required_str(&req.params, "submissionId")?;
    let Some(submission) = snapshot.submission(&submission_id) else {
        return Err(HandlerErr::new("not_found", "submission not in snapshot"));
    };
    // An unknown assessment degrades to an empty question list (0/0 score),
    // matching the engine's missing-reference policy.
    let questions = snapshot
        .assessment(&submission.assessment_id)
        .map(|a| a.questions.as_slice())
        .unwrap_or(&[]);

    let breakdown = calc::calculate_score(submission, questions);
    Ok(json!({
        "submissionId": submission.id,
        "score": breakdown,
        "fullyGraded": calc::is_fully_graded(submission),
    }))
}

fn best_submission(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let snapshot = require_snapshot(state)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let assessment_id = get_required_str(&req.params, "assessmentId")?;
    let prefer_late = get_bool(&req.params, "preferLate", false);

    let questions = snapshot
        .assessment(&assessment_id)
        .map(|a| a.questions.as_slice())
        .unwrap_or(&[]);
    let best = calc::select_best_submission(
        &student_id,
        &assessment_id,
        &snapshot.submissions,
        questions,
        prefer_late,
    );

    let result = match best {
        Some(submission) => json!({
            "submissionId": submission.id,
            "status": submission.status,
            "isLate": submission.is_late,
            "submitTime": submission.submit_time,
            "score": calc::calculate_score(submission, questions),
            "fullyGraded": calc::is_fully_graded(submission),
        }),
        None => json!(null),
    };
    Ok(json!({ "best": result }))
}
