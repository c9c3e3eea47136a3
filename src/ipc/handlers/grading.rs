use super::helpers::{get_required_str, require_client, HandlerErr};
use crate::calc;
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request, SnapshotState};
use crate::api::GradePayload;
use serde_json::json;

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grading.submit" => Some(match submit(state, req).await {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}

/// Posts a grade and folds the server's updated submission back into the
/// snapshot, so the next statistics call reflects it without a full
/// re-fetch.
async fn submit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let client = require_client(state)?;
    let submission_id = get_required_str(&req.params, "submissionId")?;
    let grade: GradePayload = serde_json::from_value(req.params.clone())
        .map_err(|e| HandlerErr::new("bad_params", format!("invalid grade payload: {}", e)))?;

    let updated = client.grade_submission(&submission_id, &grade).await?;
    tracing::info!(%submission_id, "grade submitted");

    let mut score = None;
    let mut fully_graded = false;
    if let SnapshotState::Ready(snapshot) = &mut state.snapshot {
        snapshot.replace_submission(updated.clone());
        if let Some(assessment) = snapshot.assessment(&updated.assessment_id) {
            score = Some(calc::calculate_score(&updated, &assessment.questions));
        }
        fully_graded = calc::is_fully_graded(&updated);
    }

    Ok(json!({
        "submission": updated,
        "score": score,
        "fullyGraded": fully_graded,
    }))
}
