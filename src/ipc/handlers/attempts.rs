use super::helpers::{get_bool, get_required_str, require_client, HandlerErr};
use crate::api::AnswerPayload;
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Student taking flow: thin passthroughs over the REST client. The
/// snapshot is teacher-facing and stays untouched here.
pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assessment.get" => Some(match get_assessment(state, req).await {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "attempt.start" => Some(match start(state, req).await {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "attempt.saveAnswer" => Some(match save_answer(state, req).await {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "attempt.submit" => Some(match submit(state, req).await {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        "attempt.mySubmission" => Some(match my_submission(state, req).await {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}

async fn get_assessment(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let client = require_client(state)?;
    let assessment_id = get_required_str(&req.params, "assessmentId")?;
    let include_questions = get_bool(&req.params, "includeQuestions", true);
    let teacher_view = get_bool(&req.params, "teacherView", false);
    let assessment = client
        .get_assessment(&assessment_id, include_questions, teacher_view)
        .await?;
    Ok(json!({ "assessment": assessment }))
}

async fn start(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let client = require_client(state)?;
    let assessment_id = get_required_str(&req.params, "assessmentId")?;
    let submission = client.start_attempt(&assessment_id).await?;
    Ok(json!({ "submission": submission }))
}

async fn save_answer(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let client = require_client(state)?;
    let submission_id = get_required_str(&req.params, "submissionId")?;
    let question_id = get_required_str(&req.params, "questionId")?;
    let answer = AnswerPayload {
        selected_option_id: req
            .params
            .get("selectedOptionId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        text_response: req
            .params
            .get("textResponse")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    };
    if answer.selected_option_id.is_none() && answer.text_response.is_none() {
        return Err(HandlerErr::new(
            "bad_params",
            "either selectedOptionId or textResponse is required",
        ));
    }
    client
        .save_answer(&submission_id, &question_id, &answer)
        .await?;
    Ok(json!({ "saved": true }))
}

async fn submit(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let client = require_client(state)?;
    let submission_id = get_required_str(&req.params, "submissionId")?;
    let submission = client.submit_attempt(&submission_id).await?;
    Ok(json!({ "submission": submission }))
}

async fn my_submission(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let client = require_client(state)?;
    let assessment_id = get_required_str(&req.params, "assessmentId")?;
    let include_answers = get_bool(&req.params, "includeAnswers", true);
    let submission = client
        .get_my_submission(&assessment_id, include_answers)
        .await?;
    Ok(json!({ "submission": submission }))
}
