use super::helpers::{get_required_str, prefer_late_map, require_snapshot, HandlerErr};
use crate::calc;
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use crate::model::SubmissionStatus;
use serde_json::json;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.studentOverview" => Some(match student_overview(state, req) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}

/// One row per assessment for a single student: the representative attempt,
/// its score, and a display status derived from grading completeness rather
/// than the server-reported submission status.
fn student_overview(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let snapshot = require_snapshot(state)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let prefer_late = prefer_late_map(&req.params)?;

    let mut rows = Vec::with_capacity(snapshot.assessments.len());
    let mut sum = 0.0_f64;
    let mut attempted = 0_usize;
    for assessment in &snapshot.assessments {
        let prefer = prefer_late
            .get(assessment.id.as_str())
            .copied()
            .unwrap_or(false);
        let best = calc::select_best_submission(
            &student_id,
            &assessment.id,
            &snapshot.submissions,
            &assessment.questions,
            prefer,
        );

        let passing_percent = if assessment.max_score > 0.0 {
            100.0 * assessment.passing_score / assessment.max_score
        } else {
            0.0
        };

        let row = match best {
            Some(submission) => {
                let score = calc::calculate_score(submission, &assessment.questions);
                let fully_graded = calc::is_fully_graded(submission);
                let display_status = if fully_graded {
                    "graded"
                } else if submission.status == SubmissionStatus::InProgress {
                    "in-progress"
                } else {
                    "submitted"
                };
                sum += score.percentage;
                attempted += 1;
                json!({
                    "assessmentId": assessment.id,
                    "title": assessment.title,
                    "type": assessment.kind,
                    "moduleId": assessment.module_id,
                    "dueDate": assessment.due_date,
                    "displayStatus": display_status,
                    "submissionId": submission.id,
                    "isLate": submission.is_late,
                    "score": score,
                    "passingPercent": passing_percent,
                    "passed": fully_graded && score.percentage >= passing_percent,
                })
            }
            None => json!({
                "assessmentId": assessment.id,
                "title": assessment.title,
                "type": assessment.kind,
                "moduleId": assessment.module_id,
                "dueDate": assessment.due_date,
                "displayStatus": "not-attempted",
                "submissionId": null,
                "isLate": false,
                "score": null,
                "passingPercent": passing_percent,
                "passed": false,
            }),
        };
        rows.push(row);
    }

    let average_percent = if attempted > 0 {
        calc::round_off_1_decimal(sum / attempted as f64)
    } else {
        0.0
    };
    Ok(json!({
        "studentId": student_id,
        "averagePercent": average_percent,
        "attemptedCount": attempted,
        "totalAssessments": snapshot.assessments.len(),
        "assessments": rows,
    }))
}
