use crate::api::{ApiError, LmsClient};
use crate::model::{AttendanceRecord, CourseSnapshot, FetchFailure, Submission};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const DEFAULT_CONCURRENCY: usize = 4;

enum BatchItem {
    Submissions(Vec<Submission>),
    Attendance(Vec<AttendanceRecord>),
}

/// Assembles a page-scoped course snapshot.
///
/// Roster, modules, and assessments are prerequisites: any failure there
/// fails the whole fetch, and the caller's retry is a full re-fetch. The
/// per-assessment submission lists and the attendance log are fetched as a
/// bounded-concurrency batch with per-item isolation: a failed sub-request
/// becomes a `FetchFailure` entry and the rest of the snapshot still lands.
pub async fn fetch_course_snapshot(
    client: Arc<LmsClient>,
    course_id: &str,
    concurrency: usize,
) -> Result<CourseSnapshot, ApiError> {
    let students = client.list_course_students(course_id).await?;
    let modules = client.list_course_modules(course_id).await?;
    let assessments = client.list_course_assessments(course_id, true).await?;
    tracing::info!(
        course_id,
        students = students.len(),
        assessments = assessments.len(),
        "snapshot prerequisites fetched"
    );

    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut futs = FuturesUnordered::new();

    for assessment in &assessments {
        let client = Arc::clone(&client);
        let sem = Arc::clone(&sem);
        let assessment_id = assessment.id.clone();
        futs.push(tokio::spawn(async move {
            let _permit = sem.acquire().await.expect("semaphore closed");
            let resource = format!("submissions:{assessment_id}");
            let result = client
                .list_assessment_submissions(&assessment_id, true)
                .await
                .map(BatchItem::Submissions);
            (resource, result)
        }));
    }
    {
        let client = Arc::clone(&client);
        let sem = Arc::clone(&sem);
        let course_id = course_id.to_string();
        futs.push(tokio::spawn(async move {
            let _permit = sem.acquire().await.expect("semaphore closed");
            let result = client
                .list_course_attendance(&course_id)
                .await
                .map(BatchItem::Attendance);
            ("attendance".to_string(), result)
        }));
    }

    let mut submissions: Vec<Submission> = Vec::new();
    let mut attendance: Vec<AttendanceRecord> = Vec::new();
    let mut failures: Vec<FetchFailure> = Vec::new();
    while let Some(joined) = futs.next().await {
        match joined {
            Ok((_, Ok(BatchItem::Submissions(mut batch)))) => submissions.append(&mut batch),
            Ok((_, Ok(BatchItem::Attendance(records)))) => attendance = records,
            Ok((resource, Err(e))) => {
                tracing::warn!(resource = %resource, error = %e, "snapshot sub-request failed");
                failures.push(FetchFailure {
                    resource,
                    error: e.to_string(),
                });
            }
            Err(join_err) => {
                failures.push(FetchFailure {
                    resource: "task".to_string(),
                    error: join_err.to_string(),
                });
            }
        }
    }
    failures.sort_by(|a, b| a.resource.cmp(&b.resource));

    Ok(CourseSnapshot {
        course_id: course_id.to_string(),
        fetched_at: Utc::now(),
        students,
        modules,
        assessments,
        submissions,
        attendance,
        failures,
    })
}
