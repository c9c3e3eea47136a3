use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::SocketAddr;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_coursedeskd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn coursedeskd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn authed(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "Bearer fresh-token")
        .unwrap_or(false)
}

fn gate(headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    if authed(headers) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "token expired" })),
        ))
    }
}

/// Mock LMS backend: only accepts the refreshed access token, and the
/// submissions list for assessment `a2` always fails.
async fn serve_mock_lms() -> SocketAddr {
    let app = Router::new()
        .route(
            "/auth/refresh",
            post(|Json(body): Json<Value>| async move {
                if body.get("refreshToken").and_then(|v| v.as_str()) == Some("refresh-1") {
                    Json(json!({ "success": true, "accessToken": "fresh-token" }))
                } else {
                    Json(json!({ "success": false, "message": "bad refresh token" }))
                }
            }),
        )
        .route(
            "/courses/:course_id/students",
            get(|headers: HeaderMap| async move {
                gate(&headers)?;
                Ok::<_, (StatusCode, Json<Value>)>(Json(json!({
                    "success": true,
                    "students": [
                        { "id": "ada", "name": "Ada", "email": "ada@example.edu" },
                        { "id": "ben", "name": "Ben", "email": "ben@example.edu" }
                    ]
                })))
            }),
        )
        .route(
            "/modules/course/:course_id",
            get(|headers: HeaderMap| async move {
                gate(&headers)?;
                Ok::<_, (StatusCode, Json<Value>)>(Json(json!({
                    "success": true,
                    "modules": [{ "id": "m1", "title": "Module One" }]
                })))
            }),
        )
        .route(
            "/assessments/course/:course_id",
            get(|headers: HeaderMap| async move {
                gate(&headers)?;
                Ok::<_, (StatusCode, Json<Value>)>(Json(json!({
                    "success": true,
                    "assessments": [
                        {
                            "id": "a1",
                            "title": "Quiz One",
                            "type": "quiz",
                            "maxScore": 10.0,
                            "passingScore": 5.0,
                            "moduleId": "m1",
                            "isPublished": true,
                            "questions": [{
                                "id": "q1",
                                "questionType": "true_false",
                                "points": 10.0,
                                "options": [
                                    { "id": "t", "optionText": "true", "isCorrect": true },
                                    { "id": "f", "optionText": "false", "isCorrect": false }
                                ]
                            }]
                        },
                        {
                            "id": "a2",
                            "title": "Quiz Two",
                            "type": "quiz",
                            "maxScore": 10.0,
                            "passingScore": 5.0,
                            "moduleId": "m1",
                            "isPublished": true,
                            "questions": []
                        }
                    ]
                })))
            }),
        )
        .route(
            "/assessments/:assessment_id/submissions",
            get(
                |headers: HeaderMap, Path(assessment_id): Path<String>| async move {
                    gate(&headers)?;
                    if assessment_id == "a2" {
                        return Err((
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(json!({ "success": false, "message": "boom" })),
                        ));
                    }
                    Ok::<_, (StatusCode, Json<Value>)>(Json(json!({
                        "success": true,
                        "submissions": [{
                            "id": "s1",
                            "studentId": "ada",
                            "assessmentId": assessment_id,
                            "status": "submitted",
                            "submitTime": "2025-03-09T12:00:00Z",
                            "isLate": false,
                            "answers": [{ "questionId": "q1", "selectedOptionId": "t" }]
                        }]
                    })))
                },
            ),
        )
        .route(
            "/attendance/course/:course_id",
            get(|headers: HeaderMap| async move {
                gate(&headers)?;
                Ok::<_, (StatusCode, Json<Value>)>(Json(json!({
                    "success": true,
                    "records": [{
                        "id": "r1",
                        "studentId": "ada",
                        "date": "2025-03-03",
                        "status": "present"
                    }]
                })))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock lms");
    let addr = listener.local_addr().expect("mock lms addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock lms");
    });
    addr
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_refreshes_stale_token_and_isolates_failed_items() {
    let addr = serve_mock_lms().await;
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let configured = request(
        &mut stdin,
        &mut reader,
        "1",
        "session.configure",
        json!({
            "baseUrl": format!("http://{addr}"),
            "accessToken": "stale-token",
            "refreshToken": "refresh-1",
        }),
    );
    assert_eq!(configured.get("ok").and_then(|v| v.as_bool()), Some(true));

    let fetched = request(
        &mut stdin,
        &mut reader,
        "2",
        "snapshot.fetch",
        json!({ "courseId": "c1", "concurrency": 2 }),
    );
    assert_eq!(
        fetched.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "fetch failed: {fetched}"
    );
    assert_eq!(
        fetched.pointer("/result/studentCount").and_then(|v| v.as_u64()),
        Some(2)
    );
    assert_eq!(
        fetched
            .pointer("/result/assessmentCount")
            .and_then(|v| v.as_u64()),
        Some(2)
    );
    // a1's submissions landed even though a2's batch item failed.
    assert_eq!(
        fetched
            .pointer("/result/submissionCount")
            .and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(
        fetched
            .pointer("/result/attendanceCount")
            .and_then(|v| v.as_u64()),
        Some(1)
    );
    let failures = fetched
        .pointer("/result/failures")
        .and_then(|v| v.as_array())
        .expect("failures");
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].get("resource").and_then(|v| v.as_str()),
        Some("submissions:a2")
    );

    let status = request(&mut stdin, &mut reader, "3", "snapshot.status", json!({}));
    assert_eq!(
        status.pointer("/result/state").and_then(|v| v.as_str()),
        Some("ready")
    );

    // The fetched snapshot feeds the engine directly.
    let stats = request(&mut stdin, &mut reader, "4", "progress.statistics", json!({}));
    assert_eq!(
        stats
            .pointer("/result/statistics/perStudent/ada/attemptedCount")
            .and_then(|v| v.as_u64()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_prerequisite_marks_snapshot_failed() {
    // A backend that rejects everything, including the refresh.
    let app = Router::new().route(
        "/auth/refresh",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "message": "no" })),
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock lms");
    let addr = listener.local_addr().expect("mock lms addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock lms");
    });

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "session.configure",
        json!({
            "baseUrl": format!("http://{addr}"),
            "accessToken": "stale-token",
            "refreshToken": "refresh-1",
        }),
    );

    let fetched = request(
        &mut stdin,
        &mut reader,
        "2",
        "snapshot.fetch",
        json!({ "courseId": "c1" }),
    );
    assert_eq!(fetched.get("ok").and_then(|v| v.as_bool()), Some(false));

    let status = request(&mut stdin, &mut reader, "3", "snapshot.status", json!({}));
    assert_eq!(
        status.pointer("/result/state").and_then(|v| v.as_str()),
        Some("failed")
    );
    assert!(status
        .pointer("/result/error")
        .and_then(|v| v.as_str())
        .is_some());

    // Manual retry is a fresh snapshot.fetch; engine calls meanwhile
    // answer no_snapshot.
    let stats = request(&mut stdin, &mut reader, "4", "progress.statistics", json!({}));
    assert_eq!(
        stats
            .pointer("/error/code")
            .and_then(|v| v.as_str()),
        Some("no_snapshot")
    );

    drop(stdin);
    let _ = child.wait();
}
