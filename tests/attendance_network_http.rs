use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
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

fn gate(headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let ok = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "Bearer token-1")
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "token expired" })),
        ))
    }
}

async fn serve_mock_lms() -> SocketAddr {
    let app = Router::new()
        .route(
            "/attendance",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                gate(&headers)?;
                Ok::<_, (StatusCode, Json<Value>)>(Json(json!({
                    "success": true,
                    "record": {
                        "id": "r-new",
                        "studentId": body.get("studentId").cloned().unwrap_or(json!(null)),
                        "date": body.get("date").cloned().unwrap_or(json!(null)),
                        "status": body.get("status").cloned().unwrap_or(json!(null)),
                        "notes": body.get("notes").cloned().unwrap_or(json!(null)),
                    }
                })))
            }),
        )
        .route(
            "/attendance/:attendance_id",
            patch(
                |headers: HeaderMap,
                 Path(attendance_id): Path<String>,
                 Json(body): Json<Value>| async move {
                    gate(&headers)?;
                    Ok::<_, (StatusCode, Json<Value>)>(Json(json!({
                        "success": true,
                        "record": {
                            "id": attendance_id,
                            "studentId": "ada",
                            "date": "2025-03-03",
                            "status": body.get("status").cloned().unwrap_or(json!("present")),
                            "notes": body.get("notes").cloned().unwrap_or(json!(null)),
                        }
                    })))
                },
            ),
        )
        .route(
            "/attendance/course/:course_id/date/:date",
            get(|headers: HeaderMap, Path((_, date)): Path<(String, String)>| async move {
                gate(&headers)?;
                Ok::<_, (StatusCode, Json<Value>)>(Json(json!({
                    "success": true,
                    "records": [{
                        "id": "r1",
                        "studentId": "ada",
                        "date": date,
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

fn configure_and_load(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, addr: SocketAddr) {
    let configured = request(
        stdin,
        reader,
        "setup-1",
        "session.configure",
        json!({
            "baseUrl": format!("http://{addr}"),
            "accessToken": "token-1",
        }),
    );
    assert_eq!(configured.get("ok").and_then(|v| v.as_bool()), Some(true));

    let loaded = request(
        stdin,
        reader,
        "setup-2",
        "snapshot.load",
        json!({
            "courseId": "c1",
            "students": [{ "id": "ada", "name": "Ada", "email": "ada@example.edu" }],
            "modules": [],
            "assessments": [],
            "submissions": [],
            "attendance": [{
                "id": "r1",
                "studentId": "ada",
                "date": "2025-03-03",
                "status": "absent"
            }],
        }),
    );
    assert_eq!(loaded.get("ok").and_then(|v| v.as_bool()), Some(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recorded_attendance_lands_in_the_snapshot() {
    let addr = serve_mock_lms().await;
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    configure_and_load(&mut stdin, &mut reader, addr);

    let recorded = request(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.record",
        json!({
            "courseId": "c1",
            "studentId": "ada",
            "date": "2025-03-04",
            "status": "late",
            "notes": "bus strike",
        }),
    );
    assert_eq!(recorded.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        recorded.pointer("/result/record/id").and_then(|v| v.as_str()),
        Some("r-new")
    );
    assert_eq!(
        recorded
            .pointer("/result/record/status")
            .and_then(|v| v.as_str()),
        Some("late")
    );

    // The saved record joins the loaded register: 1 absent + 1 late = 50%.
    let summary = request(&mut stdin, &mut reader, "2", "attendance.summary", json!({}));
    assert_eq!(
        summary
            .pointer("/result/recordCount")
            .and_then(|v| v.as_u64()),
        Some(2)
    );
    assert_eq!(
        summary
            .pointer("/result/perStudent/ada/attendancePercent")
            .and_then(|v| v.as_f64()),
        Some(50.0)
    );

    drop(stdin);
    let _ = child.wait();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn updated_attendance_replaces_the_snapshot_record() {
    let addr = serve_mock_lms().await;
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    configure_and_load(&mut stdin, &mut reader, addr);

    // r1 was loaded as absent; the correction flips it to present.
    let updated = request(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.update",
        json!({
            "attendanceId": "r1",
            "patch": { "status": "present" },
        }),
    );
    assert_eq!(updated.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        updated
            .pointer("/result/record/status")
            .and_then(|v| v.as_str()),
        Some("present")
    );

    let summary = request(&mut stdin, &mut reader, "2", "attendance.summary", json!({}));
    assert_eq!(
        summary
            .pointer("/result/recordCount")
            .and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(
        summary
            .pointer("/result/perStudent/ada/attendancePercent")
            .and_then(|v| v.as_f64()),
        Some(100.0)
    );

    drop(stdin);
    let _ = child.wait();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn for_date_is_a_live_lookup() {
    let addr = serve_mock_lms().await;
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "session.configure",
        json!({
            "baseUrl": format!("http://{addr}"),
            "accessToken": "token-1",
        }),
    );

    // No snapshot needed: the date view always asks the backend.
    let result = request(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.forDate",
        json!({ "courseId": "c1", "date": "2025-03-03" }),
    );
    assert_eq!(result.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        result
            .pointer("/result/records/0/date")
            .and_then(|v| v.as_str()),
        Some("2025-03-03")
    );

    let bad = request(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.forDate",
        json!({ "courseId": "c1", "date": "yesterday" }),
    );
    assert_eq!(
        bad.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    drop(stdin);
    let _ = child.wait();
}
