use crate::model::{
    Assessment, AttendanceRecord, AttendanceStatus, CourseModule, Student, Submission,
};
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: token refresh failed or was rejected")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rejected by server: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::Rejected(_) => "api_rejected",
            ApiError::Transport(_) => "transport",
            ApiError::Decode(_) => "decode",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Thin typed client over the LMS REST backend. Every request carries the
/// bearer token; a 401 triggers one token refresh and one retry.
pub struct LmsClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Mutex<AuthTokens>,
}

// Wire envelopes. The backend answers duck-typed `{success, message?, ...}`
// objects; they are parsed into these tagged shapes at the boundary and
// converted to Result before anything downstream sees them.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssessmentListEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    assessments: Vec<Assessment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssessmentEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    assessment: Option<Assessment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    submission: Option<Submission>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionListEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    submissions: Vec<Submission>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentListEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    students: Vec<Student>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModuleListEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    modules: Vec<CourseModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceListEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    records: Vec<AttendanceRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    record: Option<AttendanceRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

fn rejected(message: Option<String>) -> ApiError {
    ApiError::Rejected(message.unwrap_or_else(|| "request unsuccessful".to_string()))
}

// Outbound payloads.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_response: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerGrade {
    pub question_id: String,
    pub points_awarded: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradePayload {
    pub answers: Vec<AnswerGrade>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttendance {
    pub course_id: String,
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendancePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AttendanceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl LmsClient {
    pub fn new(base_url: impl Into<String>, tokens: AuthTokens) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: Mutex::new(tokens),
        }
    }

    fn access_token(&self) -> String {
        self.tokens.lock().expect("token lock").access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens.lock().expect("token lock").refresh_token.clone()
    }

    fn store_tokens(&self, access: String, refresh: Option<String>) {
        let mut guard = self.tokens.lock().expect("token lock");
        guard.access_token = access;
        if refresh.is_some() {
            guard.refresh_token = refresh;
        }
    }

    async fn refresh_access_token(&self) -> Result<(), ApiError> {
        let Some(refresh) = self.refresh_token() else {
            return Err(ApiError::Unauthorized);
        };
        let url = format!("{}/auth/refresh", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "refreshToken": refresh }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::Unauthorized);
        }
        let body: RefreshEnvelope = decode_body(resp).await?;
        match (body.success, body.access_token) {
            (true, Some(access)) => {
                self.store_tokens(access, body.refresh_token);
                Ok(())
            }
            _ => {
                tracing::warn!(message = ?body.message, "token refresh rejected");
                Err(ApiError::Unauthorized)
            }
        }
    }

    /// Sends the request with the current bearer token, refreshing and
    /// retrying exactly once on 401.
    async fn send<F>(&self, build: F) -> Result<reqwest::Response, ApiError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let resp = build(&self.http)
            .bearer_auth(self.access_token())
            .send()
            .await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        tracing::debug!("got 401, refreshing access token");
        self.refresh_access_token().await?;
        let resp = build(&self.http)
            .bearer_auth(self.access_token())
            .send()
            .await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.send(|c| c.get(&url)).await?;
        check_status(path, &resp)?;
        decode_body(resp).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.send(|c| c.post(&url).json(body)).await?;
        check_status(path, &resp)?;
        decode_body(resp).await
    }

    async fn patch_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.send(|c| c.patch(&url).json(body)).await?;
        check_status(path, &resp)?;
        decode_body(resp).await
    }

    pub async fn list_course_assessments(
        &self,
        course_id: &str,
        include_questions: bool,
    ) -> Result<Vec<Assessment>, ApiError> {
        let body: AssessmentListEnvelope = self
            .get_json(&format!(
                "/assessments/course/{course_id}?includeQuestions={include_questions}"
            ))
            .await?;
        if !body.success {
            return Err(rejected(body.message));
        }
        Ok(body.assessments)
    }

    pub async fn get_assessment(
        &self,
        assessment_id: &str,
        include_questions: bool,
        teacher_view: bool,
    ) -> Result<Assessment, ApiError> {
        let body: AssessmentEnvelope = self
            .get_json(&format!(
                "/assessments/{assessment_id}?includeQuestions={include_questions}&teacherView={teacher_view}"
            ))
            .await?;
        match (body.success, body.assessment) {
            (true, Some(assessment)) => Ok(assessment),
            (true, None) => Err(ApiError::Decode("missing assessment field".to_string())),
            (false, _) => Err(rejected(body.message)),
        }
    }

    pub async fn list_course_students(&self, course_id: &str) -> Result<Vec<Student>, ApiError> {
        let body: StudentListEnvelope = self
            .get_json(&format!("/courses/{course_id}/students"))
            .await?;
        if !body.success {
            return Err(rejected(body.message));
        }
        Ok(body.students)
    }

    pub async fn list_course_modules(
        &self,
        course_id: &str,
    ) -> Result<Vec<CourseModule>, ApiError> {
        let body: ModuleListEnvelope = self
            .get_json(&format!("/modules/course/{course_id}"))
            .await?;
        if !body.success {
            return Err(rejected(body.message));
        }
        Ok(body.modules)
    }

    pub async fn list_assessment_submissions(
        &self,
        assessment_id: &str,
        include_answers: bool,
    ) -> Result<Vec<Submission>, ApiError> {
        let body: SubmissionListEnvelope = self
            .get_json(&format!(
                "/assessments/{assessment_id}/submissions?includeAnswers={include_answers}"
            ))
            .await?;
        if !body.success {
            return Err(rejected(body.message));
        }
        Ok(body.submissions)
    }

    pub async fn get_my_submission(
        &self,
        assessment_id: &str,
        include_answers: bool,
    ) -> Result<Option<Submission>, ApiError> {
        let body: SubmissionEnvelope = self
            .get_json(&format!(
                "/assessments/{assessment_id}/my-submission?includeAnswers={include_answers}"
            ))
            .await?;
        if !body.success {
            return Err(rejected(body.message));
        }
        Ok(body.submission)
    }

    pub async fn start_attempt(&self, assessment_id: &str) -> Result<Submission, ApiError> {
        let body: SubmissionEnvelope = self
            .post_json(
                &format!("/assessments/{assessment_id}/submissions"),
                &serde_json::json!({}),
            )
            .await?;
        match (body.success, body.submission) {
            (true, Some(submission)) => Ok(submission),
            (true, None) => Err(ApiError::Decode("missing submission field".to_string())),
            (false, _) => Err(rejected(body.message)),
        }
    }

    pub async fn save_answer(
        &self,
        submission_id: &str,
        question_id: &str,
        answer: &AnswerPayload,
    ) -> Result<(), ApiError> {
        let body: StatusEnvelope = self
            .post_json(
                &format!("/assessments/submissions/{submission_id}/questions/{question_id}/answers"),
                answer,
            )
            .await?;
        if !body.success {
            return Err(rejected(body.message));
        }
        Ok(())
    }

    pub async fn submit_attempt(&self, submission_id: &str) -> Result<Submission, ApiError> {
        let body: SubmissionEnvelope = self
            .post_json(
                &format!("/assessments/submissions/{submission_id}/submit"),
                &serde_json::json!({}),
            )
            .await?;
        match (body.success, body.submission) {
            (true, Some(submission)) => Ok(submission),
            (true, None) => Err(ApiError::Decode("missing submission field".to_string())),
            (false, _) => Err(rejected(body.message)),
        }
    }

    pub async fn grade_submission(
        &self,
        submission_id: &str,
        grade: &GradePayload,
    ) -> Result<Submission, ApiError> {
        let body: SubmissionEnvelope = self
            .post_json(
                &format!("/assessments/submissions/{submission_id}/grade"),
                grade,
            )
            .await?;
        match (body.success, body.submission) {
            (true, Some(submission)) => Ok(submission),
            (true, None) => Err(ApiError::Decode("missing submission field".to_string())),
            (false, _) => Err(rejected(body.message)),
        }
    }

    pub async fn list_course_attendance(
        &self,
        course_id: &str,
    ) -> Result<Vec<AttendanceRecord>, ApiError> {
        let body: AttendanceListEnvelope = self
            .get_json(&format!("/attendance/course/{course_id}"))
            .await?;
        if !body.success {
            return Err(rejected(body.message));
        }
        Ok(body.records)
    }

    pub async fn list_attendance_for_date(
        &self,
        course_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, ApiError> {
        let body: AttendanceListEnvelope = self
            .get_json(&format!("/attendance/course/{course_id}/date/{date}"))
            .await?;
        if !body.success {
            return Err(rejected(body.message));
        }
        Ok(body.records)
    }

    pub async fn record_attendance(
        &self,
        record: &NewAttendance,
    ) -> Result<AttendanceRecord, ApiError> {
        let body: AttendanceEnvelope = self.post_json("/attendance", record).await?;
        match (body.success, body.record) {
            (true, Some(record)) => Ok(record),
            (true, None) => Err(ApiError::Decode("missing record field".to_string())),
            (false, _) => Err(rejected(body.message)),
        }
    }

    pub async fn update_attendance(
        &self,
        attendance_id: &str,
        patch: &AttendancePatch,
    ) -> Result<AttendanceRecord, ApiError> {
        let body: AttendanceEnvelope = self
            .patch_json(&format!("/attendance/{attendance_id}"), patch)
            .await?;
        match (body.success, body.record) {
            (true, Some(record)) => Ok(record),
            (true, None) => Err(ApiError::Decode("missing record field".to_string())),
            (false, _) => Err(rejected(body.message)),
        }
    }
}

fn check_status(path: &str, resp: &reqwest::Response) -> Result<(), ApiError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(path.to_string()));
    }
    if !status.is_success() {
        return Err(ApiError::Rejected(format!("{path}: HTTP {status}")));
    }
    Ok(())
}

async fn decode_body<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}
