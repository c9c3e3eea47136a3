use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Quiz,
    Exam,
    Assignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Essay,
}

impl QuestionKind {
    /// Whether correctness can be decided from the answer key alone,
    /// without a human-assigned mark.
    pub fn is_auto_graded(self) -> bool {
        matches!(self, QuestionKind::MultipleChoice | QuestionKind::TrueFalse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionStatus {
    InProgress,
    Submitted,
    Graded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    pub id: String,
    pub option_text: String,
    /// Only present for auto-graded question types; the learner-facing API
    /// omits it entirely.
    #[serde(default)]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub question_type: QuestionKind,
    pub points: f64,
    #[serde(default)]
    pub options: Vec<AnswerOption>,
    #[serde(default)]
    pub answer_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: AssessmentKind,
    pub max_score: f64,
    pub passing_score: f64,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    pub module_id: String,
    pub is_published: bool,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    #[serde(default)]
    pub selected_option_id: Option<String>,
    #[serde(default)]
    pub text_response: Option<String>,
    /// Null until graded; a stored value wins over auto-grading.
    #[serde(default)]
    pub points_awarded: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub student_id: String,
    pub assessment_id: String,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub submit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_late: bool,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
    pub id: String,
    pub title: String,
}

/// One sub-request of a snapshot fetch that failed while the rest of the
/// snapshot still materialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchFailure {
    pub resource: String,
    pub error: String,
}

/// Page-scoped copy of everything a progress/grades/attendance view needs.
/// Never mutated in place except when a grading round-trip folds the
/// server's updated submission back in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSnapshot {
    pub course_id: String,
    pub fetched_at: DateTime<Utc>,
    pub students: Vec<Student>,
    pub modules: Vec<CourseModule>,
    pub assessments: Vec<Assessment>,
    pub submissions: Vec<Submission>,
    pub attendance: Vec<AttendanceRecord>,
    #[serde(default)]
    pub failures: Vec<FetchFailure>,
}

impl CourseSnapshot {
    pub fn assessment(&self, assessment_id: &str) -> Option<&Assessment> {
        self.assessments.iter().find(|a| a.id == assessment_id)
    }

    pub fn submission(&self, submission_id: &str) -> Option<&Submission> {
        self.submissions.iter().find(|s| s.id == submission_id)
    }

    pub fn replace_submission(&mut self, updated: Submission) {
        match self.submissions.iter_mut().find(|s| s.id == updated.id) {
            Some(slot) => *slot = updated,
            None => self.submissions.push(updated),
        }
    }
}
