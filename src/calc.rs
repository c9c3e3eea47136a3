use crate::model::{
    Assessment, AttendanceRecord, AttendanceStatus, CourseModule, Question, Student, Submission,
    SubmissionStatus,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

/// 1-decimal display rounding used across grade views:
/// `Int(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub awarded: f64,
    pub possible: f64,
    pub percentage: f64,
}

impl ScoreBreakdown {
    pub const ZERO: ScoreBreakdown = ScoreBreakdown {
        awarded: 0.0,
        possible: 0.0,
        percentage: 0.0,
    };
}

/// Points awarded/possible for one submission against its assessment's
/// questions. `possible` counts only the questions the submission actually
/// answered; an answer referencing an unknown question contributes 0/0.
///
/// Auto-graded questions award full points on a correct option match, but a
/// stored `points_awarded` always wins (manual override after auto-grading).
/// Manual question types use `points_awarded` or 0 while ungraded, so a
/// partially graded submission still yields a partial score.
pub fn calculate_score(submission: &Submission, questions: &[Question]) -> ScoreBreakdown {
    let by_id: HashMap<&str, &Question> = questions.iter().map(|q| (q.id.as_str(), q)).collect();

    let mut awarded = 0.0_f64;
    let mut possible = 0.0_f64;

    for answer in &submission.answers {
        let Some(question) = by_id.get(answer.question_id.as_str()) else {
            continue;
        };
        possible += question.points;

        if let Some(points) = answer.points_awarded {
            awarded += points;
            continue;
        }
        if question.question_type.is_auto_graded() {
            let correct = question
                .options
                .iter()
                .find(|o| o.is_correct == Some(true));
            if let (Some(correct), Some(selected)) = (correct, answer.selected_option_id.as_deref())
            {
                if correct.id == selected {
                    awarded += question.points;
                }
            }
        }
        // Manual types stay at 0 until graded.
    }

    let percentage = if possible > 0.0 {
        round_off_1_decimal(100.0 * awarded / possible)
    } else {
        0.0
    };
    ScoreBreakdown {
        awarded,
        possible,
        percentage,
    }
}

/// True iff every answer carries an assigned mark. A submission with no
/// recorded answers is never considered fully graded.
pub fn is_fully_graded(submission: &Submission) -> bool {
    !submission.answers.is_empty()
        && submission
            .answers
            .iter()
            .all(|a| a.points_awarded.is_some())
}

/// Picks the representative attempt for a (student, assessment) pair.
///
/// Policy, first match wins:
/// 1. with `prefer_late` set, or when every matching attempt is late, the
///    best late attempt;
/// 2. among on-time attempts, fully graded ones beat ungraded ones, best
///    percentage within the tier;
/// 3. best percentage among whatever is left.
/// Percentage ties go to the most recent `submit_time`.
pub fn select_best_submission<'a>(
    student_id: &str,
    assessment_id: &str,
    all_submissions: &'a [Submission],
    questions: &[Question],
    prefer_late: bool,
) -> Option<&'a Submission> {
    let matching: Vec<&Submission> = all_submissions
        .iter()
        .filter(|s| s.student_id == student_id && s.assessment_id == assessment_id)
        .collect();
    if matching.is_empty() {
        return None;
    }

    let (late, on_time): (Vec<&Submission>, Vec<&Submission>) =
        matching.iter().copied().partition(|s| s.is_late);
    let all_late = on_time.is_empty();

    if (prefer_late || all_late) && !late.is_empty() {
        return best_by_percentage(&late, questions);
    }

    if !on_time.is_empty() {
        let graded: Vec<&Submission> = on_time
            .iter()
            .copied()
            .filter(|s| is_fully_graded(s))
            .collect();
        if !graded.is_empty() {
            return best_by_percentage(&graded, questions);
        }
        return best_by_percentage(&on_time, questions);
    }

    best_by_percentage(&matching, questions)
}

fn best_by_percentage<'a>(
    candidates: &[&'a Submission],
    questions: &[Question],
) -> Option<&'a Submission> {
    candidates
        .iter()
        .copied()
        .map(|s| (calculate_score(s, questions).percentage, s))
        .max_by(|(pa, a), (pb, b)| {
            pa.partial_cmp(pb)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.submit_time.cmp(&b.submit_time))
        })
        .map(|(_, s)| s)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAttendanceSummary {
    pub present_count: usize,
    pub late_count: usize,
    pub absent_count: usize,
    /// (present + late) over all recorded days; 0 with no records.
    pub attendance_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStatistics {
    pub student_id: String,
    pub display_name: String,
    /// Mean best-attempt percentage over attempted assessments only.
    pub average_percent: f64,
    pub attempted_count: usize,
    pub completed_count: usize,
    pub completion_percent: f64,
    /// Distinct assessments with at least one attempt, over all
    /// assessments. A participation proxy, independent of the manual
    /// attendance register.
    pub participation_percent: f64,
    pub manual_attendance: ManualAttendanceSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatistics {
    pub module_id: String,
    pub title: String,
    pub assessment_count: usize,
    /// Mean best-attempt percentage over every (student, assessment) pair
    /// in the module that has at least one attempt.
    pub average_percent: f64,
    pub pass_count: usize,
    pub fail_count: usize,
    pub pass_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStatistics {
    pub total_assessments: usize,
    /// Mean of per-student averages over students with any attempt.
    pub average_percent: f64,
    pub per_student: BTreeMap<String, StudentStatistics>,
    pub per_module: BTreeMap<String, ModuleStatistics>,
}

/// Each assessment passes or fails against its own passing ratio, never a
/// fixed threshold.
fn passing_threshold_percent(assessment: &Assessment) -> f64 {
    if assessment.max_score > 0.0 {
        100.0 * assessment.passing_score / assessment.max_score
    } else {
        0.0
    }
}

fn percent_of(part: usize, whole: usize) -> f64 {
    if whole > 0 {
        round_off_1_decimal(100.0 * part as f64 / whole as f64)
    } else {
        0.0
    }
}

/// Folds best-attempt results across the whole roster into per-student and
/// per-module statistics. Pure over the snapshot collections; unknown
/// module/assessment references drop out of the aggregates instead of
/// erroring.
pub fn build_statistics(
    students: &[Student],
    modules: &[CourseModule],
    assessments: &[Assessment],
    submissions: &[Submission],
    attendance: &[AttendanceRecord],
    prefer_late: &HashMap<String, bool>,
) -> CourseStatistics {
    let total_assessments = assessments.len();

    let mut attendance_by_student: HashMap<&str, ManualAttendanceSummary> = HashMap::new();
    for record in attendance {
        let entry = attendance_by_student
            .entry(record.student_id.as_str())
            .or_default();
        match record.status {
            AttendanceStatus::Present => entry.present_count += 1,
            AttendanceStatus::Late => entry.late_count += 1,
            AttendanceStatus::Absent => entry.absent_count += 1,
        }
    }
    for entry in attendance_by_student.values_mut() {
        let recorded = entry.present_count + entry.late_count + entry.absent_count;
        entry.attendance_percent = percent_of(entry.present_count + entry.late_count, recorded);
    }

    // (student, assessment) -> best-attempt percentage, shared between the
    // per-student and per-module folds.
    let mut best_percent: HashMap<(&str, &str), f64> = HashMap::new();
    let mut completed_pairs: HashSet<(&str, &str)> = HashSet::new();
    for student in students {
        for assessment in assessments {
            let prefer = prefer_late
                .get(assessment.id.as_str())
                .copied()
                .unwrap_or(false);
            let Some(best) = select_best_submission(
                &student.id,
                &assessment.id,
                submissions,
                &assessment.questions,
                prefer,
            ) else {
                continue;
            };
            let breakdown = calculate_score(best, &assessment.questions);
            best_percent.insert((student.id.as_str(), assessment.id.as_str()), breakdown.percentage);

            let finished = submissions.iter().any(|s| {
                s.student_id == student.id
                    && s.assessment_id == assessment.id
                    && s.status != SubmissionStatus::InProgress
            });
            if finished {
                completed_pairs.insert((student.id.as_str(), assessment.id.as_str()));
            }
        }
    }

    let mut per_student: BTreeMap<String, StudentStatistics> = BTreeMap::new();
    let mut course_sum = 0.0_f64;
    let mut course_count = 0_usize;
    for student in students {
        let mut sum = 0.0_f64;
        let mut attempted = 0_usize;
        let mut completed = 0_usize;
        for assessment in assessments {
            let key = (student.id.as_str(), assessment.id.as_str());
            if let Some(percent) = best_percent.get(&key) {
                sum += percent;
                attempted += 1;
            }
            if completed_pairs.contains(&key) {
                completed += 1;
            }
        }
        let average_percent = if attempted > 0 {
            round_off_1_decimal(sum / attempted as f64)
        } else {
            0.0
        };
        if attempted > 0 {
            course_sum += average_percent;
            course_count += 1;
        }
        per_student.insert(
            student.id.clone(),
            StudentStatistics {
                student_id: student.id.clone(),
                display_name: student.name.clone(),
                average_percent,
                attempted_count: attempted,
                completed_count: completed,
                completion_percent: percent_of(completed, total_assessments),
                participation_percent: percent_of(attempted, total_assessments),
                manual_attendance: attendance_by_student
                    .get(student.id.as_str())
                    .copied()
                    .unwrap_or_default(),
            },
        );
    }

    let mut per_module: BTreeMap<String, ModuleStatistics> = BTreeMap::new();
    for module in modules {
        let module_assessments: Vec<&Assessment> = assessments
            .iter()
            .filter(|a| a.module_id == module.id)
            .collect();

        let mut sum = 0.0_f64;
        let mut scored_pairs = 0_usize;
        let mut pass_count = 0_usize;
        let mut fail_count = 0_usize;
        for assessment in &module_assessments {
            let threshold = passing_threshold_percent(assessment);
            for student in students {
                let key = (student.id.as_str(), assessment.id.as_str());
                let Some(percent) = best_percent.get(&key) else {
                    continue;
                };
                sum += percent;
                scored_pairs += 1;
                if *percent >= threshold {
                    pass_count += 1;
                } else {
                    fail_count += 1;
                }
            }
        }

        let average_percent = if scored_pairs > 0 {
            round_off_1_decimal(sum / scored_pairs as f64)
        } else {
            0.0
        };
        per_module.insert(
            module.id.clone(),
            ModuleStatistics {
                module_id: module.id.clone(),
                title: module.title.clone(),
                assessment_count: module_assessments.len(),
                average_percent,
                pass_count,
                fail_count,
                pass_percent: percent_of(pass_count, pass_count + fail_count),
            },
        );
    }

    CourseStatistics {
        total_assessments,
        average_percent: if course_count > 0 {
            round_off_1_decimal(course_sum / course_count as f64)
        } else {
            0.0
        },
        per_student,
        per_module,
    }
}
