use crate::calc::CalcError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;

const TOTAL_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub name: String,
    pub full_score: f64,
}

impl Subject {
    #[cfg(test)]
    pub fn new(name: impl Into<String>, full_score: f64) -> Self {
        Self {
            name: name.into(),
            full_score,
        }
    }
}

/// A single subject result. `Absent` is never treated as a zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum ScoreValue {
    Absent,
    Scored(f64),
}

impl ScoreValue {
    pub fn value(self) -> Option<f64> {
        match self {
            ScoreValue::Absent => None,
            ScoreValue::Scored(v) => Some(v),
        }
    }

    pub fn is_absent(self) -> bool {
        matches!(self, ScoreValue::Absent)
    }
}

impl From<Option<f64>> for ScoreValue {
    fn from(v: Option<f64>) -> Self {
        v.map(ScoreValue::Scored).unwrap_or(ScoreValue::Absent)
    }
}

impl From<ScoreValue> for Option<f64> {
    fn from(v: ScoreValue) -> Self {
        v.value()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub subject: String,
    pub score: ScoreValue,
    pub full_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_rank: Option<u32>,
}

impl Score {
    pub fn new(subject: &Subject, score: ScoreValue) -> Self {
        Self {
            subject: subject.name.clone(),
            score,
            full_score: subject.full_score,
            rank: None,
            grade_rank: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Normal,
    Absent,
    #[serde(alias = "cheating")]
    Flagged,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Normal => "normal",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Flagged => "flagged",
        }
    }
}

/// Class grouping key. Students without a class label share one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "Option<String>")]
pub enum ClassLabel {
    Named(String),
    Unclassified,
}

impl From<ClassLabel> for Option<String> {
    fn from(v: ClassLabel) -> Self {
        match v {
            ClassLabel::Named(name) => Some(name),
            ClassLabel::Unclassified => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub scores: Vec<Score>,
    pub total_score: f64,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_rank: Option<u32>,
}

impl Student {
    /// Builds a student, deriving the total and the absent status from `scores`.
    pub fn new(id: impl Into<String>, name: impl Into<String>, scores: Vec<Score>) -> Self {
        let total_score = sum_present(&scores);
        let status = derive_status(&scores, AttendanceStatus::Normal);
        Self {
            id: id.into(),
            name: name.into(),
            class_name: None,
            scores,
            total_score,
            status,
            rank: None,
            grade_rank: None,
        }
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// Marks the record as flagged. A fully absent student stays absent.
    #[cfg(test)]
    pub fn flagged(mut self) -> Self {
        self.status = derive_status(&self.scores, AttendanceStatus::Flagged);
        self
    }

    pub fn is_attended(&self) -> bool {
        self.status != AttendanceStatus::Absent
    }

    pub fn class_label(&self) -> ClassLabel {
        match self.class_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => ClassLabel::Named(name.to_string()),
            _ => ClassLabel::Unclassified,
        }
    }

    pub fn score_at(&self, idx: usize) -> ScoreValue {
        self.scores
            .get(idx)
            .map(|s| s.score)
            .unwrap_or(ScoreValue::Absent)
    }

    /// Replaces the scores and recomputes total and status.
    pub fn set_scores(&mut self, scores: Vec<Score>) {
        let requested = if self.status == AttendanceStatus::Flagged {
            AttendanceStatus::Flagged
        } else {
            AttendanceStatus::Normal
        };
        self.total_score = sum_present(&scores);
        self.status = derive_status(&scores, requested);
        self.scores = scores;
    }

    pub fn clear_ranks(&mut self) {
        self.rank = None;
        self.grade_rank = None;
        for s in &mut self.scores {
            s.rank = None;
            s.grade_rank = None;
        }
    }
}

pub fn sum_present(scores: &[Score]) -> f64 {
    scores.iter().filter_map(|s| s.score.value()).sum()
}

/// `Absent` only when every score is absent; otherwise `requested`.
pub fn derive_status(scores: &[Score], requested: AttendanceStatus) -> AttendanceStatus {
    if scores.iter().all(|s| s.score.is_absent()) {
        AttendanceStatus::Absent
    } else if requested == AttendanceStatus::Absent {
        AttendanceStatus::Normal
    } else {
        requested
    }
}

/// Ordered subject list plus pass/excellence lines as percentages of full score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamConfig {
    pub subjects: Vec<Subject>,
    pub pass_line: f64,
    pub excellent_line: f64,
}

impl ExamConfig {
    #[cfg(test)]
    pub fn new(subjects: Vec<Subject>, pass_line: f64, excellent_line: f64) -> Self {
        Self {
            subjects,
            pass_line,
            excellent_line,
        }
    }

    pub fn total_full_score(&self) -> f64 {
        self.subjects.iter().map(|s| s.full_score).sum()
    }

    pub fn total_pass_score(&self) -> f64 {
        self.total_full_score() * (self.pass_line / 100.0)
    }

    pub fn total_excellent_score(&self) -> f64 {
        self.total_full_score() * (self.excellent_line / 100.0)
    }

    pub fn pass_score_for(&self, full_score: f64) -> f64 {
        full_score * (self.pass_line / 100.0)
    }

    pub fn excellent_score_for(&self, full_score: f64) -> f64 {
        full_score * (self.excellent_line / 100.0)
    }

    pub fn subject_index(&self, name: &str) -> Option<usize> {
        self.subjects.iter().position(|s| s.name == name)
    }

    pub fn validate(&self) -> Result<(), CalcError> {
        for s in &self.subjects {
            if !s.full_score.is_finite() || s.full_score <= 0.0 {
                return Err(CalcError::new(
                    "bad_full_score",
                    format!("full score for {} must be a positive number", s.name),
                )
                .with_details(json!({ "subject": s.name, "fullScore": s.full_score })));
            }
        }
        let mut seen = HashSet::new();
        for s in &self.subjects {
            if !seen.insert(s.name.as_str()) {
                return Err(CalcError::new(
                    "subject_mismatch",
                    format!("subject {} is configured twice", s.name),
                ));
            }
        }
        for (label, line) in [("passLine", self.pass_line), ("excellentLine", self.excellent_line)] {
            if !line.is_finite() || !(0.0..=100.0).contains(&line) {
                return Err(CalcError::new(
                    "bad_line",
                    format!("{} must be a percentage between 0 and 100", label),
                )
                .with_details(json!({ "field": label, "value": line })));
            }
        }
        Ok(())
    }
}

/// Checks one student's scores against the configured subjects.
pub fn check_student(student: &Student, config: &ExamConfig) -> Result<(), CalcError> {
    if student.scores.len() != config.subjects.len() {
        return Err(CalcError::new(
            "subject_count_mismatch",
            format!(
                "student {} has {} scores but {} subjects are configured",
                student.id,
                student.scores.len(),
                config.subjects.len()
            ),
        )
        .with_details(json!({
            "studentId": student.id,
            "scoreCount": student.scores.len(),
            "subjectCount": config.subjects.len()
        })));
    }

    for (idx, (score, subject)) in student.scores.iter().zip(&config.subjects).enumerate() {
        if score.subject != subject.name || score.full_score != subject.full_score {
            return Err(CalcError::new(
                "subject_mismatch",
                format!(
                    "student {} score #{} is {} but config expects {}",
                    student.id, idx, score.subject, subject.name
                ),
            )
            .with_details(json!({ "studentId": student.id, "index": idx })));
        }
        if let ScoreValue::Scored(v) = score.score {
            if !v.is_finite() || v < 0.0 {
                return Err(CalcError::new(
                    "bad_score",
                    format!("student {} has an invalid {} score", student.id, subject.name),
                )
                .with_details(json!({ "studentId": student.id, "subject": subject.name })));
            }
        }
    }

    let expected_total = sum_present(&student.scores);
    if (expected_total - student.total_score).abs() > TOTAL_EPSILON {
        return Err(CalcError::new(
            "total_mismatch",
            format!(
                "student {} total {} does not match the score sum {}",
                student.id, student.total_score, expected_total
            ),
        ));
    }

    let all_absent = student.scores.iter().all(|s| s.score.is_absent());
    if all_absent != (student.status == AttendanceStatus::Absent) {
        return Err(CalcError::new(
            "status_mismatch",
            format!(
                "student {} is {} but {} of its scores are absent",
                student.id,
                student.status.as_str(),
                if all_absent { "all" } else { "not all" }
            ),
        ));
    }
    Ok(())
}

/// Validates a whole roster against `config`. Input problems are caller bugs
/// and are reported rather than repaired.
pub fn validate_roster(students: &[Student], config: &ExamConfig) -> Result<(), CalcError> {
    config.validate()?;
    check_unique_ids(students)?;
    for s in students {
        check_student(s, config)?;
    }
    Ok(())
}

pub fn check_unique_ids(students: &[Student]) -> Result<(), CalcError> {
    let mut seen = HashSet::new();
    for s in students {
        if !seen.insert(s.id.as_str()) {
            return Err(CalcError::new(
                "duplicate_student",
                format!("student id {} appears more than once", s.id),
            ));
        }
    }
    Ok(())
}

/// One imported exam held by the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRecord {
    pub id: String,
    pub name: String,
    pub date: Option<chrono::NaiveDate>,
    pub class_name: Option<String>,
    pub imported_at: String,
    pub grade_mode: bool,
    pub config: ExamConfig,
    pub students: Vec<Student>,
}
