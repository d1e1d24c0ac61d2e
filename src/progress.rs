use crate::calc::{aggregate, round_off_1_decimal, CalcError, Statistics};
use crate::model::{ExamRecord, Student};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const DEFAULT_TOP_COUNT: usize = 10;
const SUBJECT_TOP_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectChange {
    pub subject: String,
    pub change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub total_score_change: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_change: Option<i64>,
    pub improved_subjects: Vec<SubjectChange>,
    pub declined_subjects: Vec<SubjectChange>,
    pub suggestions: Vec<String>,
}

/// Change of one student between two exams. Subjects are matched by name and
/// only compared where both results are present. A positive `rankChange`
/// means the student moved up.
pub fn compare_progress(current: &Student, previous: &Student) -> ProgressReport {
    let total_score_change = round_off_1_decimal(current.total_score - previous.total_score);
    let rank_change = match (current.rank, previous.rank) {
        (Some(now), Some(before)) => Some(i64::from(before) - i64::from(now)),
        _ => None,
    };

    let mut improved_subjects = Vec::new();
    let mut declined_subjects = Vec::new();
    for score in &current.scores {
        let Some(now) = score.score.value() else {
            continue;
        };
        let before = previous
            .scores
            .iter()
            .find(|p| p.subject == score.subject)
            .and_then(|p| p.score.value());
        let Some(before) = before else {
            continue;
        };
        let change = round_off_1_decimal(now - before);
        let entry = SubjectChange {
            subject: score.subject.clone(),
            change,
        };
        match change.partial_cmp(&0.0) {
            Some(Ordering::Greater) => improved_subjects.push(entry),
            Some(Ordering::Less) => declined_subjects.push(entry),
            _ => {}
        }
    }

    let mut suggestions = Vec::new();
    if total_score_change > 0.0 {
        suggestions.push(format!(
            "Total score rose by {:.1} points. Keep it up!",
            total_score_change
        ));
    } else if total_score_change < 0.0 {
        suggestions.push(format!(
            "Total score fell by {:.1} points. Look into the causes and adjust study methods promptly.",
            total_score_change.abs()
        ));
    }
    match rank_change {
        Some(up) if up > 0 => suggestions.push(format!(
            "Moved up {} places in the ranking. Clear progress!",
            up
        )),
        Some(down) if down < 0 => suggestions.push(format!(
            "Dropped {} places in the ranking. More effort is needed.",
            down.abs()
        )),
        _ => {}
    }

    ProgressReport {
        total_score_change,
        rank_change,
        improved_subjects,
        declined_subjects,
        suggestions,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    pub from: f64,
    pub to: f64,
    pub diff: f64,
    pub trend: Trend,
}

impl Delta {
    fn between(from: f64, to: f64) -> Self {
        let diff = round_off_1_decimal(to - from);
        let trend = if diff > 0.0 {
            Trend::Up
        } else if diff < 0.0 {
            Trend::Down
        } else {
            Trend::Flat
        };
        Self {
            from,
            to,
            diff,
            trend,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopEntry {
    pub student_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSide {
    pub exam_id: String,
    pub name: String,
    pub statistics: Statistics,
    pub top_students: Vec<TopEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectComparison {
    pub subject: String,
    pub from_avg: f64,
    pub to_avg: Option<f64>,
    pub from_top: Vec<TopEntry>,
    pub to_top: Vec<TopEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamComparison {
    pub from: ExamSide,
    pub to: ExamSide,
    pub avg_score: Delta,
    pub pass_rate: Delta,
    pub excellent_rate: Delta,
    pub subjects: Vec<SubjectComparison>,
}

fn top_by<F>(students: &[Student], count: usize, value: F) -> Vec<TopEntry>
where
    F: Fn(&Student) -> Option<f64>,
{
    let mut rows: Vec<(&Student, f64)> = students
        .iter()
        .filter(|s| s.is_attended())
        .filter_map(|s| value(s).map(|v| (s, v)))
        .collect();
    rows.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    rows.into_iter()
        .take(count)
        .map(|(s, score)| TopEntry {
            student_id: s.id.clone(),
            name: s.name.clone(),
            class_name: s.class_name.clone(),
            score,
        })
        .collect()
}

fn subject_top(exam: &ExamRecord, subject: &str) -> Vec<TopEntry> {
    let Some(idx) = exam.config.subject_index(subject) else {
        return Vec::new();
    };
    top_by(&exam.students, SUBJECT_TOP_COUNT, |s| s.score_at(idx).value())
}

/// Side-by-side view of two exams: headline deltas (`to - from`), per-subject
/// averages for the subjects of `from`, and leaderboards.
pub fn compare_exams(
    from: &ExamRecord,
    to: &ExamRecord,
    top_count: usize,
) -> Result<ExamComparison, CalcError> {
    let from_stats = aggregate(&from.students, &from.config)?;
    let to_stats = aggregate(&to.students, &to.config)?;

    let subjects = from_stats
        .subject_stats
        .iter()
        .map(|row| SubjectComparison {
            subject: row.subject.clone(),
            from_avg: row.avg_score,
            to_avg: to_stats
                .subject_stats
                .iter()
                .find(|other| other.subject == row.subject)
                .map(|other| other.avg_score),
            from_top: subject_top(from, &row.subject),
            to_top: subject_top(to, &row.subject),
        })
        .collect();

    Ok(ExamComparison {
        avg_score: Delta::between(from_stats.avg_score, to_stats.avg_score),
        pass_rate: Delta::between(from_stats.pass_rate, to_stats.pass_rate),
        excellent_rate: Delta::between(from_stats.excellent_rate, to_stats.excellent_rate),
        subjects,
        from: ExamSide {
            exam_id: from.id.clone(),
            name: from.name.clone(),
            top_students: top_by(&from.students, top_count, |s| Some(s.total_score)),
            statistics: from_stats,
        },
        to: ExamSide {
            exam_id: to.id.clone(),
            name: to.name.clone(),
            top_students: top_by(&to.students, top_count, |s| Some(s.total_score)),
            statistics: to_stats,
        },
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub exam_id: String,
    pub exam_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<chrono::NaiveDate>,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTrend {
    pub student_name: String,
    pub total_score_trend: Vec<TrendPoint>,
    pub rank_trend: Vec<TrendPoint>,
    pub subject_trends: BTreeMap<String, Vec<TrendPoint>>,
}

/// Follows a student (by name) across exams in date order. Undated exams come
/// last, in the order they were given.
pub fn student_trend(exams: &[ExamRecord], student_name: &str) -> StudentTrend {
    let mut ordered: Vec<&ExamRecord> = exams.iter().collect();
    ordered.sort_by(|a, b| match (a.date, b.date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let mut trend = StudentTrend {
        student_name: student_name.to_string(),
        total_score_trend: Vec::new(),
        rank_trend: Vec::new(),
        subject_trends: BTreeMap::new(),
    };

    for exam in ordered {
        let Some(student) = exam.students.iter().find(|s| s.name == student_name) else {
            continue;
        };
        let point = |score: f64, rank: Option<u32>| TrendPoint {
            exam_id: exam.id.clone(),
            exam_name: exam.name.clone(),
            date: exam.date,
            score,
            rank,
        };

        trend
            .total_score_trend
            .push(point(student.total_score, student.rank));
        if student.rank.is_some() {
            trend
                .rank_trend
                .push(point(student.total_score, student.rank));
        }
        for score in &student.scores {
            if let Some(v) = score.score.value() {
                trend
                    .subject_trends
                    .entry(score.subject.clone())
                    .or_default()
                    .push(point(v, score.rank));
            }
        }
    }
    trend
}
