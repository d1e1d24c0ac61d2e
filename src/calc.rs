use crate::model::{validate_roster, ClassLabel, ExamConfig, Student};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Half-up 1-decimal rounding used for every displayed rate, average and gap:
/// `floor(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// `100 * count / denom`, rounded; zero when there is nothing to divide by.
pub fn percent_of(count: usize, denom: usize) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    round_off_1_decimal(100.0 * (count as f64) / (denom as f64))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / (values.len() as f64)
}

fn extrema(values: &[f64]) -> (f64, f64) {
    let max = values
        .iter()
        .copied()
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .unwrap_or(0.0);
    let min = values
        .iter()
        .copied()
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .unwrap_or(0.0);
    (max, min)
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for CalcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CalcError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStat {
    pub subject: String,
    pub avg_score: f64,
    pub pass_rate: f64,
    pub excellent_rate: f64,
    pub fail_rate: f64,
    pub full_score_count: usize,
    pub max_score: f64,
    pub min_score: f64,
    pub pass_score: f64,
    pub excellent_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_students: usize,
    pub attended_students: usize,
    pub absent_students: usize,
    pub avg_score: f64,
    pub pass_rate: f64,
    pub excellent_rate: f64,
    pub fail_rate: f64,
    pub full_score_count: usize,
    pub max_score: f64,
    pub min_score: f64,
    pub subject_stats: Vec<SubjectStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatistics {
    pub class_name: ClassLabel,
    pub student_count: usize,
    #[serde(flatten)]
    pub statistics: Statistics,
}

/// Whole-exam statistics over attended students.
pub fn aggregate(students: &[Student], config: &ExamConfig) -> Result<Statistics, CalcError> {
    validate_roster(students, config)?;
    let refs: Vec<&Student> = students.iter().collect();
    let stats = summarize(&refs, config);
    tracing::debug!(
        total = stats.total_students,
        attended = stats.attended_students,
        "aggregated exam statistics"
    );
    Ok(stats)
}

/// Same aggregation per class, in order of first appearance.
pub fn class_statistics(
    students: &[Student],
    config: &ExamConfig,
) -> Result<Vec<ClassStatistics>, CalcError> {
    validate_roster(students, config)?;
    let mut groups: Vec<(ClassLabel, Vec<&Student>)> = Vec::new();
    for s in students {
        let label = s.class_label();
        match groups.iter_mut().find(|(l, _)| *l == label) {
            Some((_, members)) => members.push(s),
            None => groups.push((label, vec![s])),
        }
    }
    Ok(groups
        .into_iter()
        .map(|(class_name, members)| ClassStatistics {
            class_name,
            student_count: members.len(),
            statistics: summarize(&members, config),
        })
        .collect())
}

fn summarize(students: &[&Student], config: &ExamConfig) -> Statistics {
    let attended: Vec<&Student> = students.iter().copied().filter(|s| s.is_attended()).collect();
    let total_students = students.len();
    let attended_students = attended.len();
    let subject_stats = subject_rows(&attended, config);

    if attended.is_empty() {
        return Statistics {
            total_students,
            attended_students: 0,
            absent_students: total_students,
            avg_score: 0.0,
            pass_rate: 0.0,
            excellent_rate: 0.0,
            fail_rate: 0.0,
            full_score_count: 0,
            max_score: 0.0,
            min_score: 0.0,
            subject_stats,
        };
    }

    let totals: Vec<f64> = attended.iter().map(|s| s.total_score).collect();
    let pass_line = config.total_pass_score();
    let excellent_line = config.total_excellent_score();
    let full = config.total_full_score();

    let pass_count = totals.iter().filter(|t| **t >= pass_line).count();
    let excellent_count = totals.iter().filter(|t| **t >= excellent_line).count();
    let fail_count = totals.iter().filter(|t| **t < pass_line).count();
    let full_score_count = totals.iter().filter(|t| **t == full).count();
    let (max_score, min_score) = extrema(&totals);

    Statistics {
        total_students,
        attended_students,
        absent_students: total_students - attended_students,
        avg_score: round_off_1_decimal(mean(&totals)),
        pass_rate: percent_of(pass_count, attended_students),
        excellent_rate: percent_of(excellent_count, attended_students),
        fail_rate: percent_of(fail_count, attended_students),
        full_score_count,
        max_score,
        min_score,
        subject_stats,
    }
}

fn subject_rows(attended: &[&Student], config: &ExamConfig) -> Vec<SubjectStat> {
    config
        .subjects
        .iter()
        .enumerate()
        .map(|(idx, subject)| {
            let pass_score = config.pass_score_for(subject.full_score);
            let excellent_score = config.excellent_score_for(subject.full_score);
            let values: Vec<f64> = attended
                .iter()
                .filter_map(|s| s.score_at(idx).value())
                .collect();

            if values.is_empty() {
                return SubjectStat {
                    subject: subject.name.clone(),
                    avg_score: 0.0,
                    pass_rate: 0.0,
                    excellent_rate: 0.0,
                    fail_rate: 0.0,
                    full_score_count: 0,
                    max_score: 0.0,
                    min_score: 0.0,
                    pass_score,
                    excellent_score,
                };
            }

            let n = values.len();
            let (max_score, min_score) = extrema(&values);
            SubjectStat {
                subject: subject.name.clone(),
                avg_score: round_off_1_decimal(mean(&values)),
                pass_rate: percent_of(values.iter().filter(|v| **v >= pass_score).count(), n),
                excellent_rate: percent_of(
                    values.iter().filter(|v| **v >= excellent_score).count(),
                    n,
                ),
                fail_rate: percent_of(values.iter().filter(|v| **v < pass_score).count(), n),
                full_score_count: values.iter().filter(|v| **v == subject.full_score).count(),
                max_score,
                min_score,
                pass_score,
                excellent_score,
            }
        })
        .collect()
}

/// Score band `[min, max)`. Deserializes from a `[min, max]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)")]
pub struct ScoreBand {
    pub min: f64,
    pub max: f64,
}

impl From<(f64, f64)> for ScoreBand {
    fn from((min, max): (f64, f64)) -> Self {
        Self { min, max }
    }
}

pub fn default_bands() -> Vec<ScoreBand> {
    [(90.0, 100.0), (80.0, 90.0), (70.0, 80.0), (60.0, 70.0), (0.0, 60.0)]
        .into_iter()
        .map(ScoreBand::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBandCount {
    pub range: String,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub percentage: f64,
}

pub fn validate_bands(bands: &[ScoreBand]) -> Result<(), CalcError> {
    if bands.is_empty() {
        return Err(CalcError::new("bad_bands", "at least one score band is required"));
    }
    for b in bands {
        if !b.min.is_finite() || !b.max.is_finite() || b.min >= b.max {
            return Err(CalcError::new(
                "bad_bands",
                format!("band {}-{} must satisfy min < max", b.min, b.max),
            ));
        }
    }
    Ok(())
}

/// Counts attended totals per band. The band(s) ending at the highest
/// configured bound also include that bound.
pub fn score_distribution(
    students: &[Student],
    bands: &[ScoreBand],
) -> Result<Vec<ScoreBandCount>, CalcError> {
    validate_bands(bands)?;
    let totals: Vec<f64> = students
        .iter()
        .filter(|s| s.is_attended())
        .map(|s| s.total_score)
        .collect();
    let ceiling = bands.iter().map(|b| b.max).fold(f64::NEG_INFINITY, f64::max);

    Ok(bands
        .iter()
        .map(|b| {
            let count = totals
                .iter()
                .filter(|v| **v >= b.min && (**v < b.max || (b.max == ceiling && **v == b.max)))
                .count();
            ScoreBandCount {
                range: format!("{}-{}", b.min, b.max),
                min: b.min,
                max: b.max,
                count,
                percentage: percent_of(count, totals.len()),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{student, two_subject_config};
    use crate::model::{ExamConfig, Subject};

    fn single_subject_config() -> ExamConfig {
        ExamConfig::new(vec![Subject::new("Math", 100.0)], 60.0, 90.0)
    }

    #[test]
    fn round_off_is_half_up() {
        assert_eq!(round_off_1_decimal(0.0), 0.0);
        assert_eq!(round_off_1_decimal(3.54), 3.5);
        assert_eq!(round_off_1_decimal(3.55), 3.6);
        assert_eq!(round_off_1_decimal(66.66666), 66.7);
    }

    #[test]
    fn aggregate_excludes_fully_absent_students() {
        let cfg = two_subject_config();
        let students = vec![
            student(&cfg, "A", &[Some(95.0), Some(90.0)]),
            student(&cfg, "B", &[Some(70.0), Some(55.0)]),
            student(&cfg, "C", &[Some(50.0), Some(40.0)]),
            student(&cfg, "D", &[None, None]),
        ];
        let stats = aggregate(&students, &cfg).expect("aggregate");
        assert_eq!(stats.total_students, 4);
        assert_eq!(stats.attended_students, 3);
        assert_eq!(stats.absent_students, 1);
        // (185 + 125 + 90) / 3
        assert_eq!(stats.avg_score, 133.3);
        assert_eq!(stats.pass_rate, 66.7);
        assert_eq!(stats.excellent_rate, 33.3);
        assert_eq!(stats.fail_rate, 33.3);
        assert_eq!(stats.max_score, 185.0);
        assert_eq!(stats.min_score, 90.0);
        assert_eq!(stats.full_score_count, 0);
    }

    #[test]
    fn partially_absent_subject_is_left_out_of_subject_row() {
        let cfg = two_subject_config();
        let students = vec![
            student(&cfg, "A", &[Some(100.0), None]),
            student(&cfg, "B", &[Some(50.0), Some(80.0)]),
        ];
        let stats = aggregate(&students, &cfg).expect("aggregate");
        let english = &stats.subject_stats[1];
        assert_eq!(english.avg_score, 80.0);
        assert_eq!(english.max_score, 80.0);
        assert_eq!(english.min_score, 80.0);
        assert_eq!(english.pass_rate, 100.0);

        let math = &stats.subject_stats[0];
        assert_eq!(math.full_score_count, 1);
        assert_eq!(math.fail_rate, 50.0);
        assert_eq!(math.avg_score, 75.0);
    }

    #[test]
    fn empty_attendance_degrades_to_zero_rows_with_cutoffs() {
        let cfg = two_subject_config();
        let students = vec![student(&cfg, "A", &[None, None])];
        let stats = aggregate(&students, &cfg).expect("aggregate");
        assert_eq!(stats.attended_students, 0);
        assert_eq!(stats.avg_score, 0.0);
        assert_eq!(stats.pass_rate, 0.0);
        assert_eq!(stats.subject_stats.len(), 2);
        assert_eq!(stats.subject_stats[0].pass_score, 60.0);
        assert_eq!(stats.subject_stats[0].excellent_score, 90.0);

        let empty = aggregate(&[], &cfg).expect("empty");
        assert_eq!(empty.total_students, 0);
    }

    #[test]
    fn aggregate_is_repeatable() {
        let cfg = two_subject_config();
        let students = vec![
            student(&cfg, "A", &[Some(61.3), Some(77.7)]),
            student(&cfg, "B", &[Some(33.3), None]),
        ];
        let first = aggregate(&students, &cfg).expect("first");
        let second = aggregate(&students, &cfg).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn aggregate_rejects_mismatched_scores() {
        let cfg = two_subject_config();
        let mut s = student(&cfg, "A", &[Some(1.0), Some(2.0)]);
        s.scores.truncate(1);
        s.total_score = 1.0;
        let e = aggregate(&[s], &cfg).expect_err("mismatch");
        assert_eq!(e.code, "subject_count_mismatch");
    }

    #[test]
    fn class_statistics_groups_unlabelled_students_together() {
        let cfg = single_subject_config();
        let students = vec![
            student(&cfg, "A", &[Some(90.0)]).with_class("7-1"),
            student(&cfg, "B", &[Some(50.0)]),
            student(&cfg, "C", &[Some(70.0)]).with_class("7-1"),
            student(&cfg, "D", &[None]),
        ];
        let per_class = class_statistics(&students, &cfg).expect("classes");
        assert_eq!(per_class.len(), 2);
        assert_eq!(per_class[0].class_name, ClassLabel::Named("7-1".to_string()));
        assert_eq!(per_class[0].student_count, 2);
        assert_eq!(per_class[0].statistics.avg_score, 80.0);
        assert_eq!(per_class[1].class_name, ClassLabel::Unclassified);
        assert_eq!(per_class[1].student_count, 2);
        assert_eq!(per_class[1].statistics.attended_students, 1);

        let json = serde_json::to_value(&per_class[1]).expect("serialize");
        assert!(json.get("className").map(|v| v.is_null()).unwrap_or(false));
        assert_eq!(json.get("avgScore").and_then(|v| v.as_f64()), Some(50.0));
    }

    #[test]
    fn default_bands_cover_the_closed_top() {
        let cfg = single_subject_config();
        let students = vec![
            student(&cfg, "A", &[Some(100.0)]),
            student(&cfg, "B", &[Some(90.0)]),
            student(&cfg, "C", &[Some(89.9)]),
            student(&cfg, "D", &[Some(60.0)]),
            student(&cfg, "E", &[Some(0.0)]),
            student(&cfg, "F", &[None]),
        ];
        let dist = score_distribution(&students, &default_bands()).expect("bands");
        let counts: Vec<usize> = dist.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 1, 0, 1, 1]);
        assert_eq!(counts.iter().sum::<usize>(), 5);
        assert_eq!(dist[0].range, "90-100");
        assert_eq!(dist[0].percentage, 40.0);
    }

    #[test]
    fn bands_must_be_well_formed() {
        let e = score_distribution(&[], &[ScoreBand { min: 10.0, max: 10.0 }]).expect_err("bad");
        assert_eq!(e.code, "bad_bands");
        assert!(score_distribution(&[], &[]).is_err());
        let zero = score_distribution(&[], &default_bands()).expect("empty roster");
        assert!(zero.iter().all(|b| b.count == 0 && b.percentage == 0.0));
    }
}
