use crate::calc::{round_off_1_decimal, CalcError};
use crate::model::{ExamConfig, Student};
use serde::Serialize;
use std::cmp::Ordering;

/// Width of the band below a threshold in which a student counts as critical.
/// Fixed in points, not derived from the exam's full score.
pub const CRITICAL_BAND: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CriticalKind {
    Pass,
    Excellent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalStudent {
    pub student: Student,
    pub gap: f64,
    #[serde(rename = "type")]
    pub kind: CriticalKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalStudents {
    pub pass_critical: Vec<CriticalStudent>,
    pub excellent_critical: Vec<CriticalStudent>,
}

/// Attended students just under the pass line, and passing students just
/// under the excellence line. Each list is ordered closest-first.
pub fn find_critical(students: &[Student], config: &ExamConfig) -> Result<CriticalStudents, CalcError> {
    config.validate()?;
    let pass_line = config.total_pass_score();
    let excellent_line = config.total_excellent_score();

    let mut out = CriticalStudents::default();
    for s in students.iter().filter(|s| s.is_attended()) {
        let total = s.total_score;
        if total < pass_line && total >= pass_line - CRITICAL_BAND {
            out.pass_critical.push(CriticalStudent {
                student: s.clone(),
                gap: round_off_1_decimal(pass_line - total),
                kind: CriticalKind::Pass,
            });
        }
        if total >= pass_line && total < excellent_line && total >= excellent_line - CRITICAL_BAND {
            out.excellent_critical.push(CriticalStudent {
                student: s.clone(),
                gap: round_off_1_decimal(excellent_line - total),
                kind: CriticalKind::Excellent,
            });
        }
    }

    let closest_first = |a: &CriticalStudent, b: &CriticalStudent| {
        a.gap
            .partial_cmp(&b.gap)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.student.id.cmp(&b.student.id))
    };
    out.pass_critical.sort_by(closest_first);
    out.excellent_critical.sort_by(closest_first);

    tracing::debug!(
        pass = out.pass_critical.len(),
        excellent = out.excellent_critical.len(),
        "critical students found"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{student, two_subject_config};

    fn ids(list: &[CriticalStudent]) -> Vec<&str> {
        list.iter().map(|c| c.student.id.as_str()).collect()
    }

    #[test]
    fn pass_band_is_closed_below_and_open_above() {
        // total pass line 120, excellence 180
        let cfg = two_subject_config();
        let students = vec![
            student(&cfg, "at-line", &[Some(60.0), Some(60.0)]),
            student(&cfg, "ten-below", &[Some(60.0), Some(50.0)]),
            student(&cfg, "eleven-below", &[Some(59.0), Some(50.0)]),
            student(&cfg, "close", &[Some(59.5), Some(58.0)]),
        ];
        let found = find_critical(&students, &cfg).expect("critical");
        assert_eq!(ids(&found.pass_critical), vec!["close", "ten-below"]);
        assert_eq!(found.pass_critical[0].gap, 2.5);
        assert_eq!(found.pass_critical[1].gap, 10.0);
        assert!(found
            .pass_critical
            .iter()
            .all(|c| c.kind == CriticalKind::Pass));
    }

    #[test]
    fn excellence_band_requires_a_pass() {
        let cfg = two_subject_config();
        let students = vec![
            student(&cfg, "A", &[Some(85.0), Some(88.0)]),
            student(&cfg, "B", &[Some(90.0), Some(80.0)]),
            student(&cfg, "C", &[Some(90.0), Some(90.0)]),
            student(&cfg, "D", &[Some(80.0), Some(85.0)]),
        ];
        let found = find_critical(&students, &cfg).expect("critical");
        assert_eq!(ids(&found.excellent_critical), vec!["A", "B"]);
        assert_eq!(found.excellent_critical[0].gap, 7.0);
        assert!(found.pass_critical.is_empty());
    }

    #[test]
    fn absent_students_are_never_critical() {
        let cfg = two_subject_config();
        let students = vec![student(&cfg, "A", &[None, None])];
        let found = find_critical(&students, &cfg).expect("critical");
        assert_eq!(found, CriticalStudents::default());

        let json = serde_json::to_value(&find_critical(&[], &cfg).expect("empty")).expect("json");
        assert!(json.get("passCritical").is_some());
    }
}
