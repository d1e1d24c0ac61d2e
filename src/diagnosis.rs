use crate::calc::{round_off_1_decimal, CalcError, Statistics};
use crate::model::{check_student, ExamConfig, Student};
use serde::Serialize;

const STRENGTH_RATE: f64 = 85.0;
const WEAKNESS_RATE: f64 = 65.0;
const BALANCED_AT: f64 = 80.0;
const UNBALANCED_BELOW: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Excellent,
    Good,
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
    pub total_score_level: Level,
    pub balance_score: f64,
}

/// Everything the suggestion rules look at.
#[derive(Debug)]
struct Findings<'a> {
    level: Level,
    strengths: &'a [String],
    weaknesses: &'a [String],
    balance_score: f64,
    subject_count: usize,
}

type SuggestionRule = fn(&Findings<'_>) -> Option<String>;

/// Evaluated in order; each rule adds at most one message.
const SUGGESTION_RULES: &[SuggestionRule] = &[
    level_message,
    strengths_message,
    weaknesses_message,
    balance_message,
    no_weakness_message,
];

pub fn overall_level(total: f64, config: &ExamConfig) -> Level {
    let pass = config.total_pass_score();
    let excellent = config.total_excellent_score();
    if total >= excellent {
        Level::Excellent
    } else if total >= pass {
        if total >= (pass + excellent) / 2.0 {
            Level::Good
        } else {
            Level::Pass
        }
    } else {
        Level::Fail
    }
}

/// `max(0, 100 - 5 * stddev)` over per-subject score rates (population
/// standard deviation). No rates at all scores zero.
pub fn balance_score(rates: &[f64]) -> f64 {
    if rates.is_empty() {
        return 0.0;
    }
    let n = rates.len() as f64;
    let avg = rates.iter().sum::<f64>() / n;
    let variance = rates.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / n;
    round_off_1_decimal((100.0 - variance.sqrt() * 5.0).max(0.0))
}

/// Diagnoses one student. `_statistics` is accepted for rules that want exam
/// context; none of the current rules read it.
pub fn diagnose(
    student: &Student,
    config: &ExamConfig,
    _statistics: Option<&Statistics>,
) -> Result<Diagnosis, CalcError> {
    config.validate()?;
    check_student(student, config)?;

    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    let mut rates = Vec::new();

    for score in &student.scores {
        let Some(value) = score.score.value() else {
            continue;
        };
        let rate = value / score.full_score * 100.0;
        rates.push(rate);

        // Independent checks: a loosely configured exam can make a subject both.
        if value >= config.excellent_score_for(score.full_score) || rate >= STRENGTH_RATE {
            strengths.push(score.subject.clone());
        }
        if value < config.pass_score_for(score.full_score) || rate < WEAKNESS_RATE {
            weaknesses.push(score.subject.clone());
        }
    }

    let level = overall_level(student.total_score, config);
    let balance = balance_score(&rates);
    let findings = Findings {
        level,
        strengths: &strengths,
        weaknesses: &weaknesses,
        balance_score: balance,
        subject_count: student.scores.len(),
    };
    let suggestions = SUGGESTION_RULES
        .iter()
        .filter_map(|rule| rule(&findings))
        .collect();

    Ok(Diagnosis {
        strengths,
        weaknesses,
        suggestions,
        total_score_level: level,
        balance_score: balance,
    })
}

fn level_message(f: &Findings<'_>) -> Option<String> {
    let text = match f.level {
        Level::Excellent => "Overall results are excellent. Keep the current study rhythm and pursue deeper understanding and extension in the strongest subjects.",
        Level::Good => "Overall results are good but still short of excellent. Hold the current level and focus on breaking through the weak spots.",
        Level::Pass => "Results meet the pass standard with plenty of room to grow. Draw up a detailed study plan and raise each subject step by step.",
        Level::Fail => "The total score is below the pass line and needs attention. Ask teachers and classmates for help and set up a targeted catch-up plan.",
    };
    Some(text.to_string())
}

fn strengths_message(f: &Findings<'_>) -> Option<String> {
    if f.strengths.is_empty() {
        return None;
    }
    if f.strengths.len() == f.subject_count {
        return Some(
            "Every subject is at a strong level, showing well-rounded development. Keep it up and explore deeper material in the subjects of most interest."
                .to_string(),
        );
    }
    Some(format!(
        "Stands out in {}. Carry the study methods and habits from these subjects over to the others.",
        f.strengths.join(", ")
    ))
}

fn weaknesses_message(f: &Findings<'_>) -> Option<String> {
    match f.weaknesses {
        [] => None,
        [only] => Some(format!(
            "{} is the current weak spot. Give it more study time, consolidate the fundamentals, and ask the teacher for one-on-one help if needed.",
            only
        )),
        [_, _] => Some(format!(
            "{} need focused attention. Set up a dedicated improvement plan and practise the core problem types of both subjects at a fixed time every day.",
            f.weaknesses.join(", ")
        )),
        _ => Some(format!(
            "Several subjects are weak ({}). Start with the weakest one or two, build a solid base, then improve across the board.",
            f.weaknesses.join(", ")
        )),
    }
}

fn balance_message(f: &Findings<'_>) -> Option<String> {
    if f.balance_score >= BALANCED_AT {
        Some("Subjects are developing evenly, which is a healthy state. Keep this balance and avoid favouring particular subjects.".to_string())
    } else if f.balance_score < UNBALANCED_BELOW {
        Some("Results vary widely between subjects, showing a clear imbalance. Spread study time more evenly and prioritise the weaker subjects.".to_string())
    } else {
        None
    }
}

fn no_weakness_message(f: &Findings<'_>) -> Option<String> {
    if f.weaknesses.is_empty() && f.level != Level::Excellent {
        Some("No clear weak subject and development is even. Build on this and aim to bring more subjects up to the excellent level.".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{student, two_subject_config};
    use crate::model::{ExamConfig, Subject};

    #[test]
    fn mixed_profile_is_pass_with_one_strength_and_one_weakness() {
        let cfg = two_subject_config();
        let s = student(&cfg, "A", &[Some(95.0), Some(50.0)]);
        let d = diagnose(&s, &cfg, None).expect("diagnose");

        // 145 is above the 120 pass line but below the 150 midpoint.
        assert_eq!(d.total_score_level, Level::Pass);
        assert_eq!(d.strengths, vec!["Math".to_string()]);
        assert_eq!(d.weaknesses, vec!["English".to_string()]);
        // stddev of [95, 50] is 22.5, so the score clamps to zero.
        assert_eq!(d.balance_score, 0.0);

        assert_eq!(d.suggestions.len(), 4);
        assert!(d.suggestions[0].starts_with("Results meet the pass standard"));
        assert!(d.suggestions[1].starts_with("Stands out in Math."));
        assert!(d.suggestions[2].starts_with("English is the current weak spot."));
        assert!(d.suggestions[3].starts_with("Results vary widely"));
    }

    #[test]
    fn level_splits_at_the_midpoint() {
        let cfg = two_subject_config();
        assert_eq!(overall_level(180.0, &cfg), Level::Excellent);
        assert_eq!(overall_level(150.0, &cfg), Level::Good);
        assert_eq!(overall_level(149.9, &cfg), Level::Pass);
        assert_eq!(overall_level(120.0, &cfg), Level::Pass);
        assert_eq!(overall_level(119.9, &cfg), Level::Fail);
    }

    #[test]
    fn balance_score_bounds() {
        assert_eq!(balance_score(&[70.0, 70.0, 70.0]), 100.0);
        assert_eq!(balance_score(&[0.0, 100.0]), 0.0);
        // stddev 5 -> 75
        assert_eq!(balance_score(&[65.0, 75.0]), 75.0);
        assert_eq!(balance_score(&[]), 0.0);
    }

    #[test]
    fn all_strength_excellent_student_gets_no_extra_encouragement() {
        let cfg = two_subject_config();
        let s = student(&cfg, "A", &[Some(95.0), Some(92.0)]);
        let d = diagnose(&s, &cfg, None).expect("diagnose");
        assert_eq!(d.total_score_level, Level::Excellent);
        assert_eq!(d.strengths.len(), 2);
        assert!(d.weaknesses.is_empty());
        assert_eq!(d.suggestions.len(), 3);
        assert!(d.suggestions[1].starts_with("Every subject is at a strong level"));
        assert!(d.suggestions[2].starts_with("Subjects are developing evenly"));
    }

    #[test]
    fn even_good_student_gets_encouragement_after_balance_note() {
        let cfg = two_subject_config();
        let s = student(&cfg, "A", &[Some(80.0), Some(78.0)]);
        let d = diagnose(&s, &cfg, None).expect("diagnose");
        assert_eq!(d.total_score_level, Level::Good);
        assert!(d.strengths.is_empty());
        assert!(d.weaknesses.is_empty());
        assert_eq!(d.suggestions.len(), 3);
        assert!(d.suggestions[2].starts_with("No clear weak subject"));
    }

    #[test]
    fn weakness_message_varies_with_count() {
        let cfg = ExamConfig::new(
            vec![
                Subject::new("Math", 100.0),
                Subject::new("English", 100.0),
                Subject::new("Physics", 100.0),
            ],
            60.0,
            90.0,
        );
        let two = student(&cfg, "A", &[Some(50.0), Some(55.0), Some(70.0)]);
        let d = diagnose(&two, &cfg, None).expect("diagnose");
        assert!(d
            .suggestions
            .iter()
            .any(|m| m.starts_with("Math, English need focused attention.")));

        let three = student(&cfg, "B", &[Some(50.0), Some(55.0), Some(64.0)]);
        let d = diagnose(&three, &cfg, None).expect("diagnose");
        assert_eq!(d.weaknesses.len(), 3);
        assert!(d
            .suggestions
            .iter()
            .any(|m| m.contains("(Math, English, Physics)")));
    }

    #[test]
    fn overlapping_lines_allow_dual_membership() {
        let cfg = ExamConfig::new(vec![Subject::new("Math", 100.0)], 95.0, 99.0);
        let s = student(&cfg, "A", &[Some(90.0)]);
        let d = diagnose(&s, &cfg, None).expect("diagnose");
        assert_eq!(d.strengths, vec!["Math".to_string()]);
        assert_eq!(d.weaknesses, vec!["Math".to_string()]);
    }

    #[test]
    fn absent_subjects_are_skipped() {
        let cfg = two_subject_config();
        let s = student(&cfg, "A", &[Some(70.0), None]);
        let d = diagnose(&s, &cfg, None).expect("diagnose");
        assert!(d.strengths.is_empty());
        assert!(d.weaknesses.is_empty());
        assert_eq!(d.balance_score, 100.0);
        assert_eq!(d.total_score_level, Level::Fail);
    }
}
