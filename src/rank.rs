use crate::calc::CalcError;
use crate::model::{check_unique_ids, ClassLabel, Student};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Which population a rank is computed over. `Class` writes `rank`,
/// `Grade` writes `gradeRank`; both can coexist on one student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RankScope {
    Class,
    Grade,
}

/// Rank assignments computed separately from the students they describe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankTable {
    overall: HashMap<(RankScope, String), u32>,
    subjects: HashMap<(RankScope, String, usize), u32>,
}

impl RankTable {
    pub fn overall(&self, scope: RankScope, student_id: &str) -> Option<u32> {
        self.overall.get(&(scope, student_id.to_string())).copied()
    }

    pub fn subject(&self, scope: RankScope, student_id: &str, idx: usize) -> Option<u32> {
        self.subjects
            .get(&(scope, student_id.to_string(), idx))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.overall.len() + self.subjects.len()
    }
}

/// Standard competition ranking ("1224"): sort by value desc then id asc,
/// ties share the earlier rank and the next distinct value resumes at its
/// 1-based position.
pub fn competition_ranks<'a>(mut entries: Vec<(&'a str, f64)>) -> Vec<(&'a str, u32)> {
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    let mut out: Vec<(&'a str, u32)> = Vec::with_capacity(entries.len());
    let mut prev: Option<(f64, u32)> = None;
    for (pos, (id, value)) in entries.into_iter().enumerate() {
        let rank = match prev {
            Some((prev_value, prev_rank)) if prev_value == value => prev_rank,
            _ => (pos as u32) + 1,
        };
        prev = Some((value, rank));
        out.push((id, rank));
    }
    out
}

fn subject_count(students: &[Student]) -> Result<usize, CalcError> {
    let Some(first) = students.first() else {
        return Ok(0);
    };
    let n = first.scores.len();
    if let Some(bad) = students.iter().find(|s| s.scores.len() != n) {
        return Err(CalcError::new(
            "subject_count_mismatch",
            format!(
                "student {} has {} scores but student {} has {}",
                bad.id,
                bad.scores.len(),
                first.id,
                n
            ),
        )
        .with_details(json!({ "studentId": bad.id, "expected": n })));
    }
    Ok(n)
}

fn rank_group(table: &mut RankTable, scope: RankScope, group: &[&Student], subjects: usize) {
    let attended: Vec<&Student> = group.iter().copied().filter(|s| s.is_attended()).collect();

    let totals = attended
        .iter()
        .map(|s| (s.id.as_str(), s.total_score))
        .collect();
    for (id, rank) in competition_ranks(totals) {
        table.overall.insert((scope, id.to_string()), rank);
    }

    for idx in 0..subjects {
        let values = attended
            .iter()
            .filter_map(|s| s.score_at(idx).value().map(|v| (s.id.as_str(), v)))
            .collect();
        for (id, rank) in competition_ranks(values) {
            table.subjects.insert((scope, id.to_string(), idx), rank);
        }
    }
}

/// Computes ranks for every requested scope without touching `students`.
pub fn compute_ranks(students: &[Student], scopes: &[RankScope]) -> Result<RankTable, CalcError> {
    check_unique_ids(students)?;
    let subjects = subject_count(students)?;
    let mut table = RankTable::default();

    for scope in scopes {
        match scope {
            RankScope::Grade => {
                let everyone: Vec<&Student> = students.iter().collect();
                rank_group(&mut table, *scope, &everyone, subjects);
            }
            RankScope::Class => {
                let mut groups: BTreeMap<ClassLabel, Vec<&Student>> = BTreeMap::new();
                for s in students {
                    groups.entry(s.class_label()).or_default().push(s);
                }
                for members in groups.values() {
                    rank_group(&mut table, *scope, members, subjects);
                }
            }
        }
    }

    tracing::debug!(
        students = students.len(),
        subjects,
        assignments = table.len(),
        "computed rank table"
    );
    Ok(table)
}

/// Returns a copy of `students` whose rank fields come only from `table`.
/// Fields for scopes missing from the table end up unset.
pub fn apply_ranks(students: &[Student], table: &RankTable) -> Vec<Student> {
    students
        .iter()
        .map(|s| {
            let mut out = s.clone();
            out.clear_ranks();
            out.rank = table.overall(RankScope::Class, &s.id);
            out.grade_rank = table.overall(RankScope::Grade, &s.id);
            for (idx, score) in out.scores.iter_mut().enumerate() {
                score.rank = table.subject(RankScope::Class, &s.id, idx);
                score.grade_rank = table.subject(RankScope::Grade, &s.id, idx);
            }
            out
        })
        .collect()
}

pub fn rank(students: &[Student], scope: RankScope) -> Result<Vec<Student>, CalcError> {
    let table = compute_ranks(students, &[scope])?;
    Ok(apply_ranks(students, &table))
}

/// Class ranks always; grade ranks as well in multi-class (grade) mode.
pub fn rank_all(students: &[Student], grade_mode: bool) -> Result<Vec<Student>, CalcError> {
    let scopes: &[RankScope] = if grade_mode {
        &[RankScope::Class, RankScope::Grade]
    } else {
        &[RankScope::Class]
    };
    let table = compute_ranks(students, scopes)?;
    Ok(apply_ranks(students, &table))
}

/// Attended students best-first, at most `count` of them. Grade ranks order
/// the list when present; otherwise totals desc then id, so class ranks from
/// different classes never interleave.
pub fn top_students(students: &[Student], count: usize) -> Vec<Student> {
    let mut ranked: Vec<&Student> = students.iter().filter(|s| s.is_attended()).collect();
    ranked.sort_by(|a, b| {
        let primary = match (a.grade_rank, b.grade_rank) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => b
                .total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(Ordering::Equal),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
    ranked.into_iter().take(count).cloned().collect()
}
