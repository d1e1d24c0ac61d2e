use crate::calc::{self, CalcError, ScoreBand};
use crate::critical::find_critical;
use crate::diagnosis::diagnose;
use crate::ipc::error::{calc_err, ok};
use crate::ipc::helpers::{exam_id_param, optional_count, optional_field, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::ExamRecord;
use crate::rank::{rank, top_students, RankScope};
use serde_json::json;

fn selected_exam<'a>(state: &'a AppState, req: &Request) -> Result<&'a ExamRecord, CalcError> {
    let exam_id = exam_id_param(req)?;
    state.exam(exam_id.as_deref())
}

fn statistics(state: &AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let exam = selected_exam(state, req)?;
    let stats = calc::aggregate(&exam.students, &exam.config)?;
    Ok(json!({ "examId": exam.id, "statistics": stats }))
}

fn class_statistics(state: &AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let exam = selected_exam(state, req)?;
    let classes = calc::class_statistics(&exam.students, &exam.config)?;
    Ok(json!({ "examId": exam.id, "classes": classes }))
}

fn distribution(state: &AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let exam = selected_exam(state, req)?;
    let bands: Vec<ScoreBand> =
        optional_field(req, "bands")?.unwrap_or_else(calc::default_bands);
    let rows = calc::score_distribution(&exam.students, &bands)?;
    Ok(json!({ "examId": exam.id, "distribution": rows }))
}

fn critical(state: &AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let exam = selected_exam(state, req)?;
    let found = find_critical(&exam.students, &exam.config)?;
    Ok(json!({
        "examId": exam.id,
        "passCritical": found.pass_critical,
        "excellentCritical": found.excellent_critical
    }))
}

/// Ranked view of the exam under a single scope. The stored exam is untouched.
fn ranking(state: &AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let exam = selected_exam(state, req)?;
    let scope: RankScope = optional_field(req, "scope")?.unwrap_or(RankScope::Class);
    Ok(json!({
        "examId": exam.id,
        "scope": scope,
        "students": rank(&exam.students, scope)?
    }))
}

fn top(state: &AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let exam = selected_exam(state, req)?;
    let count = optional_count(req, "count")?.unwrap_or(state.config.top_n);
    Ok(json!({ "examId": exam.id, "students": top_students(&exam.students, count) }))
}

fn diagnosis(state: &AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let exam = selected_exam(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let Some(student) = exam.students.iter().find(|s| s.id == student_id) else {
        return Err(CalcError::new(
            "not_found",
            format!("student {} not found", student_id),
        ));
    };
    let stats = calc::aggregate(&exam.students, &exam.config)?;
    let result = diagnose(student, &exam.config, Some(&stats))?;
    Ok(json!({
        "examId": exam.id,
        "studentId": student.id,
        "name": student.name,
        "diagnosis": result
    }))
}

fn respond(
    req: &Request,
    result: Result<serde_json::Value, CalcError>,
) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => calc_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "analytics.statistics" => statistics(state, req),
        "analytics.classStatistics" => class_statistics(state, req),
        "analytics.distribution" => distribution(state, req),
        "analytics.critical" => critical(state, req),
        "analytics.rank" => ranking(state, req),
        "analytics.top" => top(state, req),
        "analytics.diagnose" => diagnosis(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
