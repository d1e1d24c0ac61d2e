use crate::calc::CalcError;
use crate::ipc::error::{calc_err, ok};
use crate::ipc::helpers::{optional_count, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{ExamRecord, Student};
use crate::progress::{compare_exams, compare_progress, student_trend, DEFAULT_TOP_COUNT};
use serde_json::json;

fn exam_pair<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<(&'a ExamRecord, &'a ExamRecord), CalcError> {
    let from_id = required_str(req, "fromExamId")?;
    let to_id = required_str(req, "toExamId")?;
    Ok((state.exam(Some(from_id.as_str()))?, state.exam(Some(to_id.as_str()))?))
}

fn find_student<'a>(exam: &'a ExamRecord, student_id: &str) -> Result<&'a Student, CalcError> {
    exam.students
        .iter()
        .find(|s| s.id == student_id)
        .ok_or_else(|| {
            CalcError::new(
                "not_found",
                format!("student {} not found in exam {}", student_id, exam.id),
            )
        })
}

fn compare(state: &AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let (from, to) = exam_pair(state, req)?;
    let top_count = optional_count(req, "topCount")?.unwrap_or(DEFAULT_TOP_COUNT);
    let comparison = compare_exams(from, to, top_count)?;
    Ok(json!({ "comparison": comparison }))
}

fn progress(state: &AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let (from, to) = exam_pair(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let previous = find_student(from, &student_id)?;
    let current = find_student(to, &student_id)?;
    Ok(json!({
        "studentId": student_id,
        "fromExamId": from.id,
        "toExamId": to.id,
        "progress": compare_progress(current, previous)
    }))
}

fn trend(state: &AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let name = required_str(req, "studentName")?;
    Ok(json!({ "trend": student_trend(&state.exams, &name) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "history.compare" => compare(state, req),
        "history.progress" => progress(state, req),
        "history.studentTrend" => trend(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => calc_err(&req.id, e),
    })
}
