use crate::calc::CalcError;
use crate::ipc::error::{calc_err, ok};
use crate::ipc::helpers::{exam_id_param, optional_field, params_as, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    derive_status, validate_roster, AttendanceStatus, ExamConfig, ExamRecord, Score, ScoreValue,
    Student,
};
use crate::rank::rank_all;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentInput {
    id: String,
    name: String,
    #[serde(default)]
    class_name: Option<String>,
    scores: Vec<ScoreValue>,
    #[serde(default)]
    total_score: Option<f64>,
    #[serde(default)]
    status: Option<AttendanceStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportParams {
    name: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    grade_mode: bool,
    config: ExamConfig,
    students: Vec<StudentInput>,
}

fn build_scores(
    student_id: &str,
    values: &[ScoreValue],
    config: &ExamConfig,
) -> Result<Vec<Score>, CalcError> {
    if values.len() != config.subjects.len() {
        return Err(CalcError::new(
            "subject_count_mismatch",
            format!(
                "student {} has {} scores but {} subjects are configured",
                student_id,
                values.len(),
                config.subjects.len()
            ),
        ));
    }
    Ok(config
        .subjects
        .iter()
        .zip(values)
        .map(|(subject, value)| Score::new(subject, *value))
        .collect())
}

fn apply_status(student: &mut Student, requested: AttendanceStatus) -> Result<(), CalcError> {
    let status = derive_status(&student.scores, requested);
    if requested == AttendanceStatus::Absent && status != AttendanceStatus::Absent {
        return Err(CalcError::new(
            "status_mismatch",
            format!("student {} has scores and cannot be marked absent", student.id),
        ));
    }
    student.status = status;
    Ok(())
}

fn build_student(input: StudentInput, config: &ExamConfig) -> Result<Student, CalcError> {
    let scores = build_scores(&input.id, &input.scores, config)?;
    let mut student = Student::new(input.id.trim(), input.name.trim(), scores);
    if let Some(class_name) = input.class_name.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        student = student.with_class(class_name);
    }
    if let Some(status) = input.status {
        apply_status(&mut student, status)?;
    }
    if let Some(total) = input.total_score {
        // Checked against the score sum by roster validation.
        student.total_score = total;
    }
    Ok(student)
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>, CalcError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| CalcError::new("bad_params", "date must be YYYY-MM-DD"))
}

pub fn exam_summary(exam: &ExamRecord) -> serde_json::Value {
    let config = &exam.config;
    json!({
        "id": exam.id,
        "name": exam.name,
        "date": exam.date,
        "className": exam.class_name,
        "importedAt": exam.imported_at,
        "gradeMode": exam.grade_mode,
        "studentCount": exam.students.len(),
        "attendedCount": exam.students.iter().filter(|s| s.is_attended()).count(),
        "config": {
            "subjects": config.subjects,
            "passLine": config.pass_line,
            "excellentLine": config.excellent_line,
            "totalFullScore": config.total_full_score(),
            "totalPassScore": config.total_pass_score(),
            "totalExcellentScore": config.total_excellent_score()
        }
    })
}

fn import_exam(state: &mut AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let params: ImportParams = params_as(req)?;
    let name = params.name.trim().to_string();
    if name.is_empty() {
        return Err(CalcError::new("bad_params", "missing name"));
    }
    let date = parse_date(params.date.as_deref())?;
    params.config.validate()?;

    let students = params
        .students
        .into_iter()
        .map(|s| build_student(s, &params.config))
        .collect::<Result<Vec<_>, _>>()?;
    validate_roster(&students, &params.config)?;
    let students = rank_all(&students, params.grade_mode)?;

    let exam = ExamRecord {
        id: Uuid::new_v4().to_string(),
        name,
        date,
        class_name: params
            .class_name
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        imported_at: Utc::now().to_rfc3339(),
        grade_mode: params.grade_mode,
        config: params.config,
        students,
    };
    let summary = exam_summary(&exam);
    tracing::info!(
        exam_id = %exam.id,
        students = exam.students.len(),
        grade_mode = exam.grade_mode,
        "exam imported"
    );
    let evicted = state.add_exam(exam);
    if !evicted.is_empty() {
        tracing::info!(count = evicted.len(), "evicted oldest exams past history limit");
    }
    Ok(json!({ "exam": summary, "evictedExamIds": evicted }))
}

fn handle_exams_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    match import_exam(state, req) {
        Ok(result) => ok(&req.id, result),
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let exams = state.exams.iter().map(exam_summary).collect::<Vec<_>>();
    ok(
        &req.id,
        json!({ "exams": exams, "currentExamId": state.current_exam_id }),
    )
}

fn handle_exams_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let exam_id = match required_str(req, "examId") {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    let summary = match state.exam(Some(exam_id.as_str())) {
        Ok(exam) => exam_summary(exam),
        Err(e) => return calc_err(&req.id, e),
    };
    state.current_exam_id = Some(exam_id);
    ok(&req.id, json!({ "exam": summary }))
}

fn handle_exams_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let exam_id = match required_str(req, "examId") {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    match state.remove_exam(&exam_id) {
        Ok(removed) => {
            tracing::info!(exam_id = %removed.id, "exam removed");
            ok(
                &req.id,
                json!({ "removedExamId": removed.id, "currentExamId": state.current_exam_id }),
            )
        }
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_exams_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let removed = state.clear();
    tracing::info!(count = removed, "session cleared");
    ok(&req.id, json!({ "removed": removed }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let exam_id = match exam_id_param(req) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    match state.exam(exam_id.as_deref()) {
        Ok(exam) => ok(
            &req.id,
            json!({ "examId": exam.id, "students": exam.students }),
        ),
        Err(e) => calc_err(&req.id, e),
    }
}

fn update_student(state: &mut AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let exam_id = exam_id_param(req)?;
    let student_id = required_str(req, "studentId")?;
    let name: Option<String> = optional_field(req, "name")?;
    let status: Option<AttendanceStatus> = optional_field(req, "status")?;
    let scores: Option<Vec<ScoreValue>> = optional_field(req, "scores")?;

    let exam = state.exam_mut(exam_id.as_deref())?;
    let mut students = exam.students.clone();
    let Some(student) = students.iter_mut().find(|s| s.id == student_id) else {
        return Err(CalcError::new(
            "not_found",
            format!("student {} not found", student_id),
        ));
    };

    if let Some(name) = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        student.name = name;
    }
    match req.params.get("className") {
        None => {}
        Some(v) if v.is_null() => student.class_name = None,
        Some(v) => {
            let Some(c) = v.as_str() else {
                return Err(CalcError::new("bad_params", "className must be a string or null"));
            };
            let c = c.trim();
            student.class_name = if c.is_empty() { None } else { Some(c.to_string()) };
        }
    }
    if let Some(values) = scores {
        let rebuilt = build_scores(&student.id, &values, &exam.config)?;
        student.set_scores(rebuilt);
    }
    if let Some(status) = status {
        apply_status(student, status)?;
    }

    validate_roster(&students, &exam.config)?;
    exam.students = rank_all(&students, exam.grade_mode)?;
    tracing::info!(exam_id = %exam.id, student_id = %student_id, "student updated");

    let updated = exam.students.iter().find(|s| s.id == student_id);
    Ok(json!({ "examId": exam.id, "student": updated }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    match update_student(state, req) {
        Ok(result) => ok(&req.id, result),
        Err(e) => calc_err(&req.id, e),
    }
}

fn update_config(state: &mut AppState, req: &Request) -> Result<serde_json::Value, CalcError> {
    let exam_id = exam_id_param(req)?;
    let pass_line: Option<f64> = optional_field(req, "passLine")?;
    let excellent_line: Option<f64> = optional_field(req, "excellentLine")?;

    let exam = state.exam_mut(exam_id.as_deref())?;
    let mut config = exam.config.clone();
    if let Some(v) = pass_line {
        config.pass_line = v;
    }
    if let Some(v) = excellent_line {
        config.excellent_line = v;
    }
    validate_roster(&exam.students, &config)?;

    exam.students = rank_all(&exam.students, exam.grade_mode)?;
    exam.config = config;
    tracing::info!(exam_id = %exam.id, "exam config updated");
    Ok(exam_summary(exam))
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    match update_config(state, req) {
        Ok(summary) => ok(&req.id, json!({ "exam": summary })),
        Err(e) => calc_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.import" => Some(handle_exams_import(state, req)),
        "exams.list" => Some(handle_exams_list(state, req)),
        "exams.select" => Some(handle_exams_select(state, req)),
        "exams.remove" => Some(handle_exams_remove(state, req)),
        "exams.clear" => Some(handle_exams_clear(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}
