use crate::calc::CalcError;
use crate::config::DaemonConfig;
use crate::model::ExamRecord;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// In-memory exam session. Nothing here outlives the process.
pub struct AppState {
    pub config: DaemonConfig,
    pub exams: Vec<ExamRecord>,
    pub current_exam_id: Option<String>,
}

impl AppState {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            exams: Vec::new(),
            current_exam_id: None,
        }
    }

    fn resolve_id<'a>(&'a self, exam_id: Option<&'a str>) -> Result<&'a str, CalcError> {
        exam_id
            .or(self.current_exam_id.as_deref())
            .ok_or_else(|| CalcError::new("no_exam", "import or select an exam first"))
    }

    pub fn exam(&self, exam_id: Option<&str>) -> Result<&ExamRecord, CalcError> {
        let id = self.resolve_id(exam_id)?;
        self.exams
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| CalcError::new("not_found", format!("exam {} not found", id)))
    }

    pub fn exam_mut(&mut self, exam_id: Option<&str>) -> Result<&mut ExamRecord, CalcError> {
        let id = self.resolve_id(exam_id)?.to_string();
        self.exams
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| CalcError::new("not_found", format!("exam {} not found", id)))
    }

    /// Appends and selects `exam`, evicting the oldest exams past the limit.
    /// Returns the ids evicted.
    pub fn add_exam(&mut self, exam: ExamRecord) -> Vec<String> {
        self.current_exam_id = Some(exam.id.clone());
        self.exams.push(exam);
        let overflow = self.exams.len().saturating_sub(self.config.history_limit);
        self.exams
            .drain(..overflow)
            .map(|e| e.id)
            .collect()
    }

    /// Removes an exam; if it was current, the first remaining exam becomes current.
    pub fn remove_exam(&mut self, exam_id: &str) -> Result<ExamRecord, CalcError> {
        let Some(pos) = self.exams.iter().position(|e| e.id == exam_id) else {
            return Err(CalcError::new("not_found", format!("exam {} not found", exam_id)));
        };
        let removed = self.exams.remove(pos);
        if self.current_exam_id.as_deref() == Some(exam_id) {
            self.current_exam_id = self.exams.first().map(|e| e.id.clone());
        }
        Ok(removed)
    }

    pub fn clear(&mut self) -> usize {
        let n = self.exams.len();
        self.exams.clear();
        self.current_exam_id = None;
        n
    }
}
