use crate::calc::CalcError;
use crate::ipc::types::Request;
use serde::de::DeserializeOwned;

pub fn required_str(req: &Request, key: &str) -> Result<String, CalcError> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CalcError::new("bad_params", format!("missing {}", key)))
}

pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, CalcError> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.trim().to_string()))
            .ok_or_else(|| CalcError::new("bad_params", format!("{} must be a string", key))),
    }
}

pub fn optional_count(req: &Request, key: &str) -> Result<Option<usize>, CalcError> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_u64()
            .filter(|n| *n > 0)
            .map(|n| Some(n as usize))
            .ok_or_else(|| {
                CalcError::new("bad_params", format!("{} must be a positive integer", key))
            }),
    }
}

/// `examId` when given, otherwise the current exam.
pub fn exam_id_param(req: &Request) -> Result<Option<String>, CalcError> {
    optional_str(req, "examId")
}

/// Deserializes the whole `params` object.
pub fn params_as<T: DeserializeOwned>(req: &Request) -> Result<T, CalcError> {
    serde_json::from_value(req.params.clone())
        .map_err(|e| CalcError::new("bad_params", e.to_string()))
}

/// Deserializes one optional field of `params`.
pub fn optional_field<T: DeserializeOwned>(req: &Request, key: &str) -> Result<Option<T>, CalcError> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| CalcError::new("bad_params", format!("{}: {}", key, e))),
    }
}
