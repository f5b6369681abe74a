use serde_json::Value;

use crate::ipc::error::{err, store_err};
use crate::store::StoreError;

/// Handler-internal failure, turned into a wire error at the edge.
pub struct Fail {
    code: &'static str,
    message: String,
    details: Option<Value>,
}

impl Fail {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Fail {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: &'static str, message: impl Into<String>, details: Value) -> Self {
        Fail {
            code,
            message: message.into(),
            details: Some(details),
        }
    }
}

pub enum HandlerError {
    Fail(Fail),
    Store(StoreError),
}

impl HandlerError {
    pub fn response(self, id: &str) -> Value {
        match self {
            HandlerError::Fail(f) => err(id, f.code, f.message, f.details),
            HandlerError::Store(e) => store_err(id, &e),
        }
    }
}

impl From<Fail> for HandlerError {
    fn from(f: Fail) -> Self {
        HandlerError::Fail(f)
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        HandlerError::Store(e)
    }
}

pub fn no_store(id: &str) -> Value {
    err(id, "no_store", "open a data directory first", None)
}

pub fn required_str(params: &Value, key: &str) -> Result<String, Fail> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(Fail::new("bad_params", format!("missing {}", key))),
    }
}

pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn required_i64(params: &Value, key: &str) -> Result<i64, Fail> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| Fail::new("bad_params", format!("missing {}", key)))
}
