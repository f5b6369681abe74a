use serde_json::json;
use tracing::error;

use crate::store::StoreError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Map the store taxonomy onto wire error codes. Serialization failures
/// are a programming-contract violation: log the detail, surface a
/// generic message.
pub fn store_err(id: &str, e: &StoreError) -> serde_json::Value {
    match e {
        StoreError::ConstraintViolation { field } => err(
            id,
            "constraint_violation",
            format!("{} is already in use", field),
            Some(json!({ "field": field })),
        ),
        StoreError::NotFound => err(id, "not_found", "record not found", None),
        StoreError::Serialization(reason) => {
            error!(reason = %reason, "non-storable payload reached the store");
            err(id, "serialization_error", "could not save, please retry", None)
        }
        StoreError::Migration { .. } => err(id, "migration_error", e.to_string(), None),
        StoreError::Backend(_) | StoreError::Io(_) => err(id, "db_error", e.to_string(), None),
    }
}
