use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::events::{ChangeEvent, ChangeKind};
use crate::guard;
use crate::ipc::error::ok;
use crate::ipc::helpers::{no_store, optional_str, required_str, Fail, HandlerError};
use crate::ipc::types::{AppState, Request};
use crate::models::{self, Grade};
use crate::schema;
use crate::status;
use crate::store::{Store, StoreError};

fn grade_json(grade: &Grade) -> serde_json::Value {
    let mut v = serde_json::to_value(grade).unwrap_or(json!({}));
    // Derived, read-time only; never stored.
    v["durationMinutes"] = json!(status::meal_duration_minutes(Some(grade)));
    v
}

fn check_category(category: &str) -> Result<(), Fail> {
    if models::CATEGORIES.contains(&category) {
        return Ok(());
    }
    Err(Fail::new(
        "bad_params",
        format!(
            "unknown category: {} ({})",
            category,
            models::CATEGORIES.join("|")
        ),
    ))
}

fn check_window(start: &str, end: &str) -> Result<(), Fail> {
    if status::window_minutes(start, end).is_none() {
        return Err(Fail::new(
            "invalid_schedule",
            "schedule must be HH:MM and end must not precede start",
        ));
    }
    Ok(())
}

fn name_taken(e: StoreError) -> HandlerError {
    match e {
        StoreError::ConstraintViolation { field } if field == "name" => {
            HandlerError::Fail(Fail::with_details(
                "constraint_violation",
                "grade name already exists",
                json!({ "field": "name" }),
            ))
        }
        other => HandlerError::Store(other),
    }
}

fn create(store: &Store, params: &serde_json::Value) -> Result<Grade, HandlerError> {
    let name = required_str(params, "name")?;
    let category = required_str(params, "category")?;
    let schedule_start = required_str(params, "scheduleStart")?;
    let schedule_end = required_str(params, "scheduleEnd")?;
    check_category(&category)?;
    check_window(&schedule_start, &schedule_end)?;

    let now = guard::timestamp(Utc::now());
    let grade = Grade {
        id: Uuid::new_v4().to_string(),
        name,
        description: optional_str(params, "description").unwrap_or_default(),
        category,
        schedule_start,
        schedule_end,
        is_active: true,
        created_at: now.clone(),
        updated_at: now,
    };
    store.insert(&schema::GRADES, &grade).map_err(name_taken)?;
    Ok(grade)
}

fn update(store: &Store, params: &serde_json::Value) -> Result<Grade, HandlerError> {
    let grade_id = required_str(params, "gradeId")?;
    let mut grade: Grade = store
        .get_by_id(&schema::GRADES, &grade_id)?
        .ok_or_else(|| Fail::new("not_found", "grade not found"))?;

    if let Some(name) = optional_str(params, "name") {
        grade.name = name;
    }
    if let Some(description) = optional_str(params, "description") {
        grade.description = description;
    }
    if let Some(category) = optional_str(params, "category") {
        check_category(&category)?;
        grade.category = category;
    }
    if let Some(start) = optional_str(params, "scheduleStart") {
        grade.schedule_start = start;
    }
    if let Some(end) = optional_str(params, "scheduleEnd") {
        grade.schedule_end = end;
    }
    if let Some(is_active) = params.get("isActive").and_then(|v| v.as_bool()) {
        grade.is_active = is_active;
    }
    check_window(&grade.schedule_start, &grade.schedule_end)?;

    grade.updated_at = guard::timestamp(Utc::now());
    store.update(&schema::GRADES, &grade).map_err(name_taken)?;
    Ok(grade)
}

fn changed(state: &mut AppState, kind: ChangeKind, id: &str) {
    state.bus.publish(ChangeEvent {
        collection: schema::GRADES.name,
        kind,
        id: Some(id.to_string()),
    });
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match create(store, &req.params) {
        Ok(grade) => {
            changed(state, ChangeKind::Inserted, &grade.id);
            ok(&req.id, json!({ "grade": grade_json(&grade) }))
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match store.get_all::<Grade>(&schema::GRADES) {
        Ok(grades) => {
            let out: Vec<_> = grades.iter().map(grade_json).collect();
            ok(&req.id, json!({ "grades": out }))
        }
        Err(e) => HandlerError::Store(e).response(&req.id),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match update(store, &req.params) {
        Ok(grade) => {
            changed(state, ChangeKind::Updated, &grade.id);
            ok(&req.id, json!({ "grade": grade_json(&grade) }))
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    let grade_id = match required_str(&req.params, "gradeId") {
        Ok(v) => v,
        Err(f) => return HandlerError::Fail(f).response(&req.id),
    };
    match store.delete(&schema::GRADES, &grade_id) {
        Ok(()) => {
            changed(state, ChangeKind::Deleted, &grade_id);
            ok(&req.id, json!({ "deleted": true }))
        }
        Err(e) => HandlerError::Store(e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.create" => Some(handle_create(state, req)),
        "grades.list" => Some(handle_list(state, req)),
        "grades.update" => Some(handle_update(state, req)),
        "grades.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
