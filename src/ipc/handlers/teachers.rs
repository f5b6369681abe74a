use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::auth;
use crate::codes::{self, CodeError};
use crate::events::{ChangeEvent, ChangeKind};
use crate::guard;
use crate::ipc::error::ok;
use crate::ipc::helpers::{no_store, optional_str, required_str, Fail, HandlerError};
use crate::ipc::types::{AppState, Request};
use crate::models::{Role, Teacher};
use crate::schema;
use crate::store::{Store, StoreError};

/// What a teacher looks like outside the store: everything except the
/// credential hash.
pub fn public_json(teacher: &Teacher) -> serde_json::Value {
    json!({
        "id": teacher.id,
        "name": teacher.name,
        "email": teacher.email,
        "personalCode": teacher.personal_code,
        "assignedGroup": teacher.assigned_group,
        "role": teacher.role,
        "isActive": teacher.is_active,
        "createdAt": teacher.created_at,
        "updatedAt": teacher.updated_at,
    })
}

fn parse_role(params: &serde_json::Value) -> Result<Role, Fail> {
    match params.get("role").and_then(|v| v.as_str()) {
        None => Ok(Role::Teacher),
        Some("teacher") => Ok(Role::Teacher),
        Some("admin") => Ok(Role::Admin),
        Some(other) => Err(Fail::new(
            "bad_params",
            format!("unknown role: {} (teacher|admin)", other),
        )),
    }
}

fn register(store: &Store, params: &serde_json::Value) -> Result<Teacher, HandlerError> {
    let name = required_str(params, "name")?;
    let email = required_str(params, "email")?;
    let password = required_str(params, "password")?;
    let role = parse_role(params)?;

    let personal_code = codes::generate_personal_code(store).map_err(|e| match e {
        CodeError::Exhausted(n) => HandlerError::Fail(Fail::new(
            "code_generation_exhausted",
            format!("no free personal code after {} attempts", n),
        )),
        CodeError::Store(se) => HandlerError::Store(se),
    })?;

    let now = guard::timestamp(Utc::now());
    let teacher = Teacher {
        id: Uuid::new_v4().to_string(),
        name,
        email,
        password_hash: auth::hash_password(&password),
        personal_code,
        assigned_group: optional_str(params, "assignedGroup"),
        role,
        is_active: true,
        created_at: now.clone(),
        updated_at: now,
    };
    store
        .insert(&schema::TEACHERS, &teacher)
        .map_err(|e| match e {
            StoreError::ConstraintViolation { field } if field == "email" => {
                HandlerError::Fail(Fail::with_details(
                    "constraint_violation",
                    "email already registered",
                    json!({ "field": "email" }),
                ))
            }
            other => HandlerError::Store(other),
        })?;
    info!(teacher = %teacher.id, "teacher registered");
    Ok(teacher)
}

fn login(store: &Store, params: &serde_json::Value) -> Result<Teacher, HandlerError> {
    let email = required_str(params, "email")?;
    let password = required_str(params, "password")?;

    let matches: Vec<Teacher> = store.get_by_index(&schema::TEACHERS, "email", &email)?;
    // Same error whether the account is unknown, disabled, or the
    // password is wrong: no account enumeration through the login path.
    let denied = || Fail::new("bad_credentials", "invalid email or password");
    let teacher = matches.into_iter().next().ok_or_else(denied)?;
    if !teacher.is_active || !auth::verify_password(&teacher.password_hash, &password) {
        return Err(denied().into());
    }
    Ok(teacher)
}

fn load(store: &Store, params: &serde_json::Value) -> Result<Teacher, HandlerError> {
    let teacher_id = required_str(params, "teacherId")?;
    store
        .get_by_id(&schema::TEACHERS, &teacher_id)?
        .ok_or_else(|| Fail::new("not_found", "teacher not found").into())
}

fn update_profile(store: &Store, params: &serde_json::Value) -> Result<Teacher, HandlerError> {
    let mut teacher = load(store, params)?;
    if let Some(name) = optional_str(params, "name") {
        teacher.name = name;
    }
    if let Some(email) = optional_str(params, "email") {
        teacher.email = email;
    }
    if params.get("assignedGroup").is_some() {
        // Explicit null clears the assignment.
        teacher.assigned_group = optional_str(params, "assignedGroup");
    }
    if params.get("role").is_some() {
        teacher.role = parse_role(params)?;
    }
    teacher.updated_at = guard::timestamp(Utc::now());
    store.update(&schema::TEACHERS, &teacher)?;
    Ok(teacher)
}

fn change_password(store: &Store, params: &serde_json::Value) -> Result<Teacher, HandlerError> {
    let mut teacher = load(store, params)?;
    let current = required_str(params, "currentPassword")?;
    let new = required_str(params, "newPassword")?;
    if !auth::verify_password(&teacher.password_hash, &current) {
        return Err(Fail::new("bad_credentials", "current password does not match").into());
    }
    teacher.password_hash = auth::hash_password(&new);
    teacher.updated_at = guard::timestamp(Utc::now());
    store.update(&schema::TEACHERS, &teacher)?;
    Ok(teacher)
}

fn set_active(store: &Store, params: &serde_json::Value) -> Result<Teacher, HandlerError> {
    let mut teacher = load(store, params)?;
    let is_active = params
        .get("isActive")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| Fail::new("bad_params", "missing isActive"))?;
    teacher.is_active = is_active;
    teacher.updated_at = guard::timestamp(Utc::now());
    store.update(&schema::TEACHERS, &teacher)?;
    Ok(teacher)
}

fn changed(state: &mut AppState, kind: ChangeKind, id: &str) {
    state.bus.publish(ChangeEvent {
        collection: schema::TEACHERS.name,
        kind,
        id: Some(id.to_string()),
    });
}

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match register(store, &req.params) {
        Ok(teacher) => {
            changed(state, ChangeKind::Inserted, &teacher.id);
            ok(&req.id, json!({ "teacher": public_json(&teacher) }))
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match login(store, &req.params) {
        Ok(teacher) => ok(&req.id, json!({ "teacher": public_json(&teacher) })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match store.get_all::<Teacher>(&schema::TEACHERS) {
        Ok(teachers) => {
            let out: Vec<_> = teachers.iter().map(public_json).collect();
            ok(&req.id, json!({ "teachers": out }))
        }
        Err(e) => HandlerError::Store(e).response(&req.id),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match load(store, &req.params) {
        Ok(teacher) => ok(&req.id, json!({ "teacher": public_json(&teacher) })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match update_profile(store, &req.params) {
        Ok(teacher) => {
            changed(state, ChangeKind::Updated, &teacher.id);
            ok(&req.id, json!({ "teacher": public_json(&teacher) }))
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_change_password(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match change_password(store, &req.params) {
        Ok(teacher) => {
            changed(state, ChangeKind::Updated, &teacher.id);
            ok(&req.id, json!({ "changed": true }))
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_set_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match set_active(store, &req.params) {
        Ok(teacher) => {
            changed(state, ChangeKind::Updated, &teacher.id);
            ok(&req.id, json!({ "teacher": public_json(&teacher) }))
        }
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.register" => Some(handle_register(state, req)),
        "teachers.login" => Some(handle_login(state, req)),
        "teachers.list" => Some(handle_list(state, req)),
        "teachers.get" => Some(handle_get(state, req)),
        "teachers.update" => Some(handle_update(state, req)),
        "teachers.changePassword" => Some(handle_change_password(state, req)),
        "teachers.setActive" => Some(handle_set_active(state, req)),
        _ => None,
    }
}
