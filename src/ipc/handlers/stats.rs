use chrono::{Local, Utc};
use serde_json::json;

use crate::guard;
use crate::ipc::error::ok;
use crate::ipc::helpers::{no_store, optional_str, required_str, Fail, HandlerError};
use crate::ipc::types::{AppState, Request};
use crate::models::{Grade, MealRecord, StudentAttendanceRecord};
use crate::schema;
use crate::stats;
use crate::store::Store;

fn day_dashboard(store: &Store, date: &str) -> Result<serde_json::Value, HandlerError> {
    let now = Utc::now();
    let records: Vec<MealRecord> = store.get_by_index(&schema::MEAL_RECORDS, "date", date)?;
    let grades: Vec<Grade> = store.get_all(&schema::GRADES)?;
    let counts: Vec<StudentAttendanceRecord> =
        store.get_by_index(&schema::STUDENT_ATTENDANCE, "date", date)?;

    let by_status = stats::count_by_status(&records, &grades, now);
    let by_category = stats::count_by_category(&records, &grades);
    let students_present: i64 = counts.iter().map(|c| c.students_present).sum();
    let students_eating: i64 = counts.iter().map(|c| c.students_eating).sum();
    let students_not_eating: i64 = counts.iter().map(|c| c.students_not_eating).sum();

    Ok(json!({
        "date": date,
        "checkIns": records.len(),
        "byStatus": by_status,
        "byCategory": by_category,
        "students": {
            "present": students_present,
            "eating": students_eating,
            "notEating": students_not_eating,
        },
    }))
}

fn handle_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    let date =
        optional_str(&req.params, "date").unwrap_or_else(|| guard::local_day(Utc::now()));
    match day_dashboard(store, &date) {
        Ok(body) => ok(&req.id, body),
        Err(e) => e.response(&req.id),
    }
}

fn teacher_history(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerError> {
    let teacher_id = required_str(params, "teacherId")?;
    if store
        .get_by_id::<serde_json::Value>(&schema::TEACHERS, &teacher_id)?
        .is_none()
    {
        return Err(Fail::new("not_found", "teacher not found").into());
    }
    let records: Vec<MealRecord> =
        store.get_by_index(&schema::MEAL_RECORDS, "teacherId", &teacher_id)?;
    let today = Local::now().date_naive();
    let history = stats::teacher_history(&records, today);
    Ok(json!({ "teacherId": teacher_id, "history": history }))
}

fn handle_teacher_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match teacher_history(store, &req.params) {
        Ok(body) => ok(&req.id, body),
        Err(e) => e.response(&req.id),
    }
}

/// Counts only, for display elsewhere. Not a backup format: no record
/// bodies leave through this path.
fn export(store: &Store) -> Result<serde_json::Value, HandlerError> {
    let mut totals = serde_json::Map::new();
    for spec in schema::ALL {
        totals.insert(spec.name.to_string(), json!(store.count(spec)?));
    }
    let today = guard::local_day(Utc::now());
    Ok(json!({
        "generatedAt": guard::timestamp(Utc::now()),
        "totals": totals,
        "today": day_dashboard(store, &today)?,
    }))
}

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match export(store) {
        Ok(body) => ok(&req.id, body),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.dashboard" => Some(handle_dashboard(state, req)),
        "stats.teacherHistory" => Some(handle_teacher_history(state, req)),
        "stats.export" => Some(handle_export(state, req)),
        _ => None,
    }
}
