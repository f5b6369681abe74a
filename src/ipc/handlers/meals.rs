use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use crate::events::{ChangeEvent, ChangeKind};
use crate::guard::{self, CheckInError};
use crate::ipc::error::ok;
use crate::ipc::helpers::{no_store, optional_str, required_str, Fail, HandlerError};
use crate::ipc::types::{AppState, Request};
use crate::models::{Grade, MealRecord, MealStatus, Teacher};
use crate::schema;
use crate::status;
use crate::store::Store;

/// A meal record as the surface sees it: stored fields plus the live
/// status and remaining minutes recomputed at `now`. The cached status
/// field never reaches a response on its own.
fn decorated(
    record: &MealRecord,
    grades: &HashMap<&str, &Grade>,
    now: DateTime<Utc>,
) -> serde_json::Value {
    let grade = grades.get(record.group.as_str()).copied();
    let mut v = serde_json::to_value(record).unwrap_or(json!({}));
    v["status"] = json!(status::record_status(record, grade, now));
    v["remainingMinutes"] = json!(status::record_remaining_minutes(record, grade, now));
    v
}

fn check_in(store: &Store, params: &serde_json::Value) -> Result<MealRecord, HandlerError> {
    let teacher_id = required_str(params, "teacherId")?;
    let group = required_str(params, "group")?;

    let teacher: Teacher = store
        .get_by_id(&schema::TEACHERS, &teacher_id)?
        .ok_or_else(|| Fail::new("not_found", "teacher not found"))?;
    if !teacher.is_active {
        return Err(Fail::new("account_inactive", "account is disabled").into());
    }
    if !store.exists_by_index(&schema::GRADES, "name", &group)? {
        return Err(Fail::new("not_found", "group not found").into());
    }

    let record = guard::check_in(store, &teacher, &group, Utc::now()).map_err(|e| match e {
        CheckInError::Duplicate { existing } => {
            info!(teacher = %existing.teacher_id, group = %existing.group, "duplicate check-in rejected");
            HandlerError::Fail(Fail::with_details(
                "duplicate_registration",
                format!("already checked in for {} today", existing.group),
                json!({
                    "recordId": existing.id,
                    "group": existing.group,
                    "registeredAt": existing.registered_at,
                    "date": existing.date,
                }),
            ))
        }
        CheckInError::Store(se) => HandlerError::Store(se),
    })?;
    Ok(record)
}

fn start_meal(store: &Store, params: &serde_json::Value) -> Result<MealRecord, HandlerError> {
    let record_id = required_str(params, "recordId")?;
    let mut record: MealRecord = store
        .get_by_id(&schema::MEAL_RECORDS, &record_id)?
        .ok_or_else(|| Fail::new("not_found", "meal record not found"))?;

    // Meal-start happens exactly once per record.
    if let Some(entered_at) = &record.entered_at {
        return Err(Fail::with_details(
            "already_started",
            "meal already started",
            json!({ "enteredAt": entered_at }),
        )
        .into());
    }

    record.entered_at = Some(guard::timestamp(Utc::now()));
    record.status = MealStatus::Eating;
    store.update(&schema::MEAL_RECORDS, &record)?;
    Ok(record)
}

fn grade_map(store: &Store) -> Result<Vec<Grade>, HandlerError> {
    Ok(store.get_all::<Grade>(&schema::GRADES)?)
}

fn changed(state: &mut AppState, kind: ChangeKind, id: &str) {
    state.bus.publish(ChangeEvent {
        collection: schema::MEAL_RECORDS.name,
        kind,
        id: Some(id.to_string()),
    });
}

fn handle_check_in(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match check_in(store, &req.params).and_then(|record| {
        let grades = grade_map(store)?;
        Ok((record, grades))
    }) {
        Ok((record, grades)) => {
            let by_name: HashMap<&str, &Grade> = grades.iter().map(|g| (g.name.as_str(), g)).collect();
            let body = decorated(&record, &by_name, Utc::now());
            changed(state, ChangeKind::Inserted, &record.id);
            ok(&req.id, json!({ "record": body }))
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_start_meal(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match start_meal(store, &req.params).and_then(|record| {
        let grades = grade_map(store)?;
        Ok((record, grades))
    }) {
        Ok((record, grades)) => {
            let by_name: HashMap<&str, &Grade> = grades.iter().map(|g| (g.name.as_str(), g)).collect();
            let body = decorated(&record, &by_name, Utc::now());
            changed(state, ChangeKind::Updated, &record.id);
            ok(&req.id, json!({ "record": body }))
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_list_for_date(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    let now = Utc::now();
    let date = optional_str(&req.params, "date").unwrap_or_else(|| guard::local_day(now));
    let result = (|| -> Result<serde_json::Value, HandlerError> {
        let records: Vec<MealRecord> = store.get_by_index(&schema::MEAL_RECORDS, "date", &date)?;
        let grades = grade_map(store)?;
        let by_name: HashMap<&str, &Grade> = grades.iter().map(|g| (g.name.as_str(), g)).collect();
        let out: Vec<_> = records.iter().map(|r| decorated(r, &by_name, now)).collect();
        Ok(json!({ "date": date, "records": out }))
    })();
    match result {
        Ok(body) => ok(&req.id, body),
        Err(e) => e.response(&req.id),
    }
}

fn handle_for_teacher(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    let teacher_id = match required_str(&req.params, "teacherId") {
        Ok(v) => v,
        Err(f) => return HandlerError::Fail(f).response(&req.id),
    };
    let now = Utc::now();
    let result = (|| -> Result<serde_json::Value, HandlerError> {
        let records: Vec<MealRecord> =
            store.get_by_index(&schema::MEAL_RECORDS, "teacherId", &teacher_id)?;
        let grades = grade_map(store)?;
        let by_name: HashMap<&str, &Grade> = grades.iter().map(|g| (g.name.as_str(), g)).collect();
        let out: Vec<_> = records.iter().map(|r| decorated(r, &by_name, now)).collect();
        Ok(json!({ "records": out }))
    })();
    match result {
        Ok(body) => ok(&req.id, body),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "meals.checkIn" => Some(handle_check_in(state, req)),
        "meals.startMeal" => Some(handle_start_meal(state, req)),
        "meals.listForDate" => Some(handle_list_for_date(state, req)),
        "meals.forTeacher" => Some(handle_for_teacher(state, req)),
        _ => None,
    }
}
