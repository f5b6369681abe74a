use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::events::{ChangeEvent, ChangeKind};
use crate::guard;
use crate::ipc::error::ok;
use crate::ipc::helpers::{no_store, optional_str, required_i64, required_str, Fail, HandlerError};
use crate::ipc::types::{AppState, Request};
use crate::models::StudentAttendanceRecord;
use crate::schema;
use crate::store::Store;

struct Saved {
    record: StudentAttendanceRecord,
    created: bool,
}

/// Head-count snapshot for (teacher, grade, day). The three-field key is
/// enforced here, not by a store index: the first save for a key inserts,
/// every later save updates the same record.
fn save_counts(store: &Store, params: &serde_json::Value) -> Result<Saved, HandlerError> {
    let teacher_id = required_str(params, "teacherId")?;
    let grade_id = required_str(params, "gradeId")?;
    let present = required_i64(params, "studentsPresent")?;
    let eating = required_i64(params, "studentsEating")?;
    let not_eating = required_i64(params, "studentsNotEating")?;

    if present < 0 || eating < 0 || not_eating < 0 || eating + not_eating != present {
        return Err(Fail::new(
            "invalid_counts",
            "eating + notEating must equal present, all non-negative",
        )
        .into());
    }
    if store.get_by_id::<serde_json::Value>(&schema::TEACHERS, &teacher_id)?.is_none() {
        return Err(Fail::new("not_found", "teacher not found").into());
    }
    if store.get_by_id::<serde_json::Value>(&schema::GRADES, &grade_id)?.is_none() {
        return Err(Fail::new("not_found", "grade not found").into());
    }

    let now = Utc::now();
    let date = guard::local_day(now);
    let existing: Vec<StudentAttendanceRecord> =
        store.get_by_index(&schema::STUDENT_ATTENDANCE, "teacherId", &teacher_id)?;
    let existing = existing
        .into_iter()
        .find(|r| r.grade_id == grade_id && r.date == date);

    match existing {
        Some(mut record) => {
            record.students_present = present;
            record.students_eating = eating;
            record.students_not_eating = not_eating;
            record.timestamp = guard::timestamp(now);
            store.update(&schema::STUDENT_ATTENDANCE, &record)?;
            Ok(Saved {
                record,
                created: false,
            })
        }
        None => {
            let record = StudentAttendanceRecord {
                id: Uuid::new_v4().to_string(),
                teacher_id,
                grade_id,
                date,
                students_present: present,
                students_eating: eating,
                students_not_eating: not_eating,
                timestamp: guard::timestamp(now),
            };
            store.insert(&schema::STUDENT_ATTENDANCE, &record)?;
            Ok(Saved {
                record,
                created: true,
            })
        }
    }
}

fn handle_save_counts(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match save_counts(store, &req.params) {
        Ok(saved) => {
            state.bus.publish(ChangeEvent {
                collection: schema::STUDENT_ATTENDANCE.name,
                kind: if saved.created {
                    ChangeKind::Inserted
                } else {
                    ChangeKind::Updated
                },
                id: Some(saved.record.id.clone()),
            });
            ok(
                &req.id,
                json!({ "record": saved.record, "created": saved.created }),
            )
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_list_counts(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    let date =
        optional_str(&req.params, "date").unwrap_or_else(|| guard::local_day(Utc::now()));
    let grade_id = optional_str(&req.params, "gradeId");
    let result = (|| -> Result<serde_json::Value, HandlerError> {
        let mut records: Vec<StudentAttendanceRecord> =
            store.get_by_index(&schema::STUDENT_ATTENDANCE, "date", &date)?;
        if let Some(grade_id) = &grade_id {
            records.retain(|r| &r.grade_id == grade_id);
        }
        Ok(json!({ "date": date, "records": records }))
    })();
    match result {
        Ok(body) => ok(&req.id, body),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.saveCounts" => Some(handle_save_counts(state, req)),
        "attendance.listCounts" => Some(handle_list_counts(state, req)),
        _ => None,
    }
}
