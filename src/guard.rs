use chrono::{DateTime, Local, SecondsFormat, Utc};
use uuid::Uuid;

use crate::models::{MealRecord, MealStatus, Teacher};
use crate::schema;
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CheckInError {
    #[error("duplicate registration for this group today")]
    Duplicate { existing: Box<MealRecord> },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn local_day(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The (teacherId, group, date) key spans three fields and is not a
/// store-level composite index; this lookup is the authoritative
/// enforcement point and every check-in must pass through it.
pub fn find_existing(
    store: &Store,
    teacher_id: &str,
    group: &str,
    date: &str,
) -> Result<Option<MealRecord>, StoreError> {
    let records: Vec<MealRecord> =
        store.get_by_index(&schema::MEAL_RECORDS, "teacherId", teacher_id)?;
    Ok(records
        .into_iter()
        .find(|r| r.group == group && r.date == date))
}

/// Reject a second check-in for the same (teacher, group, day); the
/// existing record rides along so the surface can explain why. A second
/// record for a different group the same day is allowed (covering).
pub fn check_in(
    store: &Store,
    teacher: &Teacher,
    group: &str,
    now: DateTime<Utc>,
) -> Result<MealRecord, CheckInError> {
    let date = local_day(now);
    if let Some(existing) = find_existing(store, &teacher.id, group, &date)? {
        return Err(CheckInError::Duplicate {
            existing: Box::new(existing),
        });
    }

    let record = MealRecord {
        id: Uuid::new_v4().to_string(),
        teacher_id: teacher.id.clone(),
        teacher_name: teacher.name.clone(),
        teacher_code: teacher.personal_code.clone(),
        group: group.to_string(),
        registered_at: timestamp(now),
        entered_at: None,
        status: MealStatus::Registered,
        date,
    };
    store.insert(&schema::MEAL_RECORDS, &record)?;
    Ok(record)
}
