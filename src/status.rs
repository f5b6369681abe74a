use chrono::{DateTime, NaiveTime, Utc};

use crate::models::{Grade, MealRecord, MealStatus};

/// Used when a record's grade is missing or its window is malformed
/// (degraded mode, not an error).
pub const FALLBACK_MEAL_MINUTES: i64 = 20;

/// Minutes between two "HH:MM" wall-clock readings. `None` when either
/// side fails to parse or the end precedes the start.
pub fn window_minutes(start: &str, end: &str) -> Option<i64> {
    let s = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
    let e = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
    let minutes = (e - s).num_minutes();
    (minutes >= 0).then_some(minutes)
}

pub fn meal_duration_minutes(grade: Option<&Grade>) -> i64 {
    grade
        .and_then(|g| window_minutes(&g.schedule_start, &g.schedule_end))
        .unwrap_or(FALLBACK_MEAL_MINUTES)
}

/// Pure status derivation. Registered until a meal-start writes the
/// entry timestamp; after that, purely a function of elapsed time
/// against the group window, at second resolution.
pub fn calculate_status(
    entered_at: Option<DateTime<Utc>>,
    duration_minutes: i64,
    now: DateTime<Utc>,
) -> MealStatus {
    let Some(entered) = entered_at else {
        return MealStatus::Registered;
    };
    if (now - entered).num_seconds() >= duration_minutes * 60 {
        MealStatus::Finished
    } else {
        MealStatus::Eating
    }
}

/// Whole minutes left in the window, rounded up, floored at zero.
/// Zero before meal-start as well; callers disambiguate via the status.
pub fn remaining_minutes(
    entered_at: Option<DateTime<Utc>>,
    duration_minutes: i64,
    now: DateTime<Utc>,
) -> i64 {
    let Some(entered) = entered_at else {
        return 0;
    };
    let left = duration_minutes * 60 - (now - entered).num_seconds();
    if left <= 0 {
        0
    } else {
        (left + 59) / 60
    }
}

pub fn record_status(record: &MealRecord, grade: Option<&Grade>, now: DateTime<Utc>) -> MealStatus {
    calculate_status(
        parse_instant(record.entered_at.as_deref()),
        meal_duration_minutes(grade),
        now,
    )
}

pub fn record_remaining_minutes(
    record: &MealRecord,
    grade: Option<&Grade>,
    now: DateTime<Utc>,
) -> i64 {
    remaining_minutes(
        parse_instant(record.entered_at.as_deref()),
        meal_duration_minutes(grade),
        now,
    )
}

/// Stored timestamps are RFC 3339; an unparseable value degrades to
/// "not started" rather than failing the read.
pub fn parse_instant(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}
