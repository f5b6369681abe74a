use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::Serialize;

use crate::models::{Grade, MealRecord};
use crate::status;

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub registered: i64,
    pub eating: i64,
    pub finished: i64,
}

pub fn grades_by_name<'a>(grades: &'a [Grade]) -> HashMap<&'a str, &'a Grade> {
    grades.iter().map(|g| (g.name.as_str(), g)).collect()
}

/// Counts over live statuses, recomputed at `now` from each record's
/// timestamps; the cached status field is never trusted here.
pub fn count_by_status(
    records: &[MealRecord],
    grades: &[Grade],
    now: DateTime<Utc>,
) -> StatusCounts {
    let by_name = grades_by_name(grades);
    let mut counts = StatusCounts::default();
    for record in records {
        let grade = by_name.get(record.group.as_str()).copied();
        match status::record_status(record, grade, now) {
            crate::models::MealStatus::Registered => counts.registered += 1,
            crate::models::MealStatus::Eating => counts.eating += 1,
            crate::models::MealStatus::Finished => counts.finished += 1,
        }
    }
    counts
}

/// Grouped by the grade's own category field; a record whose group no
/// longer resolves lands under "sin_categoria".
pub fn count_by_category(records: &[MealRecord], grades: &[Grade]) -> BTreeMap<String, i64> {
    let by_name = grades_by_name(grades);
    let mut counts = BTreeMap::new();
    for record in records {
        let category = by_name
            .get(record.group.as_str())
            .map(|g| g.category.clone())
            .unwrap_or_else(|| "sin_categoria".to_string());
        *counts.entry(category).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherHistory {
    pub total: i64,
    pub today: i64,
    pub this_week: i64,
    pub this_month: i64,
    /// Consecutive days with at least one check-in, ending today or
    /// yesterday; 0 once a full day is skipped.
    pub streak_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busiest_slot: Option<String>,
}

pub fn teacher_history(records: &[MealRecord], today: NaiveDate) -> TeacherHistory {
    let mut days = BTreeSet::new();
    let mut today_count = 0;
    let mut week_count = 0;
    let mut month_count = 0;
    let mut by_hour: BTreeMap<u32, i64> = BTreeMap::new();

    for record in records {
        let Ok(day) = NaiveDate::parse_from_str(&record.date, "%Y-%m-%d") else {
            continue;
        };
        days.insert(day);
        if day == today {
            today_count += 1;
        }
        if day.iso_week() == today.iso_week() {
            week_count += 1;
        }
        if day.year() == today.year() && day.month() == today.month() {
            month_count += 1;
        }
        if let Ok(t) = DateTime::parse_from_rfc3339(&record.registered_at) {
            // Wall-clock hour in the offset the record was written with.
            *by_hour.entry(t.hour()).or_insert(0) += 1;
        }
    }

    let busiest_slot = by_hour
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(hour, _)| format!("{:02}:00-{:02}:00", hour, (hour + 1) % 24));

    TeacherHistory {
        total: records.len() as i64,
        today: today_count,
        this_week: week_count,
        this_month: month_count,
        streak_days: streak(&days, today),
        busiest_slot,
    }
}

fn streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> i64 {
    let mut cursor = if days.contains(&today) {
        today
    } else {
        let Some(yesterday) = today.pred_opt() else {
            return 0;
        };
        yesterday
    };
    let mut count = 0;
    while days.contains(&cursor) {
        count += 1;
        let Some(prev) = cursor.pred_opt() else {
            break;
        };
        cursor = prev;
    }
    count
}
