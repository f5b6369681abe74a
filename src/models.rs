use serde::{Deserialize, Serialize};

/// Cycle tags a grade can carry. Legacy stores used other spellings
/// ("especiales"); migrations rewrite those, so `Grade.category` stays a
/// plain string and these are the values current code writes.
pub const CATEGORY_PREESCOLAR: &str = "preescolar";
pub const CATEGORY_PRIMARIA: &str = "primaria";
pub const CATEGORY_SECUNDARIA: &str = "secundaria";
pub const CATEGORY_MEDIA: &str = "media";
pub const CATEGORY_MODALIDAD_TECNICA: &str = "modalidad_tecnica";

pub const CATEGORIES: &[&str] = &[
    CATEGORY_PREESCOLAR,
    CATEGORY_PRIMARIA,
    CATEGORY_SECUNDARIA,
    CATEGORY_MEDIA,
    CATEGORY_MODALIDAD_TECNICA,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Admin,
}

impl Default for Role {
    fn default() -> Self {
        Role::Teacher
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Salted one-way hash, `salt$hexdigest`. Never leaves the store.
    pub password_hash: String,
    pub personal_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_group: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    /// Wall-clock "HH:MM", minute resolution.
    pub schedule_start: String,
    pub schedule_end: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealStatus {
    Registered,
    Eating,
    Finished,
}

/// One teacher's attendance event for one group on one day.
///
/// `status` is a cache written at check-in and meal-start; read paths
/// recompute the live value from `entered_at` plus the grade window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealRecord {
    pub id: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub teacher_code: String,
    /// Grade name at check-in time.
    pub group: String,
    /// RFC 3339, UTC.
    pub registered_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entered_at: Option<String>,
    pub status: MealStatus,
    /// Local calendar day, "YYYY-MM-DD".
    pub date: String,
}

/// Grade-level head-count snapshot, keyed (teacherId, gradeId, date) at
/// the application layer. Saves for an existing key update in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendanceRecord {
    pub id: String,
    pub teacher_id: String,
    pub grade_id: String,
    pub date: String,
    pub students_present: i64,
    pub students_eating: i64,
    pub students_not_eating: i64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuEntry {
    pub id: String,
    /// One entry per calendar date.
    pub date: String,
    #[serde(default)]
    pub starter: String,
    #[serde(default)]
    pub main_dish: String,
    #[serde(default)]
    pub dessert: String,
    #[serde(default)]
    pub drink: String,
    #[serde(default)]
    pub notes: String,
    pub updated_at: String,
}
