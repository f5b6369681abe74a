use anyhow::Context;
use rusqlite::Connection;
use serde_json::Value;
use tracing::info;

use crate::schema::{self, CollectionSpec};
use crate::store::{self, StoreError};

/// One version bump: every rewrite visits a snapshot of its collection
/// and conditionally rewrites records. Collection/index creation is not
/// listed here; the store creates anything missing on every open.
struct Migration {
    version: u32,
    rewrites: &'static [Rewrite],
}

struct Rewrite {
    collection: &'static CollectionSpec,
    transform: fn(&mut Value) -> bool,
}

const MIGRATIONS: &[Migration] = &[
    // v1: initial collections (teachers, grades, meal_records). No row
    // rewrites; the tables themselves come from ensure_collections.
    Migration {
        version: 1,
        rewrites: &[],
    },
    // v2: menu_entries and student_attendance appear; legacy grade
    // records get their category spelling and schedule window fixed.
    Migration {
        version: 2,
        rewrites: &[
            Rewrite {
                collection: &schema::GRADES,
                transform: grade_rename_especiales,
            },
            Rewrite {
                collection: &schema::GRADES,
                transform: grade_backfill_schedule,
            },
        ],
    },
    // v3: teachers gain role/isActive; grades with no category are
    // classified once from their name. From here on the category field
    // is the only source of truth.
    Migration {
        version: 3,
        rewrites: &[
            Rewrite {
                collection: &schema::TEACHERS,
                transform: teacher_backfill_flags,
            },
            Rewrite {
                collection: &schema::GRADES,
                transform: grade_classify_category,
            },
        ],
    },
];

/// Bring `PRAGMA user_version` up to [`schema::SCHEMA_VERSION`], running
/// each pending version inside its own transaction. Failure rolls the
/// transaction back, leaves the version counter where it was, and is
/// safe to retry on the next open.
pub fn run(conn: &Connection) -> Result<(), StoreError> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    let current = current.max(0) as u32;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        apply(conn, migration).map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("{e:#}"),
        })?;
        info!(version = migration.version, "schema migrated");
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    for rewrite in migration.rewrites {
        let mut stmt = tx.prepare(&format!(
            "SELECT id, body FROM {} ORDER BY rowid",
            rewrite.collection.name
        ))?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (id, body) in rows {
            let mut value: Value = serde_json::from_str(&body)
                .with_context(|| format!("record {} in {}", id, rewrite.collection.name))?;
            if (rewrite.transform)(&mut value) {
                let enc = store::encode_value(rewrite.collection, &value)?;
                store::write_body(&tx, rewrite.collection, &enc)?;
            }
        }
    }
    tx.pragma_update(None, "user_version", migration.version)?;
    tx.commit()?;
    Ok(())
}

// --- row transforms -------------------------------------------------------
//
// Each is total over one record and idempotent: a second application is a
// no-op, so a crash between write-back and the version bump cannot corrupt
// data on retry.

fn grade_rename_especiales(value: &mut Value) -> bool {
    let Some(obj) = value.as_object_mut() else {
        return false;
    };
    match obj.get("category").and_then(|v| v.as_str()) {
        Some("especiales") => {
            obj.insert(
                "category".into(),
                Value::String(crate::models::CATEGORY_MODALIDAD_TECNICA.into()),
            );
            true
        }
        _ => false,
    }
}

fn grade_backfill_schedule(value: &mut Value) -> bool {
    let Some(obj) = value.as_object_mut() else {
        return false;
    };
    let mut changed = false;
    for (field, default) in [("scheduleStart", "12:00"), ("scheduleEnd", "12:30")] {
        let missing = match obj.get(field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if missing {
            obj.insert(field.into(), Value::String(default.into()));
            changed = true;
        }
    }
    changed
}

fn teacher_backfill_flags(value: &mut Value) -> bool {
    let Some(obj) = value.as_object_mut() else {
        return false;
    };
    let mut changed = false;
    if obj.get("role").and_then(|v| v.as_str()).is_none() {
        obj.insert("role".into(), Value::String("teacher".into()));
        changed = true;
    }
    if obj.get("isActive").and_then(|v| v.as_bool()).is_none() {
        obj.insert("isActive".into(), Value::Bool(true));
        changed = true;
    }
    changed
}

fn grade_classify_category(value: &mut Value) -> bool {
    let Some(obj) = value.as_object_mut() else {
        return false;
    };
    let present = obj
        .get("category")
        .and_then(|v| v.as_str())
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    if present {
        return false;
    }
    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    obj.insert(
        "category".into(),
        Value::String(classify_grade_name(&name).into()),
    );
    true
}

/// Legacy stores carried grades without a cycle tag; this assigns one
/// from the naming conventions those stores used ("Jardín", "5A",
/// "Once B", "Media Técnica"...).
pub(crate) fn classify_grade_name(name: &str) -> &'static str {
    let n = name.to_lowercase();

    if ["jardin", "jardín", "transicion", "transición", "preescolar", "parvulos", "párvulos"]
        .iter()
        .any(|k| n.contains(k))
    {
        return crate::models::CATEGORY_PREESCOLAR;
    }
    if n.contains("tecnic") || n.contains("técnic") {
        return crate::models::CATEGORY_MODALIDAD_TECNICA;
    }
    if let Some(num) = first_number(&n) {
        return match num {
            1..=5 => crate::models::CATEGORY_PRIMARIA,
            6..=9 => crate::models::CATEGORY_SECUNDARIA,
            10 | 11 => crate::models::CATEGORY_MEDIA,
            _ => crate::models::CATEGORY_PRIMARIA,
        };
    }
    if ["primero", "segundo", "tercero", "cuarto", "quinto"]
        .iter()
        .any(|k| n.contains(k))
    {
        return crate::models::CATEGORY_PRIMARIA;
    }
    if ["sexto", "septimo", "séptimo", "octavo", "noveno"]
        .iter()
        .any(|k| n.contains(k))
    {
        return crate::models::CATEGORY_SECUNDARIA;
    }
    if ["decimo", "décimo", "once"].iter().any(|k| n.contains(k)) {
        return crate::models::CATEGORY_MEDIA;
    }
    crate::models::CATEGORY_PRIMARIA
}

fn first_number(s: &str) -> Option<u32> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
