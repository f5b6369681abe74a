use std::path::Path;

use rusqlite::{params_from_iter, types::Value as SqlValue, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::migrate;
use crate::schema::{self, CollectionSpec};

pub const DB_FILE: &str = "comedor.sqlite3";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated on {field}")]
    ConstraintViolation { field: String },
    #[error("record not found")]
    NotFound,
    #[error("payload cannot be stored: {0}")]
    Serialization(String),
    #[error("migration to version {version} failed: {message}")]
    Migration { version: u32, message: String },
    #[error(transparent)]
    Backend(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Handle to the embedded record store. Created once at open time and
/// threaded through every operation; there is no hidden global.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the store inside `dir`, then bring the schema up
    /// to [`schema::SCHEMA_VERSION`]. A failed migration leaves the
    /// stored version untouched and the open fails.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join(DB_FILE))?;
        let store = Store { conn };
        store.ensure_collections()?;
        migrate::run(&store.conn)?;
        info!(path = %dir.display(), "store opened");
        Ok(store)
    }

    /// In-memory store, fully migrated. Test-friendly but also what a
    /// scratch/demo session uses.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Store { conn };
        store.ensure_collections()?;
        migrate::run(&store.conn)?;
        Ok(store)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create any missing collection table or index. Runs on every open,
    /// before row-level migrations, so collections introduced by a
    /// version bump exist regardless of what the row migrations do.
    fn ensure_collections(&self) -> Result<(), StoreError> {
        for spec in schema::ALL {
            let cols: String = spec
                .indexes
                .iter()
                .map(|i| format!(", {} TEXT", i.column))
                .collect();
            self.conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {}(id TEXT PRIMARY KEY, body TEXT NOT NULL{})",
                    spec.name, cols
                ),
                [],
            )?;

            // Tables created by an older build may predate some mirror
            // columns. Add every missing one before backfilling, since the
            // backfill rewrites all of a record's index columns at once.
            let mut added = false;
            for idx in spec.indexes {
                if !table_has_column(&self.conn, spec.name, idx.column)? {
                    self.conn.execute(
                        &format!("ALTER TABLE {} ADD COLUMN {} TEXT", spec.name, idx.column),
                        [],
                    )?;
                    added = true;
                }
            }
            if added {
                backfill_index_columns(&self.conn, spec)?;
            }

            for idx in spec.indexes {
                let kind = if idx.unique { "UNIQUE INDEX" } else { "INDEX" };
                self.conn.execute(
                    &format!(
                        "CREATE {} IF NOT EXISTS idx_{}_{} ON {}({})",
                        kind, spec.name, idx.column, spec.name, idx.column
                    ),
                    [],
                )?;
            }
        }
        Ok(())
    }

    pub fn insert<T: Serialize>(
        &self,
        spec: &CollectionSpec,
        record: &T,
    ) -> Result<(), StoreError> {
        let enc = encode(spec, record)?;
        let placeholders: String = std::iter::repeat("?")
            .take(2 + spec.indexes.len())
            .collect::<Vec<_>>()
            .join(", ");
        let cols: String = spec
            .indexes
            .iter()
            .map(|i| format!(", {}", i.column))
            .collect();
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {}(id, body{}) VALUES({})",
                    spec.name, cols, placeholders
                ),
                params_from_iter(enc.params()),
            )
            .map_err(|e| map_constraint(spec, e))?;
        Ok(())
    }

    pub fn get_by_id<T: DeserializeOwned>(
        &self,
        spec: &CollectionSpec,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let body: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT body FROM {} WHERE id = ?", spec.name),
                [id],
                |r| r.get(0),
            )
            .optional()?;
        body.map(|b| decode(&b)).transpose()
    }

    pub fn get_by_index<T: DeserializeOwned>(
        &self,
        spec: &CollectionSpec,
        field: &str,
        value: &str,
    ) -> Result<Vec<T>, StoreError> {
        let idx = spec
            .index(field)
            .ok_or_else(|| StoreError::Backend(rusqlite::Error::InvalidColumnName(field.into())))?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT body FROM {} WHERE {} = ? ORDER BY rowid",
            spec.name, idx.column
        ))?;
        let bodies = stmt
            .query_map([value], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        bodies.iter().map(|b| decode(b)).collect()
    }

    /// Cheaper than `get_by_index` when only presence matters (the
    /// identifier generator probes the live index on every attempt).
    pub fn exists_by_index(
        &self,
        spec: &CollectionSpec,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let idx = spec
            .index(field)
            .ok_or_else(|| StoreError::Backend(rusqlite::Error::InvalidColumnName(field.into())))?;
        let found: Option<i64> = self
            .conn
            .query_row(
                &format!(
                    "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
                    spec.name, idx.column
                ),
                [value],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_all<T: DeserializeOwned>(&self, spec: &CollectionSpec) -> Result<Vec<T>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT body FROM {} ORDER BY rowid", spec.name))?;
        let bodies = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        bodies.iter().map(|b| decode(b)).collect()
    }

    pub fn update<T: Serialize>(
        &self,
        spec: &CollectionSpec,
        record: &T,
    ) -> Result<(), StoreError> {
        let enc = encode(spec, record)?;
        let n = write_body(&self.conn, spec, &enc).map_err(|e| map_constraint(spec, e))?;
        if n == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn delete(&self, spec: &CollectionSpec, id: &str) -> Result<(), StoreError> {
        let n = self
            .conn
            .execute(&format!("DELETE FROM {} WHERE id = ?", spec.name), [id])?;
        if n == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn count(&self, spec: &CollectionSpec) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", spec.name), [], |r| {
                r.get(0)
            })?)
    }

    /// Destructive administrative action: clear every collection and
    /// rewind the version counter, as one transaction, then re-run the
    /// (now trivial) migration pipeline so the store is usable again.
    pub fn factory_reset(&self) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        for spec in schema::ALL {
            tx.execute(&format!("DELETE FROM {}", spec.name), [])?;
        }
        tx.pragma_update(None, "user_version", 0)?;
        tx.commit()?;
        migrate::run(&self.conn)?;
        info!("factory reset complete");
        Ok(())
    }
}

pub(crate) struct EncodedRecord {
    pub id: String,
    pub body: String,
    pub index_values: Vec<Option<String>>,
}

impl EncodedRecord {
    fn params(&self) -> Vec<SqlValue> {
        let mut out = vec![
            SqlValue::Text(self.id.clone()),
            SqlValue::Text(self.body.clone()),
        ];
        for v in &self.index_values {
            out.push(match v {
                Some(s) => SqlValue::Text(s.clone()),
                None => SqlValue::Null,
            });
        }
        out
    }
}

/// Every stored value must encode to a plain JSON object carrying a
/// string `id`. Anything else is a contract violation by the caller.
pub(crate) fn encode<T: Serialize>(
    spec: &CollectionSpec,
    record: &T,
) -> Result<EncodedRecord, StoreError> {
    let value =
        serde_json::to_value(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    encode_value(spec, &value)
}

pub(crate) fn encode_value(
    spec: &CollectionSpec,
    value: &Value,
) -> Result<EncodedRecord, StoreError> {
    let obj = value
        .as_object()
        .ok_or_else(|| StoreError::Serialization("record must be a JSON object".into()))?;
    let id = obj
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| StoreError::Serialization("record must carry a string id".into()))?
        .to_string();
    let index_values = spec
        .indexes
        .iter()
        .map(|i| index_value(obj.get(i.field)))
        .collect();
    let body =
        serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(EncodedRecord {
        id,
        body,
        index_values,
    })
}

fn index_value(v: Option<&Value>) -> Option<String> {
    match v {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// UPDATE body + mirrored index columns for an already-encoded record.
/// Shared with the migrator's write-back path. Returns affected rows.
pub(crate) fn write_body(
    conn: &Connection,
    spec: &CollectionSpec,
    enc: &EncodedRecord,
) -> rusqlite::Result<usize> {
    let sets: String = spec
        .indexes
        .iter()
        .map(|i| format!(", {} = ?", i.column))
        .collect();
    let mut params = vec![SqlValue::Text(enc.body.clone())];
    for v in &enc.index_values {
        params.push(match v {
            Some(s) => SqlValue::Text(s.clone()),
            None => SqlValue::Null,
        });
    }
    params.push(SqlValue::Text(enc.id.clone()));
    conn.execute(
        &format!("UPDATE {} SET body = ?{} WHERE id = ?", spec.name, sets),
        params_from_iter(params),
    )
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Translate SQLite's unique-constraint failure into the taxonomy error
/// naming the offending record field, via the declared index table.
fn map_constraint(spec: &CollectionSpec, e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ffi, Some(msg)) = &e {
        if ffi.code == rusqlite::ErrorCode::ConstraintViolation {
            for idx in spec.indexes {
                if msg.contains(&format!("{}.{}", spec.name, idx.column)) {
                    return StoreError::ConstraintViolation {
                        field: idx.field.to_string(),
                    };
                }
            }
            if msg.contains(&format!("{}.id", spec.name)) {
                return StoreError::ConstraintViolation { field: "id".into() };
            }
        }
    }
    StoreError::Backend(e)
}

/// Re-extract every index column from the stored bodies.
fn backfill_index_columns(conn: &Connection, spec: &CollectionSpec) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT body FROM {}", spec.name))?;
    let rows = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for body in rows {
        let value: Value =
            serde_json::from_str(&body).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let enc = encode_value(spec, &value)?;
        write_body(conn, spec, &enc)?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, Teacher};
    use serde_json::json;

    fn teacher(id: &str, email: &str, code: &str) -> Teacher {
        Teacher {
            id: id.to_string(),
            name: "Ana".to_string(),
            email: email.to_string(),
            password_hash: "s$h".to_string(),
            personal_code: code.to_string(),
            assigned_group: None,
            role: Role::Teacher,
            is_active: true,
            created_at: "2026-08-04T12:00:00Z".to_string(),
            updated_at: "2026-08-04T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn insert_and_read_back_roundtrip() {
        let store = Store::open_in_memory().expect("open");
        store
            .insert(&schema::TEACHERS, &teacher("t1", "a@x.com", "AAAAAA"))
            .expect("insert");

        let got: Teacher = store
            .get_by_id(&schema::TEACHERS, "t1")
            .expect("get")
            .expect("present");
        assert_eq!(got.email, "a@x.com");

        let by_email: Vec<Teacher> = store
            .get_by_index(&schema::TEACHERS, "email", "a@x.com")
            .expect("index lookup");
        assert_eq!(by_email.len(), 1);
        assert_eq!(by_email[0].id, "t1");
    }

    #[test]
    fn duplicate_email_names_the_field_and_keeps_store_unchanged() {
        let store = Store::open_in_memory().expect("open");
        store
            .insert(&schema::TEACHERS, &teacher("t1", "a@x.com", "AAAAAA"))
            .expect("first insert");

        let err = store
            .insert(&schema::TEACHERS, &teacher("t2", "a@x.com", "BBBBBB"))
            .expect_err("duplicate email must fail");
        match err {
            StoreError::ConstraintViolation { field } => assert_eq!(field, "email"),
            other => panic!("expected constraint violation, got {other:?}"),
        }
        assert_eq!(store.count(&schema::TEACHERS).expect("count"), 1);
    }

    #[test]
    fn duplicate_personal_code_is_rejected() {
        let store = Store::open_in_memory().expect("open");
        store
            .insert(&schema::TEACHERS, &teacher("t1", "a@x.com", "AAAAAA"))
            .expect("first insert");
        let err = store
            .insert(&schema::TEACHERS, &teacher("t2", "b@x.com", "AAAAAA"))
            .expect_err("duplicate code must fail");
        match err {
            StoreError::ConstraintViolation { field } => assert_eq!(field, "personalCode"),
            other => panic!("expected constraint violation, got {other:?}"),
        }
    }

    #[test]
    fn update_missing_id_is_not_found() {
        let store = Store::open_in_memory().expect("open");
        let err = store
            .update(&schema::TEACHERS, &teacher("ghost", "g@x.com", "CCCCCC"))
            .expect_err("update of absent id");
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn delete_missing_id_is_not_found() {
        let store = Store::open_in_memory().expect("open");
        let err = store
            .delete(&schema::TEACHERS, "ghost")
            .expect_err("delete of absent id");
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn non_object_payload_is_a_serialization_error() {
        let store = Store::open_in_memory().expect("open");
        let err = store
            .insert(&schema::TEACHERS, &json!(42))
            .expect_err("non-object payload");
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn payload_without_id_is_a_serialization_error() {
        let store = Store::open_in_memory().expect("open");
        let err = store
            .insert(&schema::TEACHERS, &json!({ "email": "a@x.com" }))
            .expect_err("payload without id");
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn update_reindexes_mirror_columns() {
        let store = Store::open_in_memory().expect("open");
        let mut t = teacher("t1", "a@x.com", "AAAAAA");
        store.insert(&schema::TEACHERS, &t).expect("insert");

        t.email = "new@x.com".to_string();
        store.update(&schema::TEACHERS, &t).expect("update");

        let old: Vec<Teacher> = store
            .get_by_index(&schema::TEACHERS, "email", "a@x.com")
            .expect("lookup old");
        assert!(old.is_empty());
        let new: Vec<Teacher> = store
            .get_by_index(&schema::TEACHERS, "email", "new@x.com")
            .expect("lookup new");
        assert_eq!(new.len(), 1);
    }

    #[test]
    fn factory_reset_clears_collections_and_remigrates() {
        let store = Store::open_in_memory().expect("open");
        store
            .insert(&schema::TEACHERS, &teacher("t1", "a@x.com", "AAAAAA"))
            .expect("insert");
        store.factory_reset().expect("reset");
        assert_eq!(store.count(&schema::TEACHERS).expect("count"), 0);

        let version: i64 = store
            .connection()
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .expect("user_version");
        assert_eq!(version as u32, schema::SCHEMA_VERSION);

        // Store stays usable after the reset.
        store
            .insert(&schema::TEACHERS, &teacher("t2", "b@x.com", "BBBBBB"))
            .expect("insert after reset");
    }
}
