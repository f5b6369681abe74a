use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::events::{ChangeEvent, ChangeKind};
use crate::guard;
use crate::ipc::error::ok;
use crate::ipc::helpers::{no_store, optional_str, required_str, Fail, HandlerError};
use crate::ipc::types::{AppState, Request};
use crate::models::MenuEntry;
use crate::schema;
use crate::store::Store;

struct Saved {
    entry: MenuEntry,
    created: bool,
}

fn check_date(date: &str) -> Result<(), Fail> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| Fail::new("bad_params", "date must be YYYY-MM-DD"))
}

/// One entry per calendar date: create-or-update keyed on the unique
/// date index. Absent fields keep their current value on update.
fn upsert(store: &Store, params: &serde_json::Value) -> Result<Saved, HandlerError> {
    let date = required_str(params, "date")?;
    check_date(&date)?;

    let existing: Vec<MenuEntry> = store.get_by_index(&schema::MENU_ENTRIES, "date", &date)?;
    let mut entry = existing.into_iter().next().unwrap_or_else(|| MenuEntry {
        id: Uuid::new_v4().to_string(),
        date: date.clone(),
        starter: String::new(),
        main_dish: String::new(),
        dessert: String::new(),
        drink: String::new(),
        notes: String::new(),
        updated_at: String::new(),
    });
    let created = entry.updated_at.is_empty();

    if let Some(v) = optional_str(params, "starter") {
        entry.starter = v;
    }
    if let Some(v) = optional_str(params, "mainDish") {
        entry.main_dish = v;
    }
    if let Some(v) = optional_str(params, "dessert") {
        entry.dessert = v;
    }
    if let Some(v) = optional_str(params, "drink") {
        entry.drink = v;
    }
    if let Some(v) = optional_str(params, "notes") {
        entry.notes = v;
    }
    entry.updated_at = guard::timestamp(Utc::now());

    if created {
        store.insert(&schema::MENU_ENTRIES, &entry)?;
    } else {
        store.update(&schema::MENU_ENTRIES, &entry)?;
    }
    Ok(Saved { entry, created })
}

fn handle_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match upsert(store, &req.params) {
        Ok(saved) => {
            state.bus.publish(ChangeEvent {
                collection: schema::MENU_ENTRIES.name,
                kind: if saved.created {
                    ChangeKind::Inserted
                } else {
                    ChangeKind::Updated
                },
                id: Some(saved.entry.id.clone()),
            });
            ok(
                &req.id,
                json!({ "entry": saved.entry, "created": saved.created }),
            )
        }
        Err(e) => e.response(&req.id),
    }
}

fn handle_get_by_date(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    let date = match required_str(&req.params, "date") {
        Ok(v) => v,
        Err(f) => return HandlerError::Fail(f).response(&req.id),
    };
    match store.get_by_index::<MenuEntry>(&schema::MENU_ENTRIES, "date", &date) {
        Ok(entries) => ok(&req.id, json!({ "entry": entries.into_iter().next() })),
        Err(e) => HandlerError::Store(e).response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return no_store(&req.id);
    };
    match store.get_all::<MenuEntry>(&schema::MENU_ENTRIES) {
        Ok(mut entries) => {
            entries.sort_by(|a, b| a.date.cmp(&b.date));
            ok(&req.id, json!({ "entries": entries }))
        }
        Err(e) => HandlerError::Store(e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "menu.upsert" => Some(handle_upsert(state, req)),
        "menu.getByDate" => Some(handle_get_by_date(state, req)),
        "menu.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
