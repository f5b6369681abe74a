use std::path::PathBuf;

use serde_json::json;
use tracing::warn;

use crate::events::{ChangeEvent, ChangeKind};
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::types::{AppState, Request};
use crate::schema;
use crate::store::{Store, StoreError};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "dataDir": state.data_dir.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_store_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = path else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match Store::open(&path) {
        Ok(store) => {
            state.data_dir = Some(path.clone());
            state.store = Some(store);
            state.changes = Some(state.bus.subscribe());
            ok(
                &req.id,
                json!({
                    "dataDir": path.to_string_lossy(),
                    "schemaVersion": schema::SCHEMA_VERSION
                }),
            )
        }
        Err(e @ StoreError::Migration { .. }) => store_err(&req.id, &e),
        Err(e) => err(&req.id, "db_open_failed", e.to_string(), None),
    }
}

fn handle_factory_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_store", "open a data directory first", None);
    };
    warn!("factory reset requested");
    if let Err(e) = store.factory_reset() {
        return store_err(&req.id, &e);
    }
    for spec in schema::ALL {
        state.bus.publish(ChangeEvent {
            collection: spec.name,
            kind: ChangeKind::Reset,
            id: None,
        });
    }
    ok(&req.id, json!({ "reset": true }))
}

fn handle_events_drain(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(changes) = state.changes.as_ref() else {
        return ok(&req.id, json!({ "events": [] }));
    };
    let mut events = Vec::new();
    while let Ok(event) = changes.try_recv() {
        events.push(serde_json::to_value(&event).unwrap_or(json!(null)));
    }
    ok(&req.id, json!({ "events": events }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "store.open" => Some(handle_store_open(state, req)),
        "store.factoryReset" => Some(handle_factory_reset(state, req)),
        "events.drain" => Some(handle_events_drain(state, req)),
        _ => None,
    }
}
