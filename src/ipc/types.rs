use std::path::PathBuf;
use std::sync::mpsc::Receiver;

use serde::Deserialize;

use crate::events::{ChangeBus, ChangeEvent};
use crate::store::Store;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub data_dir: Option<PathBuf>,
    pub store: Option<Store>,
    pub bus: ChangeBus,
    /// The daemon's own bus subscription, drained by `events.drain`.
    pub changes: Option<Receiver<ChangeEvent>>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            data_dir: None,
            store: None,
            bus: ChangeBus::default(),
            changes: None,
        }
    }
}
