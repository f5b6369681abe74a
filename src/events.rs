use std::sync::mpsc::{channel, Receiver, Sender};

use serde::Serialize;

/// Typed "collection changed" notification, published by the surface
/// layer after a successful write. The store itself stays silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
    Reset,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub collection: &'static str,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Observer registry over plain channels. Consumers subscribe and
/// unsubscribe by dropping their receiver; dead subscribers are pruned
/// on the next publish.
#[derive(Default)]
pub struct ChangeBus {
    subscribers: Vec<Sender<ChangeEvent>>,
}

impl ChangeBus {
    pub fn subscribe(&mut self) -> Receiver<ChangeEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: ChangeEvent) {
        self.subscribers.retain(|s| s.send(event.clone()).is_ok());
    }
}
