use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Customers,
    Inventory,
    Invoices,
    InvoiceItems,
    Profiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Something in `collection` changed; listeners re-read what they show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Change {
    pub collection: Collection,
    pub kind: ChangeKind,
}

/// Fan-out of store writes to any number of listeners.
///
/// Slow listeners may miss events (`RecvError::Lagged`); since every event
/// means "re-fetch", a lagged listener just re-fetches once.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Change>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, collection: Collection, kind: ChangeKind) {
        // No listeners is fine
        let _ = self.tx.send(Change { collection, kind });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(64)
    }
}
