//! Reactive record store.
//!
//! Zones, attendance events and permission requests are persisted as
//! individual JSON documents in three logical collections. Every successful
//! write is published on the collection's change feed, so any component (or
//! an SSE client through the HTTP layer) can follow the collection live.

mod memory;
mod mysql;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use tokio::sync::broadcast;

pub use memory::InMemoryStore;
pub use mysql::MySqlStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Collection {
    Zones,
    Attendance,
    Permissions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: String,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeEvent {
    Upserted { collection: Collection, record: Record },
    Deleted { collection: Collection, id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record {collection}/{id} already exists")]
    Duplicate { collection: Collection, id: String },

    #[error("record {collection}/{id} does not exist")]
    Missing { collection: Collection, id: String },

    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored record is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records of a collection in insertion order.
    async fn load(&self, collection: Collection) -> Result<Vec<Record>, StoreError>;

    /// Creates or replaces a single record.
    async fn put(&self, collection: Collection, id: &str, body: &Value) -> Result<(), StoreError>;

    /// Inserts a record that must not exist yet.
    async fn append(&self, collection: Collection, id: &str, body: &Value) -> Result<(), StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    /// Live changes of one collection, starting from the next write.
    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeEvent>;
}

/// Per-collection broadcast channels shared by the store backends.
#[derive(Debug)]
pub struct ChangeFeed {
    channels: HashMap<Collection, broadcast::Sender<ChangeEvent>>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let channels = Collection::iter()
            .map(|collection| (collection, broadcast::channel(capacity.max(1)).0))
            .collect();
        Self { channels }
    }

    pub fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeEvent> {
        self.sender(collection).subscribe()
    }

    pub fn upserted(&self, collection: Collection, id: &str, body: &Value) {
        self.publish(ChangeEvent::Upserted {
            collection,
            record: Record {
                id: id.to_string(),
                body: body.clone(),
            },
        });
    }

    pub fn deleted(&self, collection: Collection, id: &str) {
        self.publish(ChangeEvent::Deleted {
            collection,
            id: id.to_string(),
        });
    }

    fn publish(&self, event: ChangeEvent) {
        let collection = match &event {
            ChangeEvent::Upserted { collection, .. } | ChangeEvent::Deleted { collection, .. } => {
                *collection
            }
        };
        // no subscribers is not an error
        let _ = self.sender(collection).send(event);
    }

    fn sender(&self, collection: Collection) -> &broadcast::Sender<ChangeEvent> {
        // every variant is inserted in `new`
        &self.channels[&collection]
    }
}

/// Store wrappers for engine tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::{Notify, Semaphore, broadcast};

    use super::{ChangeEvent, Collection, InMemoryStore, Record, RecordStore, StoreError};

    /// Writes block while the gate is held, so a test can keep a roster
    /// write in flight for as long as it likes.
    pub struct GatedStore {
        inner: InMemoryStore,
        held: AtomicBool,
        gate: Semaphore,
        pub entered: Notify,
    }

    impl GatedStore {
        pub fn new() -> Self {
            Self {
                inner: InMemoryStore::default(),
                held: AtomicBool::new(false),
                gate: Semaphore::new(0),
                entered: Notify::new(),
            }
        }

        pub fn hold(&self) {
            self.held.store(true, Ordering::SeqCst);
        }

        pub fn release(&self) {
            self.held.store(false, Ordering::SeqCst);
            self.gate.add_permits(1);
        }

        async fn wait_gate(&self) {
            if self.held.load(Ordering::SeqCst) {
                self.entered.notify_one();
                let _permit = self.gate.acquire().await.unwrap();
            }
        }
    }

    #[async_trait]
    impl RecordStore for GatedStore {
        async fn load(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
            self.inner.load(collection).await
        }

        async fn put(&self, collection: Collection, id: &str, body: &Value) -> Result<(), StoreError> {
            self.wait_gate().await;
            self.inner.put(collection, id, body).await
        }

        async fn append(&self, collection: Collection, id: &str, body: &Value) -> Result<(), StoreError> {
            self.wait_gate().await;
            self.inner.append(collection, id, body).await
        }

        async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
            self.wait_gate().await;
            self.inner.delete(collection, id).await
        }

        fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeEvent> {
            self.inner.subscribe(collection)
        }
    }
}
