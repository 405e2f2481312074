use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{ChangeEvent, ChangeFeed, Collection, Record, RecordStore, StoreError};

type Documents = HashMap<String, (u64, Value)>;

/// Process-local store. Data lives as long as the process.
#[derive(Debug)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<Collection, Documents>>,
    seq: AtomicU64,
    feed: ChangeFeed,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new(feed_capacity: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            feed: ChangeFeed::new(feed_capacity),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulates an outage: every write fails with `StoreError::Unavailable`
    /// until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store switched off".into()))
        } else {
            Ok(())
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn load(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        let collections = self.collections.read();
        let mut docs: Vec<(u64, Record)> = collections
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, (seq, body))| {
                        (
                            *seq,
                            Record {
                                id: id.clone(),
                                body: body.clone(),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        docs.sort_by_key(|(seq, _)| *seq);
        Ok(docs.into_iter().map(|(_, record)| record).collect())
    }

    async fn put(&self, collection: Collection, id: &str, body: &Value) -> Result<(), StoreError> {
        self.check_available()?;
        {
            let mut collections = self.collections.write();
            let docs = collections.entry(collection).or_default();
            match docs.get_mut(id) {
                Some((_, existing)) => *existing = body.clone(),
                None => {
                    docs.insert(id.to_string(), (self.next_seq(), body.clone()));
                }
            }
        }
        self.feed.upserted(collection, id, body);
        Ok(())
    }

    async fn append(&self, collection: Collection, id: &str, body: &Value) -> Result<(), StoreError> {
        self.check_available()?;
        {
            let mut collections = self.collections.write();
            let docs = collections.entry(collection).or_default();
            if docs.contains_key(id) {
                return Err(StoreError::Duplicate {
                    collection,
                    id: id.to_string(),
                });
            }
            docs.insert(id.to_string(), (self.next_seq(), body.clone()));
        }
        self.feed.upserted(collection, id, body);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let removed = self
            .collections
            .write()
            .get_mut(&collection)
            .and_then(|docs| docs.remove(id));
        if removed.is_none() {
            return Err(StoreError::Missing {
                collection,
                id: id.to_string(),
            });
        }
        self.feed.deleted(collection, id);
        Ok(())
    }

    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe(collection)
    }
}
