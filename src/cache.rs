// Snapshot cache port
//
// A snapshot holds the raw wire items of the catalog collections. Derived
// data (decoded payloads, the trait index) is never cached; it is rebuilt
// from the snapshot on every load.

use crate::record::{Collection, Record};
use crate::source::records_from_items;
use eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Default key the catalog is cached under
pub const CATALOG_KEY: &str = "catalog";

/// Raw items per collection plus the time they were fetched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Milliseconds since epoch
    pub fetched_at: i64,
    pub collections: BTreeMap<Collection, Vec<Value>>,
}

impl Snapshot {
    pub fn new(fetched_at: i64) -> Self {
        Self {
            fetched_at,
            collections: BTreeMap::new(),
        }
    }

    /// Store the wire form of `records` under `collection`
    pub fn insert_records(&mut self, collection: Collection, records: &[Record]) {
        self.collections
            .insert(collection, records.iter().map(Record::to_item).collect());
    }

    /// Records for `collection`; an absent collection yields none
    pub fn records(&self, collection: Collection) -> Result<Vec<Record>> {
        match self.collections.get(&collection) {
            Some(items) => records_from_items(collection, Value::Array(items.clone())),
            None => Ok(Vec::new()),
        }
    }

    /// Age relative to `now_ms`, clamped at zero
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.fetched_at).max(0)
    }
}

/// Keyed storage for snapshots
pub trait SnapshotCache {
    fn get(&self, key: &str) -> Result<Option<Snapshot>>;

    fn put(&mut self, key: &str, snapshot: &Snapshot) -> Result<()>;

    /// Remove a snapshot; returns whether one was stored
    fn remove(&mut self, key: &str) -> Result<bool>;
}

/// In-process snapshot cache
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: HashMap<String, Snapshot>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SnapshotCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, snapshot: &Snapshot) -> Result<()> {
        self.entries.insert(key.to_string(), snapshot.clone());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}
