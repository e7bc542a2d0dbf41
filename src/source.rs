// Data-access layer: where raw records come from

use crate::jsonl;
use crate::record::{Collection, Record};
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Fetches every record of a collection
pub trait RecordSource {
    fn fetch_all(&self, collection: Collection) -> Result<Vec<Record>>;
}

/// Response envelope of the CRUD API's list endpoint
#[derive(Debug, Deserialize)]
struct ItemsEnvelope {
    #[serde(rename = "Items", default)]
    items: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Convert a list of wire items into records
///
/// A non-array input is a contract violation and fails the call. Elements
/// that are not objects are skipped with a warning.
pub fn records_from_items(collection: Collection, items: Value) -> Result<Vec<Record>> {
    let Value::Array(items) = items else {
        return Err(eyre!("Expected an array of items for {}", collection));
    };

    let mut records = Vec::with_capacity(items.len());
    for (position, item) in items.into_iter().enumerate() {
        match Record::from_item(collection, item) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(%collection, position, error = %e, "Skipping malformed item");
            }
        }
    }

    Ok(records)
}

/// Parse a list response body: either the API envelope or a bare array
pub fn records_from_response(collection: Collection, body: &str) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_str(body).with_context(|| format!("Invalid JSON response for {}", collection))?;

    if value.is_array() {
        return records_from_items(collection, value);
    }

    let envelope: ItemsEnvelope =
        serde_json::from_value(value).with_context(|| format!("Unexpected response shape for {}", collection))?;

    if let Some(error) = envelope.error {
        return Err(eyre!("API error for {}: {}", collection, error));
    }

    match envelope.items {
        Some(items) => records_from_items(collection, items),
        None => {
            debug!(%collection, message = ?envelope.message, "Response has no Items, treating as empty");
            Ok(Vec::new())
        }
    }
}

/// Reads API dumps from a directory
///
/// For each collection the source looks for `<table>.json` (API envelope or
/// bare array) and then `<table>.jsonl` (one item per line).
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RecordSource for DirSource {
    fn fetch_all(&self, collection: Collection) -> Result<Vec<Record>> {
        let json_path = self.root.join(format!("{}.json", collection.table_name()));
        if json_path.exists() {
            let body = fs::read_to_string(&json_path).with_context(|| format!("Failed to read {:?}", json_path))?;
            return records_from_response(collection, &body);
        }

        let jsonl_path = self.root.join(format!("{}.jsonl", collection.table_name()));
        if jsonl_path.exists() {
            let items: Vec<Value> = jsonl::read_jsonl(&jsonl_path)?;
            return records_from_items(collection, Value::Array(items));
        }

        warn!(%collection, root = ?self.root, "No dump found for collection, treating as empty");
        Ok(Vec::new())
    }
}

/// Serves preset records
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    collections: HashMap<Collection, Vec<Record>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, collection: Collection, records: Vec<Record>) -> Self {
        self.collections.insert(collection, records);
        self
    }
}

impl RecordSource for MemorySource {
    fn fetch_all(&self, collection: Collection) -> Result<Vec<Record>> {
        Ok(self.collections.get(&collection).cloned().unwrap_or_default())
    }
}
