// Trait -> champions secondary index
//
// Records come in with their payload still encoded in `raw`. Each one is
// decoded and normalized on its own; a record that fails to decode stays in
// the output without `parsed` and never stops the rest of the batch.

use crate::payload::Payload;
use crate::record::{Collection, Record};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// What went wrong with a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// `raw` was absent or empty
    MissingPayload,
    /// `raw` did not decode
    MalformedPayload,
    /// `traits` was not a list of names; only its string entries are kept
    MalformedTraits,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::MissingPayload => write!(f, "missing payload"),
            DiagnosticKind::MalformedPayload => write!(f, "malformed payload"),
            DiagnosticKind::MalformedTraits => write!(f, "malformed traits"),
        }
    }
}

/// A recovered decode problem, reported alongside the build output
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub collection: Collection,
    pub record_id: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Enriched records plus the trait index over them
///
/// Buckets hold positions into `records`, so every lookup hands back shared
/// references to the same records the caller can iterate directly.
#[derive(Debug, Clone, Default)]
pub struct TraitIndex {
    records: Vec<Record>,
    buckets: BTreeMap<String, Vec<usize>>,
    diagnostics: Vec<Diagnostic>,
}

impl TraitIndex {
    /// All records in input order, decoded where possible
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Records declaring `name`, in input order; `None` if no record declares it
    pub fn get(&self, name: &str) -> Option<Vec<&Record>> {
        self.buckets
            .get(name)
            .map(|positions| positions.iter().map(|&i| &self.records[i]).collect())
    }

    /// Like `get`, but an undeclared trait yields an empty list
    pub fn champions_with(&self, name: &str) -> Vec<&Record> {
        self.get(name).unwrap_or_default()
    }

    /// Positions into `records()` for `name`
    pub fn positions(&self, name: &str) -> Option<&[usize]> {
        self.buckets.get(name).map(Vec::as_slice)
    }

    /// Declared trait names, sorted
    pub fn trait_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.buckets.contains_key(name)
    }

    /// Number of distinct traits
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Decode every record and build the trait index in a single pass
pub fn build_trait_index(records: Vec<Record>) -> TraitIndex {
    let mut index = TraitIndex {
        records,
        buckets: BTreeMap::new(),
        diagnostics: Vec::new(),
    };

    for (position, record) in index.records.iter_mut().enumerate() {
        enrich(record, &mut index.diagnostics);

        let mut seen = HashSet::new();
        for name in record.traits() {
            if seen.insert(name.as_str()) {
                index.buckets.entry(name.clone()).or_default().push(position);
            }
        }
    }

    debug!(
        records = index.records.len(),
        traits = index.buckets.len(),
        diagnostics = index.diagnostics.len(),
        "Built trait index"
    );

    index
}

/// Decode and normalize records without indexing them
pub fn decode_records(mut records: Vec<Record>) -> (Vec<Record>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    for record in &mut records {
        enrich(record, &mut diagnostics);
    }
    (records, diagnostics)
}

/// Populate `record.parsed` from `raw`, reusing an existing decode
fn enrich(record: &mut Record, diagnostics: &mut Vec<Diagnostic>) {
    if record.parsed.is_none() {
        let raw = match record.raw.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => {
                debug!(id = %record.id, collection = %record.collection, "Record has no payload, skipping");
                diagnostics.push(Diagnostic {
                    collection: record.collection,
                    record_id: record.id.clone(),
                    kind: DiagnosticKind::MissingPayload,
                    message: "no data attribute".to_string(),
                });
                return;
            }
        };

        match Payload::decode(record.collection.payload_kind(), raw) {
            Ok(payload) => record.parsed = Some(payload),
            Err(e) => {
                warn!(
                    id = %record.id,
                    collection = %record.collection,
                    error = ?e,
                    "Failed to parse record data, skipping"
                );
                diagnostics.push(Diagnostic {
                    collection: record.collection,
                    record_id: record.id.clone(),
                    kind: DiagnosticKind::MalformedPayload,
                    message: e.to_string(),
                });
                return;
            }
        }
    }

    let Some(payload) = record.parsed.as_mut() else {
        return;
    };

    if let Some(e) = payload.normalize() {
        warn!(
            id = %record.id,
            error = ?e,
            "Malformed traits, indexing string entries only"
        );
        diagnostics.push(Diagnostic {
            collection: record.collection,
            record_id: record.id.clone(),
            kind: DiagnosticKind::MalformedTraits,
            message: e.to_string(),
        });
    }
}
