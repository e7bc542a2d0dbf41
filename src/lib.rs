// tftstore - Trait/champion catalog index with a SQLite snapshot cache

pub mod cache;
pub mod catalog;
pub mod config;
pub mod filter;
pub mod index;
pub mod jsonl;
pub mod payload;
pub mod record;
pub mod source;
pub mod store;

// Re-export main types for convenience
pub use cache::{MemoryCache, Snapshot, SnapshotCache};
pub use catalog::{Catalog, LoadOptions, TraitSummary, now_ms};
pub use config::Config;
pub use filter::{Filter, FilterOp, TextQuery};
pub use index::{Diagnostic, DiagnosticKind, TraitIndex, build_trait_index, decode_records};
pub use payload::{Payload, PayloadKind};
pub use record::{Collection, Record};
pub use source::{DirSource, MemorySource, RecordSource};
pub use store::Store;
