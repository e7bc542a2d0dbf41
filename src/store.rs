// Snapshot store backed by SQLite

use crate::cache::{Snapshot, SnapshotCache};
use crate::jsonl;
use crate::record::Collection;
use eyre::{Context, Result, eyre};
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CURRENT_VERSION: u32 = 1;

/// Persistent snapshot cache
pub struct Store {
    base_path: PathBuf,
    db: Connection,
}

impl Store {
    /// Open or create a store at the given path
    ///
    /// The store will be created in a `.tftstore` subdirectory of the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().join(".tftstore");

        // Create directory if it doesn't exist
        fs::create_dir_all(&base_path).context("Failed to create store directory")?;

        // Open SQLite database
        let db_path = base_path.join("tftstore.db");
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        let store = Self { base_path, db };

        store.create_schema()?;
        store.create_gitignore()?;
        store.write_version()?;

        Ok(store)
    }

    /// Get the base path of this store
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        debug!("Creating database schema");

        self.db.execute_batch(
            r#"
            -- One row per snapshot
            CREATE TABLE IF NOT EXISTS snapshots (
                key TEXT PRIMARY KEY,
                fetched_at INTEGER NOT NULL
            );

            -- Raw wire items per snapshot and collection
            CREATE TABLE IF NOT EXISTS snapshot_collections (
                key TEXT NOT NULL,
                collection TEXT NOT NULL,
                items_json TEXT NOT NULL,
                item_count INTEGER NOT NULL,
                PRIMARY KEY (key, collection),
                FOREIGN KEY (key) REFERENCES snapshots(key) ON DELETE CASCADE
            );
            "#,
        )?;

        Ok(())
    }

    /// Create .gitignore file
    fn create_gitignore(&self) -> Result<()> {
        let gitignore_path = self.base_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(gitignore_path, "tftstore.db\ntftstore.db-shm\ntftstore.db-wal\n")?;
        }
        Ok(())
    }

    /// Write version file
    fn write_version(&self) -> Result<()> {
        let version_path = self.base_path.join(".version");
        if !version_path.exists() {
            fs::write(version_path, CURRENT_VERSION.to_string())?;
        }
        Ok(())
    }

    /// Stored snapshot keys with their fetch time, newest first
    pub fn keys(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .db
            .prepare("SELECT key, fetched_at FROM snapshots ORDER BY fetched_at DESC, key")?;

        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    /// Write every collection of a snapshot to `<table>.jsonl` under `dir`
    ///
    /// Returns the number of items written. The output can be read back by
    /// `DirSource`.
    pub fn export_jsonl(&self, key: &str, dir: &Path) -> Result<usize> {
        let snapshot = self
            .get(key)?
            .ok_or_else(|| eyre!("No snapshot stored under key: {}", key))?;

        fs::create_dir_all(dir).context("Failed to create export directory")?;

        let mut count = 0;
        for (collection, items) in &snapshot.collections {
            let path = dir.join(format!("{}.jsonl", collection.table_name()));
            jsonl::write_jsonl(&path, items)?;
            count += items.len();
        }

        info!(key, dir = ?dir, count, "Exported snapshot");
        Ok(count)
    }

    fn validate_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(eyre!("Snapshot key cannot be empty"));
        }
        if key.len() > 64 {
            return Err(eyre!("Snapshot key too long: {} (max 64 chars)", key));
        }
        if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(eyre!("Invalid snapshot key: {} (must be alphanumeric with _/-)", key));
        }
        Ok(())
    }
}

impl SnapshotCache for Store {
    fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        Self::validate_key(key)?;

        let fetched_at: Option<i64> = self
            .db
            .query_row("SELECT fetched_at FROM snapshots WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;

        let Some(fetched_at) = fetched_at else {
            return Ok(None);
        };

        let mut stmt = self
            .db
            .prepare("SELECT collection, items_json FROM snapshot_collections WHERE key = ?1")?;
        let rows = stmt.query_map([key], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut collections = BTreeMap::new();
        for row in rows {
            let (name, items_json) = row?;

            // Unknown collections come from a newer schema; skip rather than fail
            let collection: Collection = match name.parse() {
                Ok(c) => c,
                Err(e) => {
                    warn!(key, collection = %name, error = %e, "Skipping unknown collection in snapshot");
                    continue;
                }
            };

            let items: Vec<Value> =
                serde_json::from_str(&items_json).context("Failed to deserialize snapshot items from database")?;
            collections.insert(collection, items);
        }

        Ok(Some(Snapshot { fetched_at, collections }))
    }

    fn put(&mut self, key: &str, snapshot: &Snapshot) -> Result<()> {
        Self::validate_key(key)?;

        let tx = self.db.transaction()?;

        tx.execute("DELETE FROM snapshot_collections WHERE key = ?1", [key])?;
        tx.execute(
            "INSERT OR REPLACE INTO snapshots (key, fetched_at) VALUES (?1, ?2)",
            rusqlite::params![key, snapshot.fetched_at],
        )?;

        for (collection, items) in &snapshot.collections {
            let items_json = serde_json::to_string(items).context("Failed to serialize snapshot items")?;
            tx.execute(
                "INSERT INTO snapshot_collections (key, collection, items_json, item_count)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![key, collection.table_name(), items_json, items.len() as i64],
            )?;
        }

        tx.commit()?;

        debug!(key, collections = snapshot.collections.len(), "Stored snapshot");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        Self::validate_key(key)?;

        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM snapshot_collections WHERE key = ?1", [key])?;
        let removed = tx.execute("DELETE FROM snapshots WHERE key = ?1", [key])?;
        tx.commit()?;

        Ok(removed > 0)
    }
}
