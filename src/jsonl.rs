// JSONL file operations for item dumps

use eyre::{Context, Result};
use fs2::FileExt;
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{info, warn};

/// Write values to a JSONL file, replacing its contents
pub fn write_jsonl<T: Serialize>(path: &Path, values: &[T]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .context("Failed to open JSONL file for writing")?;

    // Truncate only once the lock is held
    file.lock_exclusive().context("Failed to acquire file lock")?;
    file.set_len(0).context("Failed to truncate JSONL file")?;

    for value in values {
        let json = serde_json::to_string(value)?;
        writeln!(file, "{}", json)?;
    }
    file.sync_all()?;

    Ok(())
}

/// Read all values from a JSONL file
///
/// Blank lines are ignored; lines that fail to read or parse are skipped
/// with a warning. A missing file reads as empty.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).context("Failed to open JSONL file")?;
    let reader = BufReader::new(file);
    let mut values = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to read line, skipping"
                );
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str(&line) {
            Ok(value) => values.push(value),
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to parse JSON, skipping"
                );
            }
        }
    }

    info!(file = ?path, count = values.len(), "Loaded values from JSONL");

    Ok(values)
}
