//! Persisted metadata index: canonical key to last-write timestamp.
//!
//! The index is the source of truth for freshness and eviction ordering. It
//! lives in its own SQLite database, one per cache name, independent of the
//! blobs it describes.

use chrono::{DateTime, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

/// Schema for the index table.
const INDEX_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    key TEXT PRIMARY KEY,
    last_update INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entries_last_update ON entries(last_update);
"#;

/// SQLite-backed key to last-write timestamp mapping.
pub struct MetadataIndex {
  conn: Mutex<Connection>,
}

impl MetadataIndex {
  /// Open or create the index database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create index directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open index database at {}: {}", path.display(), e))?;

    let index = Self {
      conn: Mutex::new(conn),
    };
    index.run_migrations()?;

    Ok(index)
  }

  /// Apply the schema, idempotently.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(INDEX_SCHEMA)
      .map_err(|e| eyre!("Failed to run index migrations: {}", e))?;

    Ok(())
  }

  /// Last-write timestamp for a key, if the key is resident.
  pub fn get(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let millis: Option<i64> = conn
      .query_row(
        "SELECT last_update FROM entries WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read index entry: {}", e))?;

    millis.map(timestamp_from_millis).transpose()
  }

  /// Record the last-write timestamp for a key, overwriting any previous one.
  pub fn set(&self, key: &str, last_update: DateTime<Utc>) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (key, last_update) VALUES (?, ?)",
        params![key, last_update.timestamp_millis()],
      )
      .map_err(|e| eyre!("Failed to write index entry: {}", e))?;

    Ok(())
  }

  /// Remove a key. Removing an absent key is not an error.
  pub fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM entries WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove index entry: {}", e))?;

    Ok(())
  }

  /// Number of resident entries.
  pub fn count(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count index entries: {}", e))?;

    Ok(count as usize)
  }

  /// Entry with the minimum last-write timestamp. Ties broken by ascending
  /// key order, which keeps the selection deterministic.
  pub fn oldest(&self) -> Result<Option<(String, DateTime<Utc>)>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(String, i64)> = conn
      .query_row(
        "SELECT key, last_update FROM entries ORDER BY last_update ASC, key ASC LIMIT 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to find oldest index entry: {}", e))?;

    row
      .map(|(key, millis)| Ok((key, timestamp_from_millis(millis)?)))
      .transpose()
  }

  /// All resident keys, for reconciliation against the blob store.
  pub fn keys(&self) -> Result<BTreeSet<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT key FROM entries")
      .map_err(|e| eyre!("Failed to prepare key query: {}", e))?;

    let keys = stmt
      .query_map([], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to list index keys: {}", e))?
      .collect::<std::result::Result<BTreeSet<_>, _>>()
      .map_err(|e| eyre!("Failed to read index key: {}", e))?;

    Ok(keys)
  }

  /// Drop every entry.
  pub fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM entries", [])
      .map_err(|e| eyre!("Failed to clear index: {}", e))?;

    Ok(())
  }
}

/// Convert stored Unix milliseconds back to a timestamp.
fn timestamp_from_millis(millis: i64) -> Result<DateTime<Utc>> {
  Utc
    .timestamp_millis_opt(millis)
    .single()
    .ok_or_else(|| eyre!("Invalid timestamp in index: {}", millis))
}
