//! Synchronous whole-value key-value storage.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{StoreError, StoreResult};

/// Trait for synchronous key-value backends.
///
/// Every call is atomic on its own and never suspends. Values are stored and
/// returned whole.
pub trait KeyValueStore: Send + Sync {
  /// Read the value stored under `key`.
  fn get(&self, key: &str) -> StoreResult<Option<String>>;

  /// Replace the value stored under `key`.
  fn set(&self, key: &str, value: &str) -> StoreResult<()>;

  /// Delete `key`. Missing keys are not an error.
  fn remove(&self, key: &str) -> StoreResult<()>;
}

/// In-memory store. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
  slots: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemoryKvStore {
  fn get(&self, key: &str) -> StoreResult<Option<String>> {
    let slots = self.slots.lock().map_err(|e| poisoned(&e))?;
    Ok(slots.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> StoreResult<()> {
    let mut slots = self.slots.lock().map_err(|e| poisoned(&e))?;
    slots.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> StoreResult<()> {
    let mut slots = self.slots.lock().map_err(|e| poisoned(&e))?;
    slots.remove(key);
    Ok(())
  }
}

/// SQLite-backed key-value store.
pub struct SqliteKvStore {
  conn: Mutex<Connection>,
}

impl SqliteKvStore {
  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> StoreResult<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StoreError::Unavailable(format!(
          "failed to create directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StoreError::Unavailable(format!("failed to open {}: {}", path.display(), e))
    })?;
    conn.execute_batch(KV_SCHEMA)?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> StoreResult<Self> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(KV_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }
}

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl KeyValueStore for SqliteKvStore {
  fn get(&self, key: &str) -> StoreResult<Option<String>> {
    let conn = self.conn.lock().map_err(|e| poisoned(&e))?;
    let value = conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> StoreResult<()> {
    let conn = self.conn.lock().map_err(|e| poisoned(&e))?;
    conn.execute(
      "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?, ?)",
      params![key, value],
    )?;
    Ok(())
  }

  fn remove(&self, key: &str) -> StoreResult<()> {
    let conn = self.conn.lock().map_err(|e| poisoned(&e))?;
    conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
    Ok(())
  }
}

fn poisoned<E: std::fmt::Display>(e: &E) -> StoreError {
  StoreError::Unavailable(format!("lock poisoned: {}", e))
}
