//! Asynchronous transactional record storage.
//!
//! Records live in named record-spaces, each a map from key to opaque bytes.
//! Reads see one consistent snapshot of a space; writes apply a batch of
//! operations atomically or not at all.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{StoreError, StoreResult};

/// A single mutation inside a write transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
  /// Insert or overwrite the record at `key`
  Put { key: String, value: Vec<u8> },
  /// Delete the record at `key` (no-op if absent)
  Delete { key: String },
}

/// Trait for asynchronous transactional backends.
#[async_trait]
pub trait TransactionalStore: Send + Sync + 'static {
  /// Create the record-space if it does not exist yet.
  async fn ensure_space(&self, space: &str) -> StoreResult<()>;

  /// Read every record of a space in one read transaction.
  async fn read_all(&self, space: &str) -> StoreResult<Vec<(String, Vec<u8>)>>;

  /// Apply `ops` in one read-write transaction.
  async fn write(&self, space: &str, ops: Vec<WriteOp>) -> StoreResult<()>;
}

/// In-memory transactional store.
#[derive(Debug, Default)]
pub struct MemoryTxStore {
  inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
  spaces: BTreeSet<String>,
  records: BTreeMap<(String, String), Vec<u8>>,
}

impl MemoryTxStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl TransactionalStore for MemoryTxStore {
  async fn ensure_space(&self, space: &str) -> StoreResult<()> {
    let mut inner = self.inner.lock().map_err(|e| poisoned(&e))?;
    inner.spaces.insert(space.to_string());
    Ok(())
  }

  async fn read_all(&self, space: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
    let inner = self.inner.lock().map_err(|e| poisoned(&e))?;
    if !inner.spaces.contains(space) {
      return Err(StoreError::MissingSpace(space.to_string()));
    }

    Ok(
      inner
        .records
        .iter()
        .filter(|((s, _), _)| s == space)
        .map(|((_, key), value)| (key.clone(), value.clone()))
        .collect(),
    )
  }

  async fn write(&self, space: &str, ops: Vec<WriteOp>) -> StoreResult<()> {
    let mut inner = self.inner.lock().map_err(|e| poisoned(&e))?;
    if !inner.spaces.contains(space) {
      return Err(StoreError::MissingSpace(space.to_string()));
    }

    // Holding the lock for the whole batch makes it atomic.
    for op in ops {
      match op {
        WriteOp::Put { key, value } => {
          inner.records.insert((space.to_string(), key), value);
        }
        WriteOp::Delete { key } => {
          inner.records.remove(&(space.to_string(), key));
        }
      }
    }
    Ok(())
  }
}

/// SQLite-backed transactional store.
///
/// SQLite calls block, so each operation runs on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteTxStore {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteTxStore {
  /// Open (or create) the database at `path`.
  pub async fn open(path: &Path) -> StoreResult<Self> {
    let path: PathBuf = path.to_path_buf();
    run_blocking(move || {
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
          StoreError::Unavailable(format!(
            "failed to create directory {}: {}",
            parent.display(),
            e
          ))
        })?;
      }

      let conn = Connection::open(&path).map_err(|e| {
        StoreError::Unavailable(format!("failed to open {}: {}", path.display(), e))
      })?;
      conn.execute_batch(TX_SCHEMA)?;
      Ok(Self {
        conn: Arc::new(Mutex::new(conn)),
      })
    })
    .await
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> StoreResult<Self> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(TX_SCHEMA)?;
    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  fn space_exists(conn: &Connection, space: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM record_spaces WHERE name = ?")?;
    Ok(stmt.exists(params![space])?)
  }
}

const TX_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS record_spaces (
    name TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS records (
    space TEXT NOT NULL,
    key TEXT NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (space, key),
    FOREIGN KEY (space) REFERENCES record_spaces(name) ON DELETE CASCADE
);
"#;

#[async_trait]
impl TransactionalStore for SqliteTxStore {
  async fn ensure_space(&self, space: &str) -> StoreResult<()> {
    let conn = Arc::clone(&self.conn);
    let space = space.to_string();
    run_blocking(move || {
      let conn = conn.lock().map_err(|e| poisoned(&e))?;
      conn.execute(
        "INSERT OR IGNORE INTO record_spaces (name) VALUES (?)",
        params![space],
      )?;
      Ok(())
    })
    .await
  }

  async fn read_all(&self, space: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
    let conn = Arc::clone(&self.conn);
    let space = space.to_string();
    run_blocking(move || {
      let mut conn = conn.lock().map_err(|e| poisoned(&e))?;
      let tx = conn.transaction()?;
      if !Self::space_exists(&tx, &space)? {
        return Err(StoreError::MissingSpace(space));
      }

      let rows = {
        let mut stmt = tx.prepare("SELECT key, data FROM records WHERE space = ? ORDER BY key")?;
        let rows: Vec<(String, Vec<u8>)> = stmt
          .query_map(params![space], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<Result<_, _>>()?;
        rows
      };
      tx.commit()?;
      Ok(rows)
    })
    .await
  }

  async fn write(&self, space: &str, ops: Vec<WriteOp>) -> StoreResult<()> {
    let conn = Arc::clone(&self.conn);
    let space = space.to_string();
    run_blocking(move || {
      let mut conn = conn.lock().map_err(|e| poisoned(&e))?;
      let tx = conn.transaction()?;
      if !Self::space_exists(&tx, &space)? {
        return Err(StoreError::MissingSpace(space));
      }

      // Any failure drops `tx`, which rolls the whole batch back.
      for op in ops {
        match op {
          WriteOp::Put { key, value } => {
            tx.execute(
              "INSERT OR REPLACE INTO records (space, key, data) VALUES (?, ?, ?)",
              params![space, key, value],
            )
            .map_err(|e| StoreError::TransactionAborted(e.to_string()))?;
          }
          WriteOp::Delete { key } => {
            tx.execute(
              "DELETE FROM records WHERE space = ? AND key = ?",
              params![space, key],
            )
            .map_err(|e| StoreError::TransactionAborted(e.to_string()))?;
          }
        }
      }

      tx.commit()
        .map_err(|e| StoreError::TransactionAborted(e.to_string()))
    })
    .await
  }
}

async fn run_blocking<T, F>(f: F) -> StoreResult<T>
where
  T: Send + 'static,
  F: FnOnce() -> StoreResult<T> + Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| StoreError::Unavailable(format!("storage task failed: {}", e)))?
}

fn poisoned<E: std::fmt::Display>(e: &E) -> StoreError {
  StoreError::Unavailable(format!("lock poisoned: {}", e))
}
