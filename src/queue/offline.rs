//! Durable FIFO of punches that could not be written to the server.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::network::{NetworkStatus, StaticStatus};
use crate::store::KeyValueStore;

use super::types::{PunchInput, QueuedPunch};

pub const DEFAULT_STORAGE_KEY: &str = "offline_attendance_queue";
pub const DEFAULT_MAX_LEN: usize = 500;

/// Offline punch queue over a synchronous key-value slot.
///
/// The whole queue is one JSON array under a single key. Each public operation is
/// a read-modify-write of that slot, so callers are expected to serialize calls.
/// Public operations never fail: storage problems are logged and a safe default is
/// returned. The `try_*` variants expose the underlying [`StoreError`].
pub struct OfflineQueue<K: KeyValueStore> {
  store: Arc<K>,
  storage_key: String,
  max_len: usize,
  clock: Arc<dyn Clock>,
  network: Arc<dyn NetworkStatus>,
}

impl<K: KeyValueStore> OfflineQueue<K> {
  pub fn new(store: K) -> Self {
    Self {
      store: Arc::new(store),
      storage_key: DEFAULT_STORAGE_KEY.to_string(),
      max_len: DEFAULT_MAX_LEN,
      clock: Arc::new(SystemClock),
      network: Arc::new(StaticStatus::online()),
    }
  }

  pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
    self.storage_key = key.into();
    self
  }

  /// Maximum number of queued punches. New punches beyond this are rejected.
  pub fn with_max_len(mut self, max_len: usize) -> Self {
    self.max_len = max_len;
    self
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_network(mut self, network: Arc<dyn NetworkStatus>) -> Self {
    self.network = network;
    self
  }

  /// Append a punch, stamping it with the queueing time.
  pub fn enqueue(&self, punch: PunchInput) {
    let id = punch.id.clone();
    match self.try_enqueue(punch) {
      Ok(queued) => debug!(id = %queued.id(), timestamp = queued.timestamp, "queued punch"),
      Err(e @ StoreError::QueueFull(_)) => error!(id = %id, error = %e, "dropping punch"),
      Err(e) => warn!(id = %id, error = %e, "failed to queue punch"),
    }
  }

  pub fn try_enqueue(&self, punch: PunchInput) -> StoreResult<QueuedPunch> {
    if punch.id.trim().is_empty() {
      return Err(StoreError::InvalidPunch("empty id".to_string()));
    }
    if punch.worker_id.trim().is_empty() {
      return Err(StoreError::InvalidPunch(format!(
        "punch {} has an empty workerId",
        punch.id
      )));
    }
    if punch.site_id.trim().is_empty() {
      return Err(StoreError::InvalidPunch(format!(
        "punch {} has an empty siteId",
        punch.id
      )));
    }

    let foreign = punch.foreign_fields();
    if !foreign.is_empty() {
      warn!(id = %punch.id, fields = ?foreign, "punch carries fields of the other punch type");
    }

    let mut queue = self.load()?;
    if queue.len() >= self.max_len {
      return Err(StoreError::QueueFull(queue.len()));
    }

    // Keep timestamps non-decreasing even if the wall clock steps back.
    let now = self.clock.now_ms();
    let timestamp = queue.last().map_or(now, |last| now.max(last.timestamp));

    let queued = QueuedPunch { punch, timestamp };
    queue.push(queued.clone());
    self.save(&queue)?;

    Ok(queued)
  }

  /// All queued punches in insertion order.
  pub fn get_all(&self) -> Vec<QueuedPunch> {
    self.try_get_all().unwrap_or_else(|e| {
      warn!(error = %e, "reading offline queue failed, treating as empty");
      Vec::new()
    })
  }

  /// Like [`get_all`](Self::get_all), but reports malformed content as an error.
  pub fn try_get_all(&self) -> StoreResult<Vec<QueuedPunch>> {
    let Some(raw) = self.store.get(&self.storage_key)? else {
      return Ok(Vec::new());
    };

    serde_json::from_str::<Vec<QueuedPunch>>(&raw).map_err(|e| StoreError::Malformed(e.to_string()))
  }

  /// Remove the first punch with this id. Unknown ids are ignored.
  pub fn remove_by_id(&self, id: &str) {
    match self.try_remove_by_id(id) {
      Ok(true) => debug!(id = %id, "removed queued punch"),
      Ok(false) => debug!(id = %id, "punch not in queue"),
      Err(e) => warn!(id = %id, error = %e, "failed to remove queued punch"),
    }
  }

  /// Returns whether a punch was removed.
  pub fn try_remove_by_id(&self, id: &str) -> StoreResult<bool> {
    let mut queue = self.load()?;
    let Some(pos) = queue.iter().position(|p| p.id() == id) else {
      return Ok(false);
    };

    queue.remove(pos);
    self.save(&queue)?;
    Ok(true)
  }

  /// Replace the queue with an empty one.
  pub fn clear_all(&self) {
    if let Err(e) = self.try_clear_all() {
      warn!(error = %e, "failed to clear offline queue");
    }
  }

  /// Drops the slot; an absent slot reads as an empty queue.
  pub fn try_clear_all(&self) -> StoreResult<()> {
    self.store.remove(&self.storage_key)
  }

  pub fn count(&self) -> usize {
    self.get_all().len()
  }

  /// Advisory reachability check; a write may still fail afterwards.
  pub fn is_connected(&self) -> bool {
    self.network.is_online()
  }

  /// Current contents, with malformed content treated as empty.
  fn load(&self) -> StoreResult<Vec<QueuedPunch>> {
    match self.try_get_all() {
      Err(StoreError::Malformed(reason)) => {
        warn!(reason = %reason, "discarding malformed offline queue");
        Ok(Vec::new())
      }
      other => other,
    }
  }

  fn save(&self, queue: &[QueuedPunch]) -> StoreResult<()> {
    let raw = serde_json::to_string(queue)?;
    self.store.set(&self.storage_key, &raw)
  }
}

impl<K: KeyValueStore> Clone for OfflineQueue<K> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      storage_key: self.storage_key.clone(),
      max_len: self.max_len,
      clock: Arc::clone(&self.clock),
      network: Arc::clone(&self.network),
    }
  }
}
