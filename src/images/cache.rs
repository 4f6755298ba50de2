//! Worker photo cache with a fixed freshness window.

use chrono::Duration;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::store::{SqliteTxStore, TransactionalStore, WriteOp};

use super::types::{CachedImage, WorkerPhoto};

pub const PHOTO_SPACE: &str = "photos";
pub const DEFAULT_FRESHNESS_DAYS: i64 = 25;
pub const DEFAULT_OP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

type Opener<S> = Box<dyn Fn() -> BoxFuture<'static, StoreResult<S>> + Send + Sync>;

/// Cache of worker photos over an asynchronous transactional store.
///
/// The store is opened on first use and shared afterwards. Reads filter in memory:
/// the record-space holds one entry per worker, so it stays small.
pub struct ImageCache<S: TransactionalStore> {
  store: OnceCell<Arc<S>>,
  opener: Opener<S>,
  space: String,
  /// Records at least this old are treated as absent
  freshness: Duration,
  op_timeout: std::time::Duration,
  clock: Arc<dyn Clock>,
}

impl ImageCache<SqliteTxStore> {
  /// Cache backed by a SQLite file, opened lazily.
  pub fn sqlite(path: PathBuf) -> Self {
    Self::new(move || {
      let path = path.clone();
      async move { SqliteTxStore::open(&path).await }
    })
  }
}

impl<S: TransactionalStore> ImageCache<S> {
  /// Create a cache that opens its store with `opener` on first use.
  pub fn new<F, Fut>(opener: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StoreResult<S>> + Send + 'static,
  {
    Self {
      store: OnceCell::new(),
      opener: Box::new(move || -> BoxFuture<'static, StoreResult<S>> { Box::pin(opener()) }),
      space: PHOTO_SPACE.to_string(),
      freshness: Duration::days(DEFAULT_FRESHNESS_DAYS),
      op_timeout: DEFAULT_OP_TIMEOUT,
      clock: Arc::new(SystemClock),
    }
  }

  pub fn with_freshness(mut self, freshness: Duration) -> Self {
    self.freshness = freshness;
    self
  }

  /// Upper bound on any single open, read or write.
  pub fn with_op_timeout(mut self, timeout: std::time::Duration) -> Self {
    self.op_timeout = timeout;
    self
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Open the store and its record-space, once.
  ///
  /// A failed open is not remembered; the next call tries again.
  pub async fn open_store(&self) -> StoreResult<Arc<S>> {
    let store = self
      .store
      .get_or_try_init(|| async {
        let store = self.timed((self.opener)()).await?;
        self.timed(store.ensure_space(&self.space)).await?;
        info!(space = %self.space, "image cache opened");
        Ok::<_, StoreError>(Arc::new(store))
      })
      .await?;
    Ok(Arc::clone(store))
  }

  /// Fresh cached images for the requested workers. Errors read as a miss.
  pub async fn get_cached_images(&self, worker_ids: &[String]) -> HashMap<String, CachedImage> {
    self
      .try_get_cached_images(worker_ids)
      .await
      .unwrap_or_else(|e| {
        warn!(error = %e, "image cache read failed, treating as miss");
        HashMap::new()
      })
  }

  pub async fn try_get_cached_images(
    &self,
    worker_ids: &[String],
  ) -> StoreResult<HashMap<String, CachedImage>> {
    let wanted: HashSet<&str> = worker_ids.iter().map(String::as_str).collect();
    let now = self.clock.now_ms();
    let window = self.window_ms();

    let images = self
      .read_all()
      .await?
      .into_iter()
      .filter(|img| wanted.contains(img.worker_id.as_str()))
      .filter(|img| img.is_fresh(now, window))
      .map(|img| (img.worker_id.clone(), img))
      .collect();

    Ok(images)
  }

  /// Upsert photos by worker id in one transaction, stamped with the current time.
  pub async fn cache_worker_images(&self, photos: Vec<WorkerPhoto>) -> StoreResult<()> {
    if photos.is_empty() {
      return Ok(());
    }

    let now = self.clock.now_ms();
    let ops = photos
      .into_iter()
      .map(|photo| {
        let image = CachedImage::stamped(photo, now);
        Ok(WriteOp::Put {
          key: image.worker_id.clone(),
          value: serde_json::to_vec(&image)?,
        })
      })
      .collect::<StoreResult<Vec<_>>>()?;
    let count = ops.len();

    let store = self.open_store().await?;
    self.timed(store.write(&self.space, ops)).await?;
    debug!(count, "cached worker images");
    Ok(())
  }

  /// Delete every stale record. Returns how many were removed; errors count as 0.
  pub async fn clear_expired_cache(&self) -> usize {
    match self.try_clear_expired_cache().await {
      Ok(removed) => removed,
      Err(e) => {
        warn!(error = %e, "image cache sweep failed");
        0
      }
    }
  }

  pub async fn try_clear_expired_cache(&self) -> StoreResult<usize> {
    let store = self.open_store().await?;
    let now = self.clock.now_ms();
    let window = self.window_ms();

    let rows = self.timed(store.read_all(&self.space)).await?;
    let ops: Vec<WriteOp> = rows
      .into_iter()
      .filter(|(_, data)| match serde_json::from_slice::<CachedImage>(data) {
        Ok(img) => !img.is_fresh(now, window),
        // Undecodable records can never be served; sweep them too.
        Err(_) => true,
      })
      .map(|(key, _)| WriteOp::Delete { key })
      .collect();

    let removed = ops.len();
    if removed > 0 {
      self.timed(store.write(&self.space, ops)).await?;
      info!(removed, "swept expired worker images");
    }
    Ok(removed)
  }

  /// Run the expiry sweep as a detached task.
  pub fn spawn_clear_expired(self: &Arc<Self>) -> JoinHandle<usize> {
    let cache = Arc::clone(self);
    tokio::spawn(async move { cache.clear_expired_cache().await })
  }

  async fn read_all(&self) -> StoreResult<Vec<CachedImage>> {
    let store = self.open_store().await?;
    let rows = self.timed(store.read_all(&self.space)).await?;

    Ok(
      rows
        .into_iter()
        .filter_map(|(key, data)| match serde_json::from_slice(&data) {
          Ok(img) => Some(img),
          Err(e) => {
            warn!(key = %key, error = %e, "skipping undecodable cached image");
            None
          }
        })
        .collect(),
    )
  }

  fn window_ms(&self) -> i64 {
    self.freshness.num_milliseconds()
  }

  async fn timed<T>(&self, fut: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
    tokio::time::timeout(self.op_timeout, fut)
      .await
      .map_err(|_| StoreError::Timeout(self.op_timeout))?
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::store::MemoryTxStore;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};

  const DAY_MS: i64 = 24 * 60 * 60 * 1000;
  const T0: i64 = 1_770_000_000_000;

  fn photo(worker_id: &str, url: &str) -> WorkerPhoto {
    WorkerPhoto {
      worker_id: worker_id.to_string(),
      photo_url: url.to_string(),
      aadhaar_photo_url: None,
    }
  }

  fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
  }

  fn memory_cache(clock: &Arc<ManualClock>) -> ImageCache<MemoryTxStore> {
    ImageCache::new(|| async { Ok(MemoryTxStore::new()) }).with_clock(clock.clone())
  }

  /// Opens fine, but every write aborts.
  struct AbortingStore;

  #[async_trait]
  impl TransactionalStore for AbortingStore {
    async fn ensure_space(&self, _space: &str) -> StoreResult<()> {
      Ok(())
    }

    async fn read_all(&self, _space: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
      Err(StoreError::Unavailable("database blocked".to_string()))
    }

    async fn write(&self, _space: &str, _ops: Vec<WriteOp>) -> StoreResult<()> {
      Err(StoreError::TransactionAborted("constraint".to_string()))
    }
  }

  /// Never finishes opening.
  struct HangingStore;

  #[async_trait]
  impl TransactionalStore for HangingStore {
    async fn ensure_space(&self, _space: &str) -> StoreResult<()> {
      std::future::pending().await
    }

    async fn read_all(&self, _space: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
      Ok(Vec::new())
    }

    async fn write(&self, _space: &str, _ops: Vec<WriteOp>) -> StoreResult<()> {
      Ok(())
    }
  }

  #[tokio::test]
  async fn freshness_boundary_is_strict() {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = memory_cache(&clock);
    cache
      .cache_worker_images(vec![photo("w1", "data:image/png;base64,AAA")])
      .await
      .unwrap();

    clock.set(T0 + 25 * DAY_MS - 1);
    let hit = cache.get_cached_images(&ids(&["w1"])).await;
    assert_eq!(hit.len(), 1);
    assert_eq!(hit["w1"].timestamp, T0);

    clock.set(T0 + 25 * DAY_MS);
    assert!(cache.get_cached_images(&ids(&["w1"])).await.is_empty());

    clock.set(T0 + 40 * DAY_MS);
    assert!(cache.get_cached_images(&ids(&["w1"])).await.is_empty());
  }

  #[tokio::test]
  async fn recache_overwrites_single_entry() {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = memory_cache(&clock);

    cache
      .cache_worker_images(vec![photo("w1", "first")])
      .await
      .unwrap();
    clock.advance(1_000);
    cache
      .cache_worker_images(vec![photo("w1", "second")])
      .await
      .unwrap();

    let store = cache.open_store().await.unwrap();
    let rows = store.read_all(PHOTO_SPACE).await.unwrap();
    assert_eq!(rows.len(), 1);

    let hit = cache.get_cached_images(&ids(&["w1"])).await;
    assert_eq!(hit["w1"].photo_url, "second");
    assert_eq!(hit["w1"].timestamp, T0 + 1_000);
  }

  #[tokio::test]
  async fn reads_filter_to_requested_ids() {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = memory_cache(&clock);
    let mut with_id_card = photo("w2", "p2");
    with_id_card.aadhaar_photo_url = Some("a2".to_string());

    cache
      .cache_worker_images(vec![photo("w1", "p1"), with_id_card, photo("w3", "p3")])
      .await
      .unwrap();

    let hit = cache.get_cached_images(&ids(&["w2", "w3", "missing"])).await;
    assert_eq!(hit.len(), 2);
    assert_eq!(hit["w2"].aadhaar_photo_url.as_deref(), Some("a2"));
    assert!(!hit.contains_key("w1"));

    assert!(cache.get_cached_images(&[]).await.is_empty());
  }

  #[tokio::test]
  async fn sweep_removes_only_stale_entries() {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = memory_cache(&clock);
    cache
      .cache_worker_images(vec![photo("old", "p")])
      .await
      .unwrap();

    clock.set(T0 + 20 * DAY_MS);
    cache
      .cache_worker_images(vec![photo("new", "p")])
      .await
      .unwrap();

    clock.set(T0 + 30 * DAY_MS);
    assert_eq!(cache.clear_expired_cache().await, 1);
    assert_eq!(cache.clear_expired_cache().await, 0);

    let store = cache.open_store().await.unwrap();
    let keys: Vec<String> = store
      .read_all(PHOTO_SPACE)
      .await
      .unwrap()
      .into_iter()
      .map(|(k, _)| k)
      .collect();
    assert_eq!(keys, vec!["new".to_string()]);

    let hit = cache.get_cached_images(&ids(&["old", "new"])).await;
    assert_eq!(hit.len(), 1);
    assert!(hit.contains_key("new"));
  }

  #[tokio::test]
  async fn spawned_sweep_runs_detached() {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = Arc::new(memory_cache(&clock));
    cache
      .cache_worker_images(vec![photo("w1", "p")])
      .await
      .unwrap();

    clock.advance(26 * DAY_MS);
    let removed = cache.spawn_clear_expired().await.unwrap();
    assert_eq!(removed, 1);
  }

  #[tokio::test]
  async fn undecodable_records_are_skipped_and_swept() {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = memory_cache(&clock);
    cache
      .cache_worker_images(vec![photo("w1", "p")])
      .await
      .unwrap();

    let store = cache.open_store().await.unwrap();
    store
      .write(
        PHOTO_SPACE,
        vec![WriteOp::Put {
          key: "w2".to_string(),
          value: b"garbage".to_vec(),
        }],
      )
      .await
      .unwrap();

    let hit = cache.get_cached_images(&ids(&["w1", "w2"])).await;
    assert_eq!(hit.len(), 1);
    assert_eq!(cache.clear_expired_cache().await, 1);
  }

  #[tokio::test]
  async fn corrupted_timestamp_reads_as_absent_and_is_swept() {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = memory_cache(&clock);
    let store = cache.open_store().await.unwrap();
    store
      .write(
        PHOTO_SPACE,
        vec![WriteOp::Put {
          key: "w1".to_string(),
          value: br#"{"workerId":"w1","photoUrl":"p","timestamp":-9223372036854775808}"#.to_vec(),
        }],
      )
      .await
      .unwrap();

    assert!(cache.get_cached_images(&ids(&["w1"])).await.is_empty());
    assert_eq!(cache.clear_expired_cache().await, 1);
    assert!(store.read_all(PHOTO_SPACE).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn storage_errors_read_as_miss_and_writes_report_abort() {
    let cache = ImageCache::new(|| async { Ok(AbortingStore) });

    assert!(cache.get_cached_images(&ids(&["w1"])).await.is_empty());
    assert_eq!(cache.clear_expired_cache().await, 0);

    let err = cache
      .cache_worker_images(vec![photo("w1", "p")])
      .await
      .unwrap_err();
    assert!(matches!(err, StoreError::TransactionAborted(_)));
  }

  #[tokio::test]
  async fn failed_open_is_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let cache = ImageCache::new(move || {
      let n = counter.fetch_add(1, Ordering::SeqCst);
      async move {
        if n == 0 {
          Err(StoreError::Unavailable("permission denied".to_string()))
        } else {
          Ok(MemoryTxStore::new())
        }
      }
    });

    assert!(matches!(
      cache.open_store().await,
      Err(StoreError::Unavailable(_))
    ));
    assert!(cache.get_cached_images(&ids(&["w1"])).await.is_empty());
    cache.open_store().await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn hung_open_times_out() {
    let cache = ImageCache::new(|| async { Ok(HangingStore) })
      .with_op_timeout(std::time::Duration::from_millis(20));

    assert!(matches!(
      cache.open_store().await,
      Err(StoreError::Timeout(_))
    ));
    assert!(cache.get_cached_images(&ids(&["w1"])).await.is_empty());
  }

  #[tokio::test]
  async fn empty_write_does_not_open_store() {
    let cache = ImageCache::new(|| async {
      Err::<MemoryTxStore, _>(StoreError::Unavailable("unused".to_string()))
    });
    cache.cache_worker_images(Vec::new()).await.unwrap();
  }

  #[tokio::test]
  async fn sqlite_cache_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("worker_images.db");
    let clock = Arc::new(ManualClock::new(T0));

    let cache = ImageCache::sqlite(path.clone()).with_clock(clock.clone());
    cache
      .cache_worker_images(vec![photo("w1", "https://cdn.example/w1.jpg")])
      .await
      .unwrap();
    drop(cache);

    let cache = ImageCache::sqlite(path).with_clock(clock);
    let hit = cache.get_cached_images(&ids(&["w1"])).await;
    assert_eq!(hit["w1"].photo_url, "https://cdn.example/w1.jpg");
  }
}
