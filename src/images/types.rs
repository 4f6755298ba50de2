use serde::{Deserialize, Serialize};

/// Photo payloads for one worker, as handed to the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPhoto {
  pub worker_id: String,
  /// Data URL or remote URL
  pub photo_url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub aadhaar_photo_url: Option<String>,
}

/// A cached photo set, keyed by worker id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedImage {
  pub worker_id: String,
  pub photo_url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub aadhaar_photo_url: Option<String>,
  /// Cache-write time (epoch milliseconds)
  pub timestamp: i64,
}

impl CachedImage {
  pub fn stamped(photo: WorkerPhoto, timestamp: i64) -> Self {
    Self {
      worker_id: photo.worker_id,
      photo_url: photo.photo_url,
      aadhaar_photo_url: photo.aadhaar_photo_url,
      timestamp,
    }
  }

  /// Fresh while strictly younger than `window_ms`.
  ///
  /// Timestamps come from stored records; an out-of-range one saturates and reads
  /// as stale instead of overflowing.
  pub fn is_fresh(&self, now_ms: i64, window_ms: i64) -> bool {
    now_ms.saturating_sub(self.timestamp) < window_ms
  }
}
