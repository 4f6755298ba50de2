//! Tagged failure reasons for the local stores.
//!
//! Public queue and cache operations never surface these to the caller; they log
//! the reason and fall back to a safe default. The `try_*` forms return them so the
//! reason is available for logging and tests.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
  /// The backing storage could not be opened or accessed.
  #[error("storage unavailable: {0}")]
  Unavailable(String),

  /// Persisted content did not decode as expected.
  #[error("malformed persisted content: {0}")]
  Malformed(String),

  /// A write transaction failed part way and was rolled back.
  #[error("transaction aborted: {0}")]
  TransactionAborted(String),

  #[error("record space '{0}' does not exist")]
  MissingSpace(String),

  #[error("offline queue is full ({0} punches)")]
  QueueFull(usize),

  #[error("invalid punch: {0}")]
  InvalidPunch(String),

  #[error("store operation timed out after {0:?}")]
  Timeout(std::time::Duration),

  #[error("failed to serialize record: {0}")]
  Serialize(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
  fn from(e: rusqlite::Error) -> Self {
    StoreError::Unavailable(e.to_string())
  }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure submitting a punch to the remote attendance API.
#[derive(Error, Debug)]
pub enum SyncError {
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("server rejected punch with status {status}: {body}")]
  Rejected { status: u16, body: String },

  #[error("invalid API url: {0}")]
  Url(#[from] url::ParseError),
}
