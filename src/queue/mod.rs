//! Offline attendance punch queue.
//!
//! Punches that could not be written to the server are staged here, in insertion
//! order, until a drain succeeds.

mod offline;
mod types;

pub use offline::{OfflineQueue, DEFAULT_MAX_LEN, DEFAULT_STORAGE_KEY};
pub use types::{GeoPoint, PunchInput, PunchType, QueuedPunch};
