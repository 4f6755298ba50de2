//! Local cache of worker photos.
//!
//! Entries are keyed by worker id and expire after a freshness window. Reads
//! re-check freshness, so an expired entry is invisible even before a sweep
//! physically deletes it.

mod cache;
mod types;

pub use cache::{ImageCache, DEFAULT_FRESHNESS_DAYS, DEFAULT_OP_TIMEOUT, PHOTO_SPACE};
pub use types::{CachedImage, WorkerPhoto};
