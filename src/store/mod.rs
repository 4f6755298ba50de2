//! Storage capabilities used by the queue and the image cache.
//!
//! - [`KeyValueStore`]: synchronous whole-value slots, backs the offline queue
//! - [`TransactionalStore`]: asynchronous record-spaces, backs the image cache
//!
//! Each has a SQLite implementation and an in-memory one, so either component can
//! run against a different backend without changing its contract.

mod kv;
mod transactional;

pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
pub use transactional::{MemoryTxStore, SqliteTxStore, TransactionalStore, WriteOp};
