//! Persistent client store for offline data access.
//!
//! The store is a partitioned, async key-value store. Each partition holds
//! an insertion-ordered list of records keyed by entity identity:
//!
//! - `routines`: `CachedRoutine` keyed by id
//! - `exercises`: `CachedExercise` keyed by id
//! - `membership`: single `MembershipSnapshot` slot
//! - `metadata`: `SyncMetadata`
//!
//! `PersistentStore` is an explicitly constructed handle. Opening the
//! backend happens lazily on first use and is memoized; if storage cannot
//! be opened every operation fails with `StoreError::Unavailable` and
//! readers treat that as "no cached data".

pub mod backend;
pub mod error;
pub mod file;
pub mod handle;
pub mod partition;

pub use backend::{MemoryBackend, Record, StoreBackend};
pub use error::StoreError;
pub use file::FileBackend;
pub use handle::{PersistentStore, StoreLocation};
pub use partition::{Partition, StorageSlot};
