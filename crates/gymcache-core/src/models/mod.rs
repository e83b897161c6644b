//! Data models for the cached gym dataset.
//!
//! These are the denormalized snapshots the sync pulls from the backend
//! and the persistent store keeps for offline use:
//!
//! - `CachedRoutine`: routine with its day groups and exercise assignments
//! - `CachedExercise`: catalog entry with ordered images
//! - `MembershipSnapshot`: latest membership for the signed-in user
//! - `SyncMetadata`: bookkeeping for the last successful sync

pub mod exercise;
pub mod membership;
pub mod metadata;
pub mod routine;

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::store::{Partition, StorageSlot};

pub use exercise::{CachedExercise, ExerciseImage};
pub use membership::{MembershipSnapshot, MembershipStatus};
pub use metadata::{SyncMetadata, SCHEMA_VERSION};
pub use routine::{CachedRoutine, ExerciseSnapshot, RoutineDay, RoutineExercise};

/// An entity the persistent store knows how to place.
///
/// Keyed entities are upserted by `cache_key` into their partition,
/// single-slot entities always overwrite one well-known key.
pub trait CachedEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const PARTITION: Partition;
    const SLOT: StorageSlot;
    /// Plural, human readable name used in empty-state messages.
    const LABEL: &'static str;

    fn cache_key(&self) -> String;
}

/// Opaque identifier of the signed-in user. Only ever used as a filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
