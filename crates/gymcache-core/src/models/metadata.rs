use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "ts")]
use ts_rs::TS;

/// Layout version of the persisted partitions. Bump when a model changes
/// incompatibly; the store drops data written under another version.
pub const SCHEMA_VERSION: u32 = 1;

/// Key of the metadata record inside the `metadata` partition.
pub const SYNC_METADATA_KEY: &str = "sync";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct SyncMetadata {
    pub last_sync: Option<DateTime<Utc>>,
    pub schema_version: u32,
}

impl SyncMetadata {
    pub fn synced_at(at: DateTime<Utc>) -> Self {
        Self {
            last_sync: Some(at),
            schema_version: SCHEMA_VERSION,
        }
    }
}

impl Default for SyncMetadata {
    fn default() -> Self {
        Self {
            last_sync: None,
            schema_version: SCHEMA_VERSION,
        }
    }
}
