use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use super::{FileBackend, MemoryBackend, Partition, Record, StorageSlot, StoreBackend, StoreError};
use crate::models::metadata::SYNC_METADATA_KEY;
use crate::models::{CachedEntity, SyncMetadata, SCHEMA_VERSION};

/// Where the store keeps its partitions.
#[derive(Debug, Clone)]
pub enum StoreLocation {
    Directory(PathBuf),
    Memory,
}

/// Handle to the persistent store.
///
/// Construct one per process and pass it down; clones of the surrounding
/// `Arc` share the same lazily opened backend.
pub struct PersistentStore {
    location: StoreLocation,
    backend: OnceCell<Result<Arc<dyn StoreBackend>, String>>,
    // One lock per partition; operations on different partitions interleave freely
    locks: [Mutex<()>; 4],
}

impl PersistentStore {
    pub fn new(location: StoreLocation) -> Self {
        Self {
            location,
            backend: OnceCell::new(),
            locks: Default::default(),
        }
    }

    pub fn on_disk(dir: impl Into<PathBuf>) -> Self {
        Self::new(StoreLocation::Directory(dir.into()))
    }

    pub fn in_memory() -> Self {
        Self::new(StoreLocation::Memory)
    }

    /// Wrap an already opened backend. Used by hosts that bring their own storage.
    pub fn with_backend(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            location: StoreLocation::Memory,
            backend: OnceCell::new_with(Some(Ok(backend))),
            locks: Default::default(),
        }
    }

    async fn backend(&self) -> Result<&Arc<dyn StoreBackend>, StoreError> {
        let opened = self
            .backend
            .get_or_init(|| async {
                match self.open().await {
                    Ok(backend) => Ok(backend),
                    Err(e) => {
                        warn!(error = %e, "Persistent store unavailable, running without cache");
                        Err(e.to_string())
                    }
                }
            })
            .await;

        opened
            .as_ref()
            .map_err(|reason| StoreError::Unavailable(reason.clone()))
    }

    async fn open(&self) -> Result<Arc<dyn StoreBackend>, StoreError> {
        let backend: Arc<dyn StoreBackend> = match &self.location {
            StoreLocation::Directory(dir) => Arc::new(FileBackend::open(dir.clone()).await?),
            StoreLocation::Memory => Arc::new(MemoryBackend::new()),
        };
        Self::check_schema(backend.as_ref()).await?;
        Ok(backend)
    }

    /// Drop everything written under a different schema version.
    async fn check_schema(backend: &dyn StoreBackend) -> Result<(), StoreError> {
        let records = match backend.read_partition(Partition::Metadata).await {
            Ok(records) => records,
            Err(e @ StoreError::Serialization { .. }) => {
                warn!(error = %e, "Store metadata is corrupt, clearing store");
                return Self::remove_all(backend).await;
            }
            Err(e) => return Err(e),
        };
        let stored = records
            .iter()
            .find(|r| r.key == SYNC_METADATA_KEY)
            .and_then(|r| serde_json::from_value::<SyncMetadata>(r.value.clone()).ok());

        match stored {
            Some(meta) if meta.schema_version != SCHEMA_VERSION => {
                info!(
                    found = meta.schema_version,
                    expected = SCHEMA_VERSION,
                    "Cached data uses an old schema, clearing store"
                );
                Self::remove_all(backend).await
            }
            _ => Ok(()),
        }
    }

    async fn remove_all(backend: &dyn StoreBackend) -> Result<(), StoreError> {
        for partition in Partition::ALL {
            backend.remove_partition(partition).await?;
        }
        Ok(())
    }

    /// Upsert items by identity. Existing keys are replaced in place,
    /// new keys are appended, so reads keep insertion order.
    pub async fn put_many<T: CachedEntity>(
        &self,
        partition: Partition,
        items: &[T],
    ) -> Result<(), StoreError> {
        let backend = self.backend().await?;
        let _guard = self.locks[partition.index()].lock().await;

        let mut records = backend.read_partition(partition).await?;
        for item in items {
            let record = Self::encode(partition, item.cache_key(), item)?;
            match records.iter_mut().find(|r| r.key == record.key) {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        }

        backend.write_partition(partition, records).await?;
        debug!(partition = %partition, count = items.len(), "Partition upserted");
        Ok(())
    }

    /// Overwrite a partition with exactly `items`.
    pub async fn replace_all<T: CachedEntity>(
        &self,
        partition: Partition,
        items: &[T],
    ) -> Result<(), StoreError> {
        let backend = self.backend().await?;
        let records = items
            .iter()
            .map(|item| Self::encode(partition, item.cache_key(), item))
            .collect::<Result<Vec<_>, _>>()?;

        let _guard = self.locks[partition.index()].lock().await;
        backend.write_partition(partition, records).await?;
        debug!(partition = %partition, count = items.len(), "Partition replaced");
        Ok(())
    }

    /// All entries of a partition in insertion order.
    ///
    /// Records that no longer decode as `T` are skipped and logged.
    pub async fn get_all<T: DeserializeOwned>(&self, partition: Partition) -> Result<Vec<T>, StoreError> {
        let backend = self.backend().await?;
        let records = {
            let _guard = self.locks[partition.index()].lock().await;
            backend.read_partition(partition).await?
        };

        Ok(records
            .into_iter()
            .filter_map(|record| match serde_json::from_value(record.value) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(partition = %partition, key = %record.key, error = %e, "Skipping undecodable record");
                    None
                }
            })
            .collect())
    }

    pub async fn put_singleton<T: Serialize>(
        &self,
        partition: Partition,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let backend = self.backend().await?;
        let record = Self::encode(partition, key.to_string(), value)?;

        let _guard = self.locks[partition.index()].lock().await;
        let mut records = backend.read_partition(partition).await?;
        records.retain(|r| r.key != key);
        records.push(record);
        backend.write_partition(partition, records).await
    }

    pub async fn get_singleton<T: DeserializeOwned>(
        &self,
        partition: Partition,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let backend = self.backend().await?;
        let records = {
            let _guard = self.locks[partition.index()].lock().await;
            backend.read_partition(partition).await?
        };

        records
            .into_iter()
            .find(|r| r.key == key)
            .map(|r| {
                serde_json::from_value(r.value).map_err(|source| StoreError::Serialization {
                    partition: partition.name(),
                    source,
                })
            })
            .transpose()
    }

    pub async fn remove_singleton(&self, partition: Partition, key: &str) -> Result<(), StoreError> {
        let backend = self.backend().await?;
        let _guard = self.locks[partition.index()].lock().await;
        let mut records = backend.read_partition(partition).await?;
        let before = records.len();
        records.retain(|r| r.key != key);
        if records.len() != before {
            backend.write_partition(partition, records).await?;
        }
        Ok(())
    }

    /// Remove every partition.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let backend = self.backend().await?;
        for partition in Partition::ALL {
            let _guard = self.locks[partition.index()].lock().await;
            backend.remove_partition(partition).await?;
        }
        info!("Persistent store cleared");
        Ok(())
    }

    // ===== Typed access =====

    /// Write entities to their own partition, honoring their storage slot.
    pub async fn persist<T: CachedEntity>(&self, items: &[T]) -> Result<(), StoreError> {
        match T::SLOT {
            StorageSlot::Keyed => self.put_many(T::PARTITION, items).await,
            StorageSlot::Singleton(key) => match items.first() {
                Some(item) => self.put_singleton(T::PARTITION, key, item).await,
                None => Ok(()),
            },
        }
    }

    pub async fn load<T: CachedEntity>(&self) -> Result<Vec<T>, StoreError> {
        match T::SLOT {
            StorageSlot::Keyed => self.get_all(T::PARTITION).await,
            StorageSlot::Singleton(key) => Ok(self
                .get_singleton(T::PARTITION, key)
                .await?
                .into_iter()
                .collect()),
        }
    }

    /// Like `load`, but a failed read counts as "no cached data".
    pub async fn load_or_empty<T: CachedEntity>(&self) -> Vec<T> {
        match self.load::<T>().await {
            Ok(items) => items,
            Err(e) => {
                debug!(partition = %T::PARTITION, error = %e, "Cache read failed, treating as empty");
                Vec::new()
            }
        }
    }

    // ===== Sync metadata =====

    pub async fn sync_metadata(&self) -> Result<Option<SyncMetadata>, StoreError> {
        self.get_singleton(Partition::Metadata, SYNC_METADATA_KEY).await
    }

    pub async fn record_sync(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.put_singleton(Partition::Metadata, SYNC_METADATA_KEY, &SyncMetadata::synced_at(at))
            .await
    }

    fn encode<T: Serialize + ?Sized>(
        partition: Partition,
        key: String,
        item: &T,
    ) -> Result<Record, StoreError> {
        let value = serde_json::to_value(item).map_err(|source| StoreError::Serialization {
            partition: partition.name(),
            source,
        })?;
        Ok(Record { key, value })
    }
}
