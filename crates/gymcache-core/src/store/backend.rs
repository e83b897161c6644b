use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{Partition, StoreError};

/// One stored entity: identity key plus its JSON encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: serde_json::Value,
}

/// Raw partition storage. Each call reads or replaces a whole partition;
/// `PersistentStore` layers upsert and typed access on top.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn read_partition(&self, partition: Partition) -> Result<Vec<Record>, StoreError>;

    async fn write_partition(
        &self,
        partition: Partition,
        records: Vec<Record>,
    ) -> Result<(), StoreError>;

    async fn remove_partition(&self, partition: Partition) -> Result<(), StoreError>;
}

/// Ephemeral backend for tests and hosts without a writable cache directory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    partitions: RwLock<HashMap<Partition, Vec<Record>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn read_partition(&self, partition: Partition) -> Result<Vec<Record>, StoreError> {
        let partitions = self.partitions.read().await;
        Ok(partitions.get(&partition).cloned().unwrap_or_default())
    }

    async fn write_partition(
        &self,
        partition: Partition,
        records: Vec<Record>,
    ) -> Result<(), StoreError> {
        self.partitions.write().await.insert(partition, records);
        Ok(())
    }

    async fn remove_partition(&self, partition: Partition) -> Result<(), StoreError> {
        self.partitions.write().await.remove(&partition);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_backend_partitions_are_independent() {
        let backend = MemoryBackend::new();
        let record = Record {
            key: "r1".to_string(),
            value: json!({"id": "r1"}),
        };
        backend
            .write_partition(Partition::Routines, vec![record.clone()])
            .await
            .unwrap();

        assert_eq!(backend.read_partition(Partition::Routines).await.unwrap(), vec![record]);
        assert!(backend.read_partition(Partition::Exercises).await.unwrap().is_empty());

        backend.remove_partition(Partition::Routines).await.unwrap();
        assert!(backend.read_partition(Partition::Routines).await.unwrap().is_empty());
    }
}
