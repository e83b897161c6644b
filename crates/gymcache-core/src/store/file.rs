use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::{Partition, Record, StoreBackend, StoreError};

/// Name of the scratch file written when probing that the directory accepts writes.
const PROBE_FILE: &str = ".write-probe";

/// Stores each partition as one JSON document in a cache directory.
///
/// Writes go to a temporary file that is renamed over the partition file,
/// so a reader never observes a half-written partition.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Create the directory if needed and check that it is writable.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", dir.display(), e)))?;

        let probe = dir.join(PROBE_FILE);
        tokio::fs::write(&probe, b"ok")
            .await
            .map_err(|e| StoreError::Unavailable(format!("{} is not writable: {}", dir.display(), e)))?;
        let _ = tokio::fs::remove_file(&probe).await;

        debug!(dir = %dir.display(), "File store opened");
        Ok(Self { dir })
    }

    fn partition_path(&self, partition: Partition) -> PathBuf {
        self.dir.join(format!("{}.json", partition.name()))
    }

    fn temp_path(&self, partition: Partition) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", partition.name()))
    }
}

#[async_trait]
impl StoreBackend for FileBackend {
    async fn read_partition(&self, partition: Partition) -> Result<Vec<Record>, StoreError> {
        let path = self.partition_path(partition);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    partition: partition.name(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| StoreError::Serialization {
            partition: partition.name(),
            source,
        })
    }

    async fn write_partition(
        &self,
        partition: Partition,
        records: Vec<Record>,
    ) -> Result<(), StoreError> {
        let contents =
            serde_json::to_string_pretty(&records).map_err(|source| StoreError::Serialization {
                partition: partition.name(),
                source,
            })?;

        let temp = self.temp_path(partition);
        let io_err = |source| StoreError::Io {
            partition: partition.name(),
            source,
        };
        tokio::fs::write(&temp, contents).await.map_err(io_err)?;
        tokio::fs::rename(&temp, self.partition_path(partition))
            .await
            .map_err(io_err)?;
        Ok(())
    }

    async fn remove_partition(&self, partition: Partition) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.partition_path(partition)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                partition: partition.name(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_then_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path().join("store")).await.unwrap();

        let records = vec![
            Record { key: "b".to_string(), value: json!({"id": "b"}) },
            Record { key: "a".to_string(), value: json!({"id": "a"}) },
        ];
        backend.write_partition(Partition::Exercises, records.clone()).await.unwrap();

        // A fresh backend over the same directory sees the data
        let reopened = FileBackend::open(dir.path().join("store")).await.unwrap();
        assert_eq!(reopened.read_partition(Partition::Exercises).await.unwrap(), records);
        assert!(!backend.temp_path(Partition::Exercises).exists());
    }

    #[tokio::test]
    async fn test_missing_partition_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();
        assert!(backend.read_partition(Partition::Routines).await.unwrap().is_empty());
        backend.remove_partition(Partition::Routines).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_fails_when_path_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let err = FileBackend::open(&blocker).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_corrupt_partition_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();
        std::fs::write(backend.partition_path(Partition::Membership), "{not json").unwrap();

        let err = backend.read_partition(Partition::Membership).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { partition: "membership", .. }));
    }
}
