use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Persistent storage unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error on partition {partition}: {source}")]
    Io {
        partition: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode or decode partition {partition}: {source}")]
    Serialization {
        partition: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
