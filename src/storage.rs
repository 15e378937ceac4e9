use std::collections::HashMap;

use async_trait::async_trait;

pub mod keys;
pub mod memory;
pub mod s3;
pub mod writer;

/// A storage failure names the key (or prefix) involved so run reports can
/// point at the exact object that did not land.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to write {key}: {message}")]
    Write { key: String, message: String },

    #[error("failed to read {key}: {message}")]
    Read { key: String, message: String },

    #[error("failed to list {prefix}: {message}")]
    List { prefix: String, message: String },

    #[error("failed to encode {key}: {message}")]
    Encode { key: String, message: String },
}

/// Object metadata attached at write time.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Minimal object-store surface the pipeline needs. Implemented against
/// S3 in production and an in-memory map for dry runs and tests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, replacing any existing object at the same key.
    async fn put(&self, key: &str, body: Vec<u8>, options: PutOptions)
        -> Result<(), StorageError>;

    /// Read an object. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// List keys under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
