//! Plugin key-value storage
//!
//! Values are scoped by `(plugin identity, key)`. Persistence is the host's
//! business; the in-memory provider covers tests and ephemeral sessions.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Storage backend failure, relayed to the plugin as `[null, reason]`
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage is read-only")]
    ReadOnly,
}

/// Backend for plugin local storage
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Fetch a value; a missing key yields `null`
    async fn get(&self, identity: &str, key: &str) -> Result<Value, StorageError>;

    async fn put(&self, identity: &str, key: &str, value: Value) -> Result<(), StorageError>;
}

/// In-memory storage
#[derive(Debug, Default)]
pub struct MemoryStorageProvider {
    entries: RwLock<HashMap<(String, String), Value>>,
}

impl MemoryStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StorageProvider for MemoryStorageProvider {
    async fn get(&self, identity: &str, key: &str) -> Result<Value, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(identity.to_string(), key.to_string()))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn put(&self, identity: &str, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert((identity.to_string(), key.to_string()), value);
        Ok(())
    }
}

/// Read-only wrapper that refuses writes
#[derive(Debug)]
pub struct ReadOnlyStorageProvider<S: StorageProvider> {
    inner: S,
}

impl<S: StorageProvider> ReadOnlyStorageProvider<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: StorageProvider> StorageProvider for ReadOnlyStorageProvider<S> {
    async fn get(&self, identity: &str, key: &str) -> Result<Value, StorageError> {
        self.inner.get(identity, key).await
    }

    async fn put(&self, _identity: &str, _key: &str, _value: Value) -> Result<(), StorageError> {
        Err(StorageError::ReadOnly)
    }
}
