//! Storage trait definitions

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::errors::{ContextError, Result, StorageError};

/// Change notification emitted on every successful write or removal
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    /// `None` when the key was removed
    pub new_value: Option<Value>,
}

/// Trait for key/value storage backends
///
/// Implementations must be thread-safe (Send + Sync) as they are shared
/// between the context, entity and save services.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a key, returning whether it existed
    async fn remove(&self, key: &str) -> Result<bool>;

    /// List keys starting with `prefix`
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Subscribe to changes
    fn watch(&self) -> broadcast::Receiver<StorageChange>;
}

/// Read and decode a typed value
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
            ContextError::Storage(StorageError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
        }),
        None => Ok(None),
    }
}

/// Encode and write a typed value
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    store.set(key, serde_json::to_value(value)?).await
}

/// Approximate stored size of an entry, used for quota accounting
pub(crate) fn entry_size(key: &str, value: &Value) -> usize {
    key.len() + value.to_string().len()
}
