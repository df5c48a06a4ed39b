//! In-memory key/value store
//!
//! Data is lost when the process exits.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

use crate::errors::{Result, StorageError};

use super::traits::{KeyValueStore, StorageChange, entry_size};

const WATCH_CAPACITY: usize = 256;

/// DashMap-backed implementation of [`KeyValueStore`]
pub struct InMemoryKeyValueStore {
    entries: DashMap<String, Value>,
    changes: broadcast::Sender<StorageChange>,
    writes: AtomicUsize,
    quota_bytes: Option<usize>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            entries: DashMap::new(),
            changes,
            writes: AtomicUsize::new(0),
            quota_bytes: None,
        }
    }

    /// Reject writes that would grow the store past `bytes`
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    /// Number of successful `set` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn used_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| entry_size(entry.key(), entry.value()))
            .sum()
    }
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        if let Some(limit) = self.quota_bytes {
            let previous = self
                .entries
                .get(key)
                .map(|v| entry_size(key, v.value()))
                .unwrap_or(0);
            let used = self.used_bytes() - previous + entry_size(key, &value);
            if used > limit {
                return Err(StorageError::QuotaExceeded { used, limit }.into());
            }
        }

        self.entries.insert(key.to_string(), value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("Stored key: {}", key);

        // No subscribers is fine
        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
            new_value: Some(value),
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let existed = self.entries.remove(key).is_some();
        if existed {
            let _ = self.changes.send(StorageChange {
                key: key.to_string(),
                new_value: None,
            });
        }
        Ok(existed)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn watch(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
