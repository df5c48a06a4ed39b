//! JSON-file key/value store
//!
//! The whole store is a single JSON object on disk. Every write serializes
//! the full map to a sibling temp file and renames it over the original, so
//! a crash never leaves a half-written document behind.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use crate::errors::{Result, StorageError};

use super::traits::{KeyValueStore, StorageChange};

const WATCH_CAPACITY: usize = 256;

/// File-backed implementation of [`KeyValueStore`]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
    changes: broadcast::Sender<StorageChange>,
    quota_bytes: Option<usize>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Map::new(),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(StorageError::Corrupt {
                        key: path.display().to_string(),
                        reason: "top-level value is not an object".to_string(),
                    }
                    .into());
                },
                Err(e) => {
                    return Err(StorageError::Corrupt {
                        key: path.display().to_string(),
                        reason: e.to_string(),
                    }
                    .into());
                },
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(StorageError::from(e).into()),
        };

        info!(
            "Opened JSON store at {} with {} keys",
            path.display(),
            entries.len()
        );

        let (changes, _) = broadcast::channel(WATCH_CAPACITY);
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            changes,
            quota_bytes: None,
        })
    }

    /// Reject writes that would make the document larger than `bytes`
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &Map<String, Value>) -> Result<()> {
        let bytes = serde_json::to_vec(entries)?;
        if let Some(limit) = self.quota_bytes
            && bytes.len() > limit
        {
            return Err(StorageError::QuotaExceeded {
                used: bytes.len(),
                limit,
            }
            .into());
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StorageError::from)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(StorageError::from)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(StorageError::from)?;
        debug!("Wrote {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(key.to_string(), value.clone());
        self.persist(&next).await?;
        *entries = next;
        drop(entries);

        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
            new_value: Some(value),
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next).await?;
        *entries = next;
        drop(entries);

        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
            new_value: None,
        });
        Ok(true)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock().await;
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn watch(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ContextError;
    use serde_json::json;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        store.set("settings:theme", json!("dark")).await.unwrap();
        store.set("settings:mode", json!("explain")).await.unwrap();
        store.remove("settings:mode").await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("settings:theme").await.unwrap(),
            Some(json!("dark"))
        );
        assert_eq!(reopened.get("settings:mode").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("nested/none.json"))
            .await
            .unwrap();
        assert!(store.keys("").await.unwrap().is_empty());

        // Parent directories are created on first write
        store.set("k", json!(1)).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, b"[1, 2, 3]").await.unwrap();

        let err = JsonFileStore::open(&path).await.err().unwrap();
        assert!(matches!(
            err,
            ContextError::Storage(StorageError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_quota_keeps_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileStore::open(&path).await.unwrap().with_quota(40);

        store.set("a", json!("small")).await.unwrap();
        let err = store.set("b", json!("y".repeat(100))).await.unwrap_err();
        assert!(!err.is_retryable());

        assert_eq!(store.get("b").await.unwrap(), None);
        let on_disk: Value = serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(on_disk, json!({"a": "small"}));
    }
}
