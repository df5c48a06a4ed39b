use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::{ContextError, Result};
use crate::events::{AppEvent, EventBus};
use crate::notification::NotificationManager;
use crate::storage::{KeyValueStore, set_json};

use super::retry::{RetryConfig, RetryPolicy};
use super::types::{SaveOutcome, SaveState, SaveStatus, VersionedValue};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Quiet period before a debounced save is written
    pub debounce_ms: u64,
    /// Delay before a finished save returns the status to idle
    pub reset_delay_ms: u64,
    /// Prefix of the storage keys holding saved values
    pub key_prefix: String,
    pub retry: RetryConfig,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            reset_delay_ms: 2000,
            key_prefix: "settings:".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

struct Pending {
    value: Value,
    changed_at: DateTime<Utc>,
    generation: u64,
}

/// Debounced, retrying writer for settings and UI state
///
/// Values are visible through [`SaveManager::get`] as soon as they are
/// saved; the storage write happens after the debounce window. Conflicts are
/// settled by the version timestamp: a stored value changed later than the
/// local one wins and replaces the local copy.
pub struct SaveManager {
    kv: Arc<dyn KeyValueStore>,
    config: SaveConfig,
    retry: RetryPolicy,
    writer: String,
    local: DashMap<String, Value>,
    pending: DashMap<String, Pending>,
    /// One writer at a time per key, so the version check and the write
    /// are not interleaved with another save of the same key
    write_locks: DashMap<String, Arc<Mutex<()>>>,
    next_generation: AtomicU64,
    status: watch::Sender<SaveStatus>,
    status_generation: AtomicU64,
    notifications: Option<NotificationManager>,
    events: Option<EventBus>,
}

impl SaveManager {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: SaveConfig) -> Self {
        let (status, _) = watch::channel(SaveStatus::idle());
        Self {
            kv,
            retry: RetryPolicy::new(config.retry.clone()),
            config,
            writer: Uuid::new_v4().to_string(),
            local: DashMap::new(),
            pending: DashMap::new(),
            write_locks: DashMap::new(),
            next_generation: AtomicU64::new(0),
            status,
            status_generation: AtomicU64::new(0),
            notifications: None,
            events: None,
        }
    }

    /// Report failed saves as error notifications
    pub fn with_notifications(mut self, notifications: NotificationManager) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Publish [`AppEvent::SettingsSaved`] after each successful write
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &SaveConfig {
        &self.config
    }

    /// Id stamped into every envelope this manager writes
    pub fn writer_id(&self) -> &str {
        &self.writer
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.subscribe()
    }

    /// Number of keys waiting for their debounce window to close
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Schedule a debounced save
    ///
    /// Saves to the same key inside the window collapse into one write of
    /// the last value.
    pub fn save(self: &Arc<Self>, key: &str, value: Value) -> Result<()> {
        let key = validate_key(key)?;
        self.local.insert(key.clone(), value.clone());

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending.insert(
            key.clone(),
            Pending {
                value,
                changed_at: Utc::now(),
                generation,
            },
        );
        debug!("Scheduled save of {} (generation {})", key, generation);

        let manager = Arc::clone(self);
        let delay = Duration::from_millis(self.config.debounce_ms);
        tokio::spawn(async move {
            sleep(delay).await;
            let Some((_, pending)) = manager
                .pending
                .remove_if(&key, |_, p| p.generation == generation)
            else {
                return;
            };
            if let Err(e) = manager.persist(&key, pending.value, pending.changed_at).await {
                debug!("Debounced save of {} ended with: {}", key, e);
            }
        });

        Ok(())
    }

    /// Write immediately, superseding any pending debounced value for the key
    pub async fn save_now(self: &Arc<Self>, key: &str, value: Value) -> Result<SaveOutcome> {
        let key = validate_key(key)?;
        self.local.insert(key.clone(), value.clone());
        self.pending.remove(&key);
        self.persist(&key, value, Utc::now()).await
    }

    /// Write every pending debounced value now
    ///
    /// Returns the number of keys written, or the first error after trying
    /// them all.
    pub async fn flush(self: &Arc<Self>) -> Result<usize> {
        let keys: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut flushed = 0;
        let mut first_error = None;

        for key in keys {
            let Some((_, pending)) = self.pending.remove(&key) else {
                continue;
            };
            match self.persist(&key, pending.value, pending.changed_at).await {
                Ok(_) => flushed += 1,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                },
            }
        }

        if flushed > 0 {
            info!("Flushed {} pending saves", flushed);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(flushed),
        }
    }

    /// Drop a pending debounced save
    pub fn cancel(&self, key: &str) -> bool {
        let cancelled = self.pending.remove(key).is_some();
        if cancelled {
            debug!("Cancelled pending save of {}", key);
        }
        cancelled
    }

    /// Current value, local changes included
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = validate_key(key)?;
        if let Some(value) = self.local.get(&key) {
            return Ok(Some(value.clone()));
        }

        let value = self
            .kv
            .get(&self.storage_key(&key))
            .await?
            .map(|stored| match VersionedValue::from_stored(stored.clone()) {
                Some(envelope) => envelope.data,
                None => stored,
            });
        if let Some(value) = &value {
            self.local.insert(key, value.clone());
        }
        Ok(value)
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    async fn persist(
        self: &Arc<Self>,
        key: &str,
        value: Value,
        changed_at: DateTime<Utc>,
    ) -> Result<SaveOutcome> {
        let lock = self.write_locks.entry(key.to_string()).or_default().clone();
        let _guard = lock.lock().await;

        self.set_status(SaveState::Saving, Some(key), None);

        let this: &SaveManager = self;
        let storage_key = self.storage_key(key);
        let storage_key = storage_key.as_str();
        let value = &value;
        let result = self
            .retry
            .execute(&format!("Save of {key}"), move || {
                this.write_once(storage_key, value, changed_at)
            })
            .await;

        match result {
            Ok(SaveOutcome::Saved { version }) => {
                info!("Saved {} (version {})", key, version);
                self.set_status(SaveState::Saved, Some(key), None);
                if let Some(events) = &self.events {
                    events.publish(AppEvent::SettingsSaved {
                        key: key.to_string(),
                        version,
                    });
                }
                self.schedule_reset();
                Ok(SaveOutcome::Saved { version })
            },
            Ok(SaveOutcome::Conflict { stored }) => {
                // A newer local change still pending keeps priority
                if !self.pending.contains_key(key) {
                    self.local.insert(key.to_string(), stored.data.clone());
                }
                self.report_conflict(key, &stored);
                Ok(SaveOutcome::Conflict { stored })
            },
            Err(e) if e.is_cancelled() => {
                debug!("Save of {} cancelled", key);
                self.set_status(SaveState::Idle, None, None);
                Err(e)
            },
            Err(e) => {
                error!("Failed to save {}: {}", key, e);
                self.set_status(SaveState::Error, Some(key), Some(e.to_string()));
                if let Some(notifications) = &self.notifications {
                    notifications.error("Save failed", format!("Could not save {key}: {e}"));
                }
                self.schedule_reset();
                Err(e)
            },
        }
    }

    async fn write_once(
        &self,
        storage_key: &str,
        value: &Value,
        changed_at: DateTime<Utc>,
    ) -> Result<SaveOutcome> {
        if let Some(stored) = self.kv.get(storage_key).await?
            && let Some(stored) = VersionedValue::from_stored(stored)
            && stored.version > changed_at
        {
            return Ok(SaveOutcome::Conflict { stored });
        }

        let envelope = VersionedValue {
            data: value.clone(),
            version: changed_at,
            writer: self.writer.clone(),
        };
        set_json(self.kv.as_ref(), storage_key, &envelope).await?;
        Ok(SaveOutcome::Saved {
            version: changed_at,
        })
    }

    fn set_status(&self, state: SaveState, key: Option<&str>, message: Option<String>) {
        self.status_generation.fetch_add(1, Ordering::SeqCst);
        self.status.send_replace(SaveStatus::new(
            state,
            key.map(str::to_string),
            message,
        ));
    }

    /// Report a save that lost to a newer stored version
    fn report_conflict(self: &Arc<Self>, key: &str, stored: &VersionedValue) {
        if stored.writer == self.writer {
            // Superseded by a later save of our own, nothing to resolve
            debug!(
                "Save of {} superseded by version {} from this writer",
                key, stored.version
            );
            self.set_status(SaveState::Saved, Some(key), None);
        } else {
            warn!(
                "Storage holds a newer value for {} from {}, keeping it",
                key, stored.writer
            );
            self.set_status(
                SaveState::Conflict,
                Some(key),
                Some(format!(
                    "a newer value was saved by writer {} at {}",
                    stored.writer, stored.version
                )),
            );
        }
        self.schedule_reset();
    }

    fn schedule_reset(self: &Arc<Self>) {
        let generation = self.status_generation.load(Ordering::SeqCst);
        let manager = Arc::downgrade(self);
        let delay = Duration::from_millis(self.config.reset_delay_ms);
        tokio::spawn(async move {
            sleep(delay).await;
            if let Some(manager) = manager.upgrade()
                && manager.status_generation.load(Ordering::SeqCst) == generation
            {
                manager.status.send_replace(SaveStatus::idle());
            }
        });
    }
}

fn validate_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ContextError::Validation("save key is empty".to_string()));
    }
    Ok(key.to_string())
}
