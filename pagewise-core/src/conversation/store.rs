//! Conversation storage on top of a [`KeyValueStore`]
//!
//! Each domain owns one record under `conversation:{domain}`. Records carry
//! absolute message indices so that summary ranges stay meaningful after the
//! oldest raw messages have been compacted away.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::errors::{ContextError, Result};
use crate::storage::{KeyValueStore, get_json, set_json};
use crate::tokens::estimate_messages_tokens;
use crate::types::{ConversationMessage, ConversationSummaryBlock, MessageRange};

use super::domain::domain_key;

const KEY_PREFIX: &str = "conversation:";

/// Configuration for conversation retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationStoreConfig {
    /// Records idle for longer than this are purged
    pub ttl_minutes: i64,
    /// Upper bound on raw messages kept per domain
    pub max_messages: usize,
    /// Interval of the background sweep
    pub cleanup_interval_secs: u64,
}

impl Default for ConversationStoreConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 24 * 60,
            max_messages: 200,
            cleanup_interval_secs: 300,
        }
    }
}

/// Stored history of one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub domain: String,
    /// Raw messages, oldest first
    pub messages: Vec<ConversationMessage>,
    /// Absolute index of `messages[0]`
    pub first_index: u64,
    /// Absolute index the next appended message receives
    pub next_index: u64,
    #[serde(default)]
    pub summary: Option<ConversationSummaryBlock>,
    /// Messages removed without being summarized
    #[serde(default)]
    pub dropped_messages: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    fn new(domain: String) -> Self {
        let now = Utc::now();
        Self {
            domain,
            messages: Vec::new(),
            first_index: 0,
            next_index: 0,
            summary: None,
            dropped_messages: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Absolute index range of the raw messages still held
    pub fn raw_range(&self) -> MessageRange {
        MessageRange::new(self.first_index, self.next_index)
    }

    /// Token estimate of the summary plus every raw message
    pub fn total_tokens(&self) -> usize {
        let summary = self.summary.as_ref().map(|s| s.token_count).unwrap_or(0);
        summary + estimate_messages_tokens(&self.messages)
    }

    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.updated_at > ttl
    }

    fn remove_oldest(&mut self, count: usize) -> usize {
        let count = count.min(self.messages.len());
        self.messages.drain(0..count);
        self.first_index += count as u64;
        count
    }
}

/// Conversation history keyed by domain, with lazy TTL expiry
pub struct ConversationStore {
    kv: Arc<dyn KeyValueStore>,
    config: ConversationStoreConfig,
    // Serializes read-modify-write cycles on records
    write_lock: Mutex<()>,
}

impl ConversationStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: ConversationStoreConfig) -> Self {
        Self {
            kv,
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ConversationStoreConfig {
        &self.config
    }

    fn key_for(domain: &str) -> String {
        format!("{KEY_PREFIX}{domain}")
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.config.ttl_minutes)
    }

    /// Load a record, purging it if it has expired
    async fn load(&self, domain: &str) -> Result<Option<ConversationRecord>> {
        let key = Self::key_for(domain);
        let Some(record) = get_json::<ConversationRecord>(self.kv.as_ref(), &key).await? else {
            return Ok(None);
        };

        if record.is_expired(self.ttl(), Utc::now()) {
            self.kv.remove(&key).await?;
            info!("Purged expired conversation for {}", domain);
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn save(&self, record: &ConversationRecord) -> Result<()> {
        set_json(self.kv.as_ref(), &Self::key_for(&record.domain), record).await
    }

    /// Append a message, returning its absolute index
    pub async fn append(&self, domain: &str, message: ConversationMessage) -> Result<u64> {
        let indices = self.append_all(domain, vec![message]).await?;
        Ok(indices.start)
    }

    /// Append several messages in order, returning their index range
    pub async fn append_all(
        &self,
        domain: &str,
        messages: Vec<ConversationMessage>,
    ) -> Result<MessageRange> {
        let domain = domain_key(domain);
        let _guard = self.write_lock.lock().await;

        let mut record = self
            .load(&domain)
            .await?
            .unwrap_or_else(|| ConversationRecord::new(domain.clone()));

        let start = record.next_index;
        record.next_index += messages.len() as u64;
        record.messages.extend(messages);
        record.updated_at = Utc::now();

        if record.messages.len() > self.config.max_messages {
            let excess = record.messages.len() - self.config.max_messages;
            let removed = record.remove_oldest(excess);
            record.dropped_messages += removed as u64;
            info!(
                "Trimmed {} old messages from conversation {}",
                removed, domain
            );
        }

        self.save(&record).await?;
        debug!(
            "Appended messages {}..{} to {}",
            start, record.next_index, domain
        );
        Ok(MessageRange::new(start, record.next_index))
    }

    /// Most-recent-first history, optionally limited
    pub async fn history(
        &self,
        domain: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationMessage>> {
        let Some(record) = self.load(&domain_key(domain)).await? else {
            return Ok(Vec::new());
        };

        let limit = limit
            .unwrap_or(self.config.max_messages)
            .min(self.config.max_messages);
        Ok(record.messages.into_iter().rev().take(limit).collect())
    }

    /// Full record (chronological messages plus rolling summary)
    pub async fn record(&self, domain: &str) -> Result<Option<ConversationRecord>> {
        self.load(&domain_key(domain)).await
    }

    /// Replace the raw messages covered by `summary` with the summary itself
    ///
    /// The block must end inside the raw range held by the record.
    pub async fn compact(&self, domain: &str, summary: ConversationSummaryBlock) -> Result<usize> {
        let domain = domain_key(domain);
        let _guard = self.write_lock.lock().await;

        let mut record = self
            .load(&domain)
            .await?
            .ok_or_else(|| ContextError::NotFound(format!("conversation for {domain}")))?;

        let raw = record.raw_range();
        if summary.covered.end <= raw.start || summary.covered.end > raw.end {
            return Err(ContextError::Validation(format!(
                "summary range {}..{} does not end inside raw range {}..{}",
                summary.covered.start, summary.covered.end, raw.start, raw.end
            )));
        }

        let removed = record.remove_oldest((summary.covered.end - raw.start) as usize);
        record.summary = Some(summary);
        record.updated_at = Utc::now();
        self.save(&record).await?;

        info!(
            "Compacted {} messages into rolling summary for {}",
            removed, domain
        );
        Ok(removed)
    }

    /// Drop the oldest raw messages without summarizing them
    pub async fn drop_oldest(&self, domain: &str, count: usize) -> Result<usize> {
        let domain = domain_key(domain);
        let _guard = self.write_lock.lock().await;

        let Some(mut record) = self.load(&domain).await? else {
            return Ok(0);
        };

        let removed = record.remove_oldest(count);
        if removed > 0 {
            record.dropped_messages += removed as u64;
            record.updated_at = Utc::now();
            self.save(&record).await?;
        }
        Ok(removed)
    }

    /// Remove a domain's history entirely
    pub async fn clear(&self, domain: &str) -> Result<bool> {
        let domain = domain_key(domain);
        let _guard = self.write_lock.lock().await;
        self.kv.remove(&Self::key_for(&domain)).await
    }

    /// Live domains with their last update time, most recent first
    pub async fn domains(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        let mut domains = Vec::new();
        for key in self.kv.keys(KEY_PREFIX).await? {
            let domain = &key[KEY_PREFIX.len()..];
            if let Some(record) = self.load(domain).await? {
                domains.push((record.domain, record.updated_at));
            }
        }
        domains.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(domains)
    }

    /// Remove every expired record, returning how many were removed
    pub async fn purge_expired(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let ttl = self.ttl();
        let now = Utc::now();
        let mut count = 0;

        for key in self.kv.keys(KEY_PREFIX).await? {
            let Some(record) = get_json::<ConversationRecord>(self.kv.as_ref(), &key).await? else {
                continue;
            };
            if record.is_expired(ttl, now) {
                self.kv.remove(&key).await?;
                count += 1;
            }
        }

        Ok(count)
    }

    /// Spawn the periodic sweep
    pub fn spawn_cleanup(self: Arc<Self>) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.cleanup_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                match self.purge_expired().await {
                    Ok(count) if count > 0 => {
                        info!("Cleaned up {} expired conversations", count);
                    },
                    Err(e) => {
                        error!("Failed to cleanup expired conversations: {}", e);
                    },
                    _ => {},
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryKeyValueStore;
    use crate::types::Role;

    fn store_with(config: ConversationStoreConfig) -> (Arc<InMemoryKeyValueStore>, ConversationStore) {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let store = ConversationStore::new(kv.clone(), config);
        (kv, store)
    }

    #[tokio::test]
    async fn test_append_and_history_order() {
        let (_, store) = store_with(ConversationStoreConfig::default());

        store
            .append("https://example.com/a", ConversationMessage::user("first"))
            .await
            .unwrap();
        let idx = store
            .append("example.com", ConversationMessage::assistant("second"))
            .await
            .unwrap();
        assert_eq!(idx, 1);

        let history = store.history("www.example.com", None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "second");
        assert_eq!(history[0].role, Role::Assistant);
        assert_eq!(history[1].content, "first");

        let limited = store.history("example.com", Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].content, "second");
    }

    #[tokio::test]
    async fn test_domains_are_isolated() {
        let (_, store) = store_with(ConversationStoreConfig::default());
        store
            .append("a.com", ConversationMessage::user("on a"))
            .await
            .unwrap();
        store
            .append("b.com", ConversationMessage::user("on b"))
            .await
            .unwrap();

        assert_eq!(store.history("a.com", None).await.unwrap().len(), 1);
        assert_eq!(store.domains().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retention_trims_oldest() {
        let (_, store) = store_with(ConversationStoreConfig {
            max_messages: 3,
            ..Default::default()
        });

        for i in 0..5 {
            store
                .append("a.com", ConversationMessage::user(format!("m{i}")))
                .await
                .unwrap();
        }

        let record = store.record("a.com").await.unwrap().unwrap();
        assert_eq!(record.messages.len(), 3);
        assert_eq!(record.messages[0].content, "m2");
        assert_eq!(record.raw_range(), MessageRange::new(2, 5));
        assert_eq!(record.dropped_messages, 2);
    }

    #[tokio::test]
    async fn test_expired_record_purged_on_read() {
        let (kv, store) = store_with(ConversationStoreConfig {
            ttl_minutes: 60,
            ..Default::default()
        });
        store
            .append("old.com", ConversationMessage::user("stale"))
            .await
            .unwrap();

        // Age the record past its TTL
        let key = "conversation:old.com";
        let mut record: ConversationRecord = get_json(kv.as_ref(), key).await.unwrap().unwrap();
        record.updated_at = Utc::now() - chrono::Duration::minutes(61);
        set_json(kv.as_ref(), key, &record).await.unwrap();

        assert!(store.history("old.com", None).await.unwrap().is_empty());
        assert_eq!(kv.get(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_expired_sweeps_all() {
        let (kv, store) = store_with(ConversationStoreConfig {
            ttl_minutes: 10,
            ..Default::default()
        });
        store
            .append("fresh.com", ConversationMessage::user("x"))
            .await
            .unwrap();
        store
            .append("stale.com", ConversationMessage::user("y"))
            .await
            .unwrap();

        let key = "conversation:stale.com";
        let mut record: ConversationRecord = get_json(kv.as_ref(), key).await.unwrap().unwrap();
        record.updated_at = Utc::now() - chrono::Duration::minutes(11);
        set_json(kv.as_ref(), key, &record).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        let domains: Vec<String> = store
            .domains()
            .await
            .unwrap()
            .into_iter()
            .map(|(d, _)| d)
            .collect();
        assert_eq!(domains, vec!["fresh.com"]);
    }

    #[tokio::test]
    async fn test_compact_replaces_covered_messages() {
        let (_, store) = store_with(ConversationStoreConfig::default());
        for i in 0..6 {
            store
                .append("a.com", ConversationMessage::user(format!("m{i}")))
                .await
                .unwrap();
        }

        let block = ConversationSummaryBlock::new(MessageRange::new(0, 4), "talked about m0..m3");
        let removed = store.compact("a.com", block.clone()).await.unwrap();
        assert_eq!(removed, 4);

        let record = store.record("a.com").await.unwrap().unwrap();
        assert_eq!(record.summary, Some(block));
        assert_eq!(record.first_index, 4);
        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.dropped_messages, 0);
    }

    #[tokio::test]
    async fn test_compact_rejects_out_of_range_block() {
        let (_, store) = store_with(ConversationStoreConfig::default());
        store
            .append("a.com", ConversationMessage::user("only"))
            .await
            .unwrap();

        let block = ConversationSummaryBlock::new(MessageRange::new(0, 5), "too far");
        let err = store.compact("a.com", block).await.unwrap_err();
        assert!(matches!(err, ContextError::Validation(_)));

        let missing = ConversationSummaryBlock::new(MessageRange::new(0, 1), "nothing");
        let err = store.compact("none.com", missing).await.unwrap_err();
        assert!(matches!(err, ContextError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_drop_oldest_and_clear() {
        let (_, store) = store_with(ConversationStoreConfig::default());
        for i in 0..3 {
            store
                .append("a.com", ConversationMessage::user(format!("m{i}")))
                .await
                .unwrap();
        }

        assert_eq!(store.drop_oldest("a.com", 2).await.unwrap(), 2);
        let record = store.record("a.com").await.unwrap().unwrap();
        assert_eq!(record.messages.len(), 1);
        assert_eq!(record.dropped_messages, 2);

        assert!(store.clear("a.com").await.unwrap());
        assert!(store.record("a.com").await.unwrap().is_none());
        assert_eq!(store.drop_oldest("a.com", 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_history_survives_new_store_instance() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let first = ConversationStore::new(kv.clone(), ConversationStoreConfig::default());
        first
            .append("a.com", ConversationMessage::user("persisted"))
            .await
            .unwrap();

        let second = ConversationStore::new(kv, ConversationStoreConfig::default());
        let history = second.history("a.com", None).await.unwrap();
        assert_eq!(history[0].content, "persisted");
    }
}
