//! Context window management
//!
//! Before each user turn the manager checks whether the stored history plus
//! the new turn still fits the token budget. If it does not, the oldest raw
//! messages (everything but the recent tail) are folded into the rolling
//! summary. The assembled context is then trimmed until it fits whatever
//! budget the new turn leaves over.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::conversation::{ConversationRecord, ConversationStore, domain_key};
use crate::entity::{EntityExtractor, EntityInfo, EntitySource, EntityTracker};
use crate::errors::{ContextError, Result};
use crate::tokens::{MESSAGE_OVERHEAD_TOKENS, estimate_tokens, truncate_to_tokens};
use crate::types::{ConversationMessage, ConversationSummaryBlock, MessageRange};

use super::summarizer::Summarizer;

/// Configuration for the context window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextWindowConfig {
    /// Budget for stored context plus the new turn
    pub max_context_tokens: usize,
    /// Raw messages always kept verbatim at the end of the history
    pub keep_recent_messages: usize,
    /// Upper bound on the rolling summary
    pub summary_max_tokens: usize,
    /// Tracked entities listed in the context, if they fit
    pub max_entities: usize,
}

impl Default for ContextWindowConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 3000,
            keep_recent_messages: 6,
            summary_max_tokens: 400,
            max_entities: 8,
        }
    }
}

/// Context ready to be injected into a prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub domain: String,
    pub summary: Option<String>,
    /// Raw messages included, oldest first
    pub messages: Vec<ConversationMessage>,
    pub entities: Vec<EntityInfo>,
    /// Rendered context block
    pub text: String,
    pub token_count: usize,
    /// Tokens the context was allowed to use
    pub budget: usize,
    /// A rolling summary was produced during this call
    pub summarized: bool,
    /// Stored messages removed during this call without being summarized
    pub dropped_messages: usize,
    /// Raw messages left out of `text` to fit the budget
    pub omitted_messages: usize,
    /// Why assembly fell back to truncation, if it did
    pub degraded: Option<String>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// What happened to a summarized block
enum Compaction {
    Applied,
    /// The history moved on while the summary was written
    Stale,
}

struct EntityPipeline {
    extractor: Arc<dyn EntityExtractor>,
    tracker: Arc<EntityTracker>,
}

/// Budget manager over a [`ConversationStore`]
pub struct ContextWindowManager {
    store: Arc<ConversationStore>,
    summarizer: Arc<dyn Summarizer>,
    entities: Option<EntityPipeline>,
    config: ContextWindowConfig,
    /// Serializes the read-summarize-compact cycle per domain
    domain_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ContextWindowManager {
    pub fn new(
        store: Arc<ConversationStore>,
        summarizer: Arc<dyn Summarizer>,
        config: ContextWindowConfig,
    ) -> Self {
        Self {
            store,
            summarizer,
            entities: None,
            config,
            domain_locks: DashMap::new(),
        }
    }

    /// Extract and track entities from every new turn
    pub fn with_entities(
        mut self,
        extractor: Arc<dyn EntityExtractor>,
        tracker: Arc<EntityTracker>,
    ) -> Self {
        self.entities = Some(EntityPipeline { extractor, tracker });
        self
    }

    pub fn config(&self) -> &ContextWindowConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Current token estimate of a domain's stored history
    pub async fn usage(&self, domain: &str) -> Result<usize> {
        Ok(self
            .store
            .record(domain)
            .await?
            .map(|r| r.total_tokens())
            .unwrap_or(0))
    }

    /// Prepare the context for a new user turn on `url`
    ///
    /// The turn itself is not stored; append it once the provider answers.
    pub async fn prepare(&self, url: &str, new_turn: &str) -> Result<AssembledContext> {
        let domain = domain_key(url);
        let budget = self.config.max_context_tokens;
        let turn_tokens = estimate_tokens(new_turn) + MESSAGE_OVERHEAD_TOKENS;

        let mut summarized = false;
        let mut dropped_messages = 0;
        let mut degraded = None;

        let lock = self.domain_locks.entry(domain.clone()).or_default().clone();
        let guard = lock.lock().await;

        let mut record = self.store.record(&domain).await?;
        if let Some(current) = &record
            && current.total_tokens() + turn_tokens > budget
        {
            let block_len = current
                .messages
                .len()
                .saturating_sub(self.config.keep_recent_messages);

            if block_len > 0 {
                info!(
                    "Context for {} is {} tokens over budget, summarizing {} messages",
                    domain,
                    current.total_tokens() + turn_tokens - budget,
                    block_len
                );
                match self.summarize_oldest(current, block_len).await {
                    Ok(Compaction::Applied) => summarized = true,
                    Ok(Compaction::Stale) => {},
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        warn!(
                            "Summarization failed for {}, truncating {} oldest messages: {}",
                            domain, block_len, e
                        );
                        dropped_messages = self.store.drop_oldest(&domain, block_len).await?;
                        degraded = Some(format!("summarization failed: {e}"));
                    },
                }
                record = self.store.record(&domain).await?;
            }
        }
        drop(guard);

        let entities = self.track_entities(url, new_turn).await;

        let available = budget.saturating_sub(turn_tokens);
        let mut context = assemble(domain, record.as_ref(), entities, available);
        context.summarized = summarized;
        context.dropped_messages = dropped_messages;
        context.degraded = degraded;

        debug!(
            "Assembled {} tokens of context for {} ({} messages)",
            context.token_count,
            context.domain,
            context.messages.len()
        );
        Ok(context)
    }

    async fn summarize_oldest(
        &self,
        record: &ConversationRecord,
        block_len: usize,
    ) -> Result<Compaction> {
        let block = &record.messages[..block_len];
        let previous = record.summary.as_ref().map(|s| s.text.as_str());
        let start = record
            .summary
            .as_ref()
            .map(|s| s.covered.start)
            .unwrap_or(record.first_index);
        let covered = MessageRange::new(start, record.first_index + block_len as u64);

        let text = self
            .summarizer
            .summarize(previous, block, self.config.summary_max_tokens)
            .await?;

        match self
            .store
            .compact(&record.domain, ConversationSummaryBlock::new(covered, text))
            .await
        {
            Ok(_) => Ok(Compaction::Applied),
            // Cleared or compacted by another writer in the meantime
            Err(ContextError::Validation(reason) | ContextError::NotFound(reason)) => {
                debug!(
                    "Skipping compaction of {}, history changed: {}",
                    record.domain, reason
                );
                Ok(Compaction::Stale)
            },
            Err(e) => Err(e),
        }
    }

    /// Entity failures never fail the turn
    async fn track_entities(&self, url: &str, new_turn: &str) -> Vec<EntityInfo> {
        let Some(pipeline) = &self.entities else {
            return Vec::new();
        };
        if self.config.max_entities == 0 {
            return Vec::new();
        }

        let source = EntitySource::from_url(url);
        match pipeline.extractor.extract(new_turn, &source).await {
            Ok(result) => {
                if let Err(e) = pipeline.tracker.observe(result.entities).await {
                    warn!("Failed to record entities: {}", e);
                }
            },
            Err(e) => warn!("Entity extraction failed: {}", e),
        }

        match pipeline
            .tracker
            .top(Some(&source.domain), self.config.max_entities)
            .await
        {
            Ok(entities) => entities,
            Err(e) => {
                warn!("Failed to read entity index: {}", e);
                Vec::new()
            },
        }
    }
}

fn render(summary: Option<&str>, entities: &[EntityInfo], messages: &[ConversationMessage]) -> String {
    let mut sections = Vec::new();

    if let Some(summary) = summary {
        sections.push(format!("[Conversation summary]\n{summary}"));
    }
    if !entities.is_empty() {
        let lines = entities
            .iter()
            .map(|e| format!("- {} ({})", e.name, e.entity_type))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("[Known entities]\n{lines}"));
    }
    if !messages.is_empty() {
        let lines = messages
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("[Recent conversation]\n{lines}"));
    }

    sections.join("\n\n")
}

/// Build the context block and trim it until it fits `available` tokens
///
/// Trim order: entities, then oldest raw messages, then the summary text.
fn assemble(
    domain: String,
    record: Option<&ConversationRecord>,
    mut entities: Vec<EntityInfo>,
    available: usize,
) -> AssembledContext {
    let mut summary = record.and_then(|r| r.summary.as_ref().map(|s| s.text.clone()));
    let mut messages: Vec<ConversationMessage> =
        record.map(|r| r.messages.clone()).unwrap_or_default();
    let mut omitted_messages = 0;

    let mut text = render(summary.as_deref(), &entities, &messages);
    while estimate_tokens(&text) > available {
        if !entities.is_empty() {
            entities.pop();
        } else if !messages.is_empty() {
            messages.remove(0);
            omitted_messages += 1;
        } else if let Some(current) = summary.take() {
            let overhead = estimate_tokens(&render(Some(""), &[], &[]));
            let room = available.saturating_sub(overhead);
            if room > 0 {
                summary = Some(truncate_to_tokens(&current, room));
            }
            text = render(summary.as_deref(), &entities, &messages);
            if estimate_tokens(&text) > available {
                text = truncate_to_tokens(&text, available);
            }
            break;
        } else {
            text = truncate_to_tokens(&text, available);
            break;
        }
        text = render(summary.as_deref(), &entities, &messages);
    }

    AssembledContext {
        domain,
        summary,
        messages,
        entities,
        token_count: estimate_tokens(&text),
        text,
        budget: available,
        summarized: false,
        dropped_messages: 0,
        omitted_messages,
        degraded: None,
    }
}
