//! # pagewise-core
//!
//! Conversation context management for a browser reading assistant.
//!
//! ## Features
//!
//! - **Conversation Store**: per-domain history with TTL expiry and retention trimming
//! - **Context Window**: token budgets, rolling summaries and prompt assembly
//! - **Entities**: pattern or LLM extraction, deduplicated and tracked across pages
//! - **Save Manager**: debounced writes with retry, backoff and conflict resolution
//! - **Notifications**: deduplicated, throttled queue with auto-dismiss
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pagewise_core::{
//!     ContextService, ContextWindowConfig, ContextWindowManager, ConversationStore,
//!     ConversationStoreConfig, EventBus, ExtractiveSummarizer, InMemoryKeyValueStore, Mode,
//!     NotificationManager, PromptOptions, Result,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let kv = Arc::new(InMemoryKeyValueStore::new());
//!     let store = Arc::new(ConversationStore::new(kv, ConversationStoreConfig::default()));
//!     let window = Arc::new(ContextWindowManager::new(
//!         store,
//!         Arc::new(ExtractiveSummarizer::new()),
//!         ContextWindowConfig::default(),
//!     ));
//!     let service = ContextService::new(window, NotificationManager::default(), EventBus::default());
//!
//!     let url = "https://doc.rust-lang.org/book/";
//!     let turn = service
//!         .begin_turn(url, "ownership", &PromptOptions::new(Mode::Explain))
//!         .await?;
//!     println!("{} prompt messages", turn.messages.len());
//!
//!     service
//!         .complete_turn(url, "ownership", "Each value has a single owner.", Mode::Explain)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod conversation;
pub mod entity;
mod errors;
pub mod events;
pub mod llm;
pub mod notification;
pub mod save;
mod service;
pub mod storage;
pub mod tokens;
mod types;

pub use context::{
    AssembledContext, ContextWindowConfig, ContextWindowManager, ExtractiveSummarizer,
    LlmSummarizer, PromptBuilder, PromptOptions, Summarizer,
};
pub use conversation::{ConversationRecord, ConversationStore, ConversationStoreConfig, domain_key};
pub use entity::{
    EntityConfig, EntityExtractor, EntityInfo, EntitySource, EntityTracker, EntityType,
    ExtractionResult, PatternEntityExtractor, select_extractor,
};
pub use errors::{ContextError, Result, StorageError};
pub use events::{AppEvent, EventBus};
pub use llm::{CompletionRequest, LanguageModel, ModelCapabilities, PromptMessage};
pub use notification::{
    Notification, NotificationConfig, NotificationKind, NotificationManager, NotificationRequest,
    Priority,
};
pub use save::{RetryConfig, RetryPolicy, SaveConfig, SaveManager, SaveOutcome, SaveState, SaveStatus};
pub use service::{ContextService, PreparedTurn};
pub use storage::{InMemoryKeyValueStore, JsonFileStore, KeyValueStore, StorageChange};
pub use types::{ConversationMessage, ConversationSummaryBlock, MessageRange, Mode, Role};
