//! Turn lifecycle
//!
//! [`ContextService`] ties the context window, the prompt builder, the
//! notification queue and the event bus together for one user turn:
//! `begin_turn` before the provider is called, `complete_turn` once it has
//! answered.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::{AssembledContext, ContextWindowManager, PromptBuilder, PromptOptions};
use crate::conversation::{ConversationStore, domain_key};
use crate::errors::Result;
use crate::events::{AppEvent, EventBus};
use crate::llm::PromptMessage;
use crate::notification::NotificationManager;
use crate::types::{ConversationMessage, MessageRange, Mode};

/// Everything the provider client needs for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedTurn {
    pub context: AssembledContext,
    pub messages: Vec<PromptMessage>,
}

pub struct ContextService {
    window: Arc<ContextWindowManager>,
    prompts: PromptBuilder,
    notifications: NotificationManager,
    events: EventBus,
}

impl ContextService {
    pub fn new(
        window: Arc<ContextWindowManager>,
        notifications: NotificationManager,
        events: EventBus,
    ) -> Self {
        Self {
            window,
            prompts: PromptBuilder::new(),
            notifications,
            events,
        }
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn window(&self) -> &Arc<ContextWindowManager> {
        &self.window
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        self.window.store()
    }

    /// Assemble prior context and the prompt payload for a selection
    pub async fn begin_turn(
        &self,
        url: &str,
        selection: &str,
        options: &PromptOptions,
    ) -> Result<PreparedTurn> {
        self.prompts.validate(selection, options)?;

        let context = self.window.prepare(url, selection).await?;
        if let Some(reason) = &context.degraded {
            warn!("Context for {} degraded: {}", context.domain, reason);
            self.notifications.warning(
                "Conversation shortened",
                format!(
                    "Older messages on {} could not be summarized and were dropped.",
                    context.domain
                ),
            );
        }

        let messages = self.prompts.build(selection, Some(&context), options)?;
        Ok(PreparedTurn { context, messages })
    }

    /// Store the user turn and the provider answer
    pub async fn complete_turn(
        &self,
        url: &str,
        user: &str,
        assistant: &str,
        mode: Mode,
    ) -> Result<MessageRange> {
        let domain = domain_key(url);
        let messages = vec![
            ConversationMessage::user(user).with_mode(mode).with_url(url),
            ConversationMessage::assistant(assistant)
                .with_mode(mode)
                .with_url(url),
        ];
        self.store().append_all(&domain, messages).await
    }

    /// Forget a domain's conversation
    pub async fn clear(&self, url: &str) -> Result<bool> {
        let domain = domain_key(url);
        let removed = self.store().clear(&domain).await?;
        if removed {
            info!("Cleared conversation for {}", domain);
            self.events
                .publish(AppEvent::ConversationCleared { domain });
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextWindowConfig, Summarizer};
    use crate::conversation::ConversationStoreConfig;
    use crate::errors::ContextError;
    use crate::notification::{NotificationConfig, NotificationKind};
    use crate::storage::InMemoryKeyValueStore;
    use crate::types::Role;
    use async_trait::async_trait;

    struct BrokenSummarizer;

    #[async_trait]
    impl Summarizer for BrokenSummarizer {
        async fn summarize(
            &self,
            _previous: Option<&str>,
            _messages: &[ConversationMessage],
            _max_tokens: usize,
        ) -> Result<String> {
            Err(ContextError::Timeout { millis: 30_000 })
        }
    }

    fn service(config: ContextWindowConfig) -> (ContextService, NotificationManager, EventBus) {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let store = Arc::new(ConversationStore::new(kv, ConversationStoreConfig::default()));
        let window = Arc::new(ContextWindowManager::new(
            store,
            Arc::new(BrokenSummarizer),
            config,
        ));
        let notifications = NotificationManager::new(NotificationConfig::default());
        let events = EventBus::default();
        (
            ContextService::new(window, notifications.clone(), events.clone()),
            notifications,
            events,
        )
    }

    #[tokio::test]
    async fn test_turn_round_trip() {
        let (service, _, _) = service(ContextWindowConfig::default());
        let url = "https://www.example.com/article";

        let first = service
            .begin_turn(url, "borrow checker", &PromptOptions::new(Mode::Explain))
            .await
            .unwrap();
        assert!(first.context.is_empty());
        assert_eq!(first.messages.len(), 2);

        let range = service
            .complete_turn(url, "borrow checker", "It enforces aliasing rules.", Mode::Explain)
            .await
            .unwrap();
        assert_eq!(range, MessageRange::new(0, 2));

        let second = service
            .begin_turn(url, "lifetimes", &PromptOptions::new(Mode::Explain))
            .await
            .unwrap();
        assert_eq!(second.context.domain, "example.com");
        assert_eq!(second.context.messages.len(), 2);
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages[2].role, Role::User);

        let stored = service.store().history("example.com", None).await.unwrap();
        assert_eq!(stored[0].mode, Some(Mode::Explain));
        assert_eq!(stored[0].url.as_deref(), Some(url));
    }

    #[tokio::test]
    async fn test_invalid_turn_touches_nothing() {
        let (service, _, _) = service(ContextWindowConfig::default());
        let err = service
            .begin_turn("example.com", "hola", &PromptOptions::new(Mode::Translate))
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::Validation(_)));
    }

    #[tokio::test]
    async fn test_degraded_context_posts_warning() {
        let (service, notifications, _) = service(ContextWindowConfig {
            max_context_tokens: 40,
            keep_recent_messages: 1,
            ..Default::default()
        });
        for i in 0..3 {
            service
                .complete_turn("example.com", &format!("question {i}"), &"answer ".repeat(10), Mode::Free)
                .await
                .unwrap();
        }

        let turn = service
            .begin_turn("example.com", "next", &PromptOptions::new(Mode::Free))
            .await
            .unwrap();

        assert!(turn.context.degraded.is_some());
        let posted = notifications.all();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].kind, NotificationKind::Warning);
    }

    #[tokio::test]
    async fn test_clear_publishes_event() {
        let (service, _, events) = service(ContextWindowConfig::default());
        let mut rx = events.subscribe();
        service
            .complete_turn("https://docs.rs/", "q", "a", Mode::Free)
            .await
            .unwrap();

        assert!(service.clear("https://docs.rs/serde").await.unwrap());
        assert!(!service.clear("docs.rs").await.unwrap());
        assert_eq!(
            rx.recv().await.unwrap(),
            AppEvent::ConversationCleared {
                domain: "docs.rs".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
