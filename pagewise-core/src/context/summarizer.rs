//! Rolling-summary strategies
//!
//! A summarizer folds a block of old messages into the previous summary and
//! returns the new summary text, bounded by a token limit.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{ContextError, Result};
use crate::llm::{CompletionRequest, LanguageModel, PromptMessage};
use crate::tokens::truncate_to_tokens;
use crate::types::{ConversationMessage, Role};

/// Trait for rolling-summary producers
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Fold `messages` into `previous` and return a summary of at most `max_tokens`
    async fn summarize(
        &self,
        previous: Option<&str>,
        messages: &[ConversationMessage],
        max_tokens: usize,
    ) -> Result<String>;
}

static PROPER_NOUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]+)*\b").expect("valid regex"));

const TOPIC_CHARS: usize = 80;
const MAX_TOPICS: usize = 5;
const MAX_TERMS: usize = 12;

/// Rule-based summarizer; needs no model
///
/// Keeps the previous summary, the questions the user asked, the first
/// sentence of each answer and recurring proper nouns.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    pub fn new() -> Self {
        Self
    }

    fn first_sentence(text: &str) -> &str {
        let text = text.trim();
        match text.find(['.', '!', '?', '\n']) {
            Some(end) => &text[..=end],
            None => text,
        }
    }

    fn topic(text: &str) -> String {
        let topic: String = text.trim().chars().take(TOPIC_CHARS).collect();
        topic.replace('\n', " ")
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(
        &self,
        previous: Option<&str>,
        messages: &[ConversationMessage],
        max_tokens: usize,
    ) -> Result<String> {
        if messages.is_empty() && previous.is_none_or(|p| p.trim().is_empty()) {
            return Err(ContextError::Summarization(
                "nothing to summarize".to_string(),
            ));
        }

        let mut topics = Vec::new();
        let mut answers = Vec::new();
        let mut terms: Vec<String> = Vec::new();

        for message in messages {
            match message.role {
                Role::User if topics.len() < MAX_TOPICS => topics.push(Self::topic(&message.content)),
                Role::Assistant if answers.len() < MAX_TOPICS => {
                    answers.push(Self::first_sentence(&message.content).to_string())
                },
                _ => {},
            }

            for m in PROPER_NOUN.find_iter(&message.content) {
                let term = m.as_str();
                if term.len() > 2 && !terms.iter().any(|t| t == term) && terms.len() < MAX_TERMS {
                    terms.push(term.to_string());
                }
            }
        }

        let mut parts = Vec::new();
        if let Some(previous) = previous.map(str::trim).filter(|p| !p.is_empty()) {
            parts.push(previous.to_string());
        }
        if !topics.is_empty() {
            parts.push(format!("Earlier questions: {}", topics.join("; ")));
        }
        if !answers.is_empty() {
            parts.push(format!("Answers covered: {}", answers.join(" ")));
        }
        if !terms.is_empty() {
            parts.push(format!("Key terms: {}", terms.join(", ")));
        }

        let summary = parts.join("\n");
        debug!(
            "Extractive summary of {} messages: {} chars",
            messages.len(),
            summary.len()
        );
        Ok(truncate_to_tokens(&summary, max_tokens))
    }
}

const SUMMARY_PROMPT: &str = "You maintain a running summary of a conversation between a reader and an assistant about web pages. \
Update the summary with the new lines. Keep facts, names, decisions and open questions. \
Answer with the summary only, as one compact paragraph.";

/// Summarizer backed by a [`LanguageModel`]
pub struct LlmSummarizer {
    model: Arc<dyn LanguageModel>,
}

impl LlmSummarizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    fn render(previous: Option<&str>, messages: &[ConversationMessage]) -> String {
        let new_lines = messages
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "PREVIOUS SUMMARY:\n{}\n\nNEW LINES:\n{}\n\nNEW SUMMARY:",
            previous.unwrap_or("(none)"),
            new_lines
        )
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        previous: Option<&str>,
        messages: &[ConversationMessage],
        max_tokens: usize,
    ) -> Result<String> {
        let request = CompletionRequest::new(vec![
            PromptMessage::system(SUMMARY_PROMPT),
            PromptMessage::user(Self::render(previous, messages)),
        ])
        .with_max_tokens(max_tokens)
        .with_temperature(0.2);

        let text = self.model.complete(request).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ContextError::Summarization(
                "model returned an empty summary".to_string(),
            ));
        }

        Ok(truncate_to_tokens(text, max_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;
    use crate::tokens::estimate_tokens;

    fn turns() -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::user("What does Tokio do for Rust programs?"),
            ConversationMessage::assistant(
                "Tokio is an async runtime. It schedules tasks and drives I/O.",
            ),
            ConversationMessage::user("And how does it compare to Smol?"),
        ]
    }

    #[tokio::test]
    async fn test_extractive_summary_contents() {
        let summary = ExtractiveSummarizer::new()
            .summarize(Some("Reader is learning async."), &turns(), 500)
            .await
            .unwrap();

        assert!(summary.starts_with("Reader is learning async."));
        assert!(summary.contains("What does Tokio do for Rust programs?"));
        assert!(summary.contains("Tokio is an async runtime."));
        assert!(!summary.contains("drives I/O"));
        assert!(summary.contains("Smol"));
    }

    #[tokio::test]
    async fn test_extractive_summary_is_bounded() {
        let long: Vec<ConversationMessage> = (0..50)
            .map(|i| ConversationMessage::user(format!("Question number {i} about Kubernetes clusters")))
            .collect();
        let summary = ExtractiveSummarizer::new()
            .summarize(None, &long, 20)
            .await
            .unwrap();
        assert!(estimate_tokens(&summary) <= 20);
    }

    #[tokio::test]
    async fn test_extractive_summary_needs_input() {
        let err = ExtractiveSummarizer::new()
            .summarize(None, &[], 100)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::Summarization(_)));
    }

    #[tokio::test]
    async fn test_llm_summarizer_sends_previous_summary() {
        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .withf(|req| {
                req.messages.len() == 2
                    && req.messages[1].content.contains("PREVIOUS SUMMARY:\nolder stuff")
                    && req.messages[1].content.contains("User: What does Tokio do")
                    && req.max_tokens == Some(64)
            })
            .times(1)
            .returning(|_| Ok("  The reader asked about Tokio.  ".to_string()));

        let summarizer = LlmSummarizer::new(Arc::new(model));
        let summary = summarizer
            .summarize(Some("older stuff"), &turns(), 64)
            .await
            .unwrap();
        assert_eq!(summary, "The reader asked about Tokio.");
    }

    #[tokio::test]
    async fn test_llm_summarizer_rejects_empty_answer() {
        let mut model = MockLanguageModel::new();
        model.expect_complete().returning(|_| Ok("   ".to_string()));

        let err = LlmSummarizer::new(Arc::new(model))
            .summarize(None, &turns(), 64)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::Summarization(_)));
    }
}
