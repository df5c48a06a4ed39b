//! Conversation data types shared across the crate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Speaker of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction injected by the extension
    System,
    /// The person selecting text
    User,
    /// The model's answer
    Assistant,
}

impl Role {
    /// Label used when rendering a transcript
    pub fn label(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }

    /// Lowercase wire name, as used in chat-completion payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transformation requested for the selected text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Explain the selection in plain words
    #[default]
    Explain,
    /// Condense the selection
    Summarize,
    /// Critical analysis of the selection
    Analyze,
    /// Translate the selection into a target language
    Translate,
    /// Free-form question about the selection
    Free,
}

impl Mode {
    /// All modes, in menu order
    pub fn all() -> [Mode; 5] {
        [
            Mode::Explain,
            Mode::Summarize,
            Mode::Analyze,
            Mode::Translate,
            Mode::Free,
        ]
    }

    /// System instruction sent with this mode
    pub fn instruction(&self) -> &'static str {
        match self {
            Mode::Explain => {
                "Explain the selected text clearly and concisely. Define jargon and give a short example when it helps."
            },
            Mode::Summarize => {
                "Summarize the selected text. Keep the key points and drop repetition."
            },
            Mode::Analyze => {
                "Analyze the selected text: identify its main claims, the evidence offered, and any weaknesses or bias."
            },
            Mode::Translate => {
                "Translate the selected text. Preserve meaning and tone; output only the translation."
            },
            Mode::Free => "Answer the user's request about the selected text.",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Explain => "explain",
            Mode::Summarize => "summarize",
            Mode::Analyze => "analyze",
            Mode::Translate => "translate",
            Mode::Free => "free",
        };
        f.write_str(name)
    }
}

/// A single stored turn. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ConversationMessage {
    /// Create a message stamped with the current time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            mode: None,
            url: None,
        }
    }

    /// Shorthand for a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Shorthand for an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach the mode the turn was made in
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Attach the page the turn came from
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Half-open range `[start, end)` of absolute message indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRange {
    pub start: u64,
    pub end: u64,
}

impl MessageRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Smallest range covering both
    pub fn union(&self, other: &MessageRange) -> MessageRange {
        MessageRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<Range<u64>> for MessageRange {
    fn from(range: Range<u64>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// Rolling summary of the oldest part of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummaryBlock {
    pub covered: MessageRange,
    pub text: String,
    pub token_count: usize,
    pub created_at: DateTime<Utc>,
}

impl ConversationSummaryBlock {
    pub fn new(covered: MessageRange, text: impl Into<String>) -> Self {
        let text = text.into();
        let token_count = crate::tokens::estimate_tokens(&text);
        Self {
            covered,
            text,
            token_count,
            created_at: Utc::now(),
        }
    }
}
