//! Token estimation
//!
//! Provider tokenizers are not available here, so counts are estimated at
//! roughly four characters per token, rounded up.

use crate::types::ConversationMessage;

/// Approximate characters per token
pub const CHARS_PER_TOKEN: usize = 4;

/// Fixed cost charged per message for role markers and separators
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Estimate the token count of a piece of text
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate the token count of one stored message
pub fn estimate_message_tokens(message: &ConversationMessage) -> usize {
    estimate_tokens(&message.content) + MESSAGE_OVERHEAD_TOKENS
}

/// Sum of [`estimate_message_tokens`] over a slice
pub fn estimate_messages_tokens(messages: &[ConversationMessage]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Cut `text` so that [`estimate_tokens`] of the result is at most `max_tokens`
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
