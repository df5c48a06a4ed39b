//! Token-budgeted context assembly
//!
//! - `summarizer`: rolling-summary strategies (rule-based and LLM-backed)
//! - `window`: the budget manager that decides when to summarize and what to inject
//! - `prompt`: turns an assembled context into chat-completion messages

mod prompt;
mod summarizer;
mod window;

pub use prompt::{PromptBuilder, PromptOptions};
pub use summarizer::{ExtractiveSummarizer, LlmSummarizer, Summarizer};
pub use window::{AssembledContext, ContextWindowConfig, ContextWindowManager};
