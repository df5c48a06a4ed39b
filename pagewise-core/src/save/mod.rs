//! Debounced persistence of settings and UI state
//!
//! - `retry`: bounded exponential backoff
//! - `manager`: debounce, optimistic cache, conflict resolution and status

mod manager;
mod retry;
mod types;

pub use manager::{SaveConfig, SaveManager};
pub use retry::{RetryConfig, RetryPolicy};
pub use types::{SaveOutcome, SaveState, SaveStatus, VersionedValue};
