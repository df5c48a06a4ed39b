//! Per-domain conversation history

mod domain;
mod store;

pub use domain::domain_key;
pub use store::{ConversationRecord, ConversationStore, ConversationStoreConfig};
