use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope written for every saved value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedValue {
    pub data: Value,
    /// When the value was changed locally; the newest version wins
    pub version: DateTime<Utc>,
    /// Id of the manager instance that wrote it
    pub writer: String,
}

impl VersionedValue {
    /// Decode a stored value; anything that is not an envelope has no version
    pub fn from_stored(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SaveState {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveStatus {
    pub state: SaveState,
    /// Key of the save that produced this state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SaveStatus {
    pub fn idle() -> Self {
        Self::new(SaveState::Idle, None, None)
    }

    pub(crate) fn new(state: SaveState, key: Option<String>, message: Option<String>) -> Self {
        Self {
            state,
            key,
            message,
            updated_at: Utc::now(),
        }
    }
}

impl Default for SaveStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// Result of one persisted save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SaveOutcome {
    Saved { version: DateTime<Utc> },
    /// Storage held a newer value, which replaced the local one
    Conflict { stored: VersionedValue },
}
