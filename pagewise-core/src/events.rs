//! Application event bus
//!
//! Mode, theme and settings changes are published here instead of being
//! passed around as callbacks. Subscribers that fall behind lose the oldest
//! events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::Mode;

const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    ModeChanged { mode: Mode },
    ThemeChanged { theme: String },
    SettingsSaved { key: String, version: DateTime<Utc> },
    ConversationCleared { domain: String },
}

impl AppEvent {
    /// Name used as the SSE event type
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::ModeChanged { .. } => "mode_changed",
            AppEvent::ThemeChanged { .. } => "theme_changed",
            AppEvent::SettingsSaved { .. } => "settings_saved",
            AppEvent::ConversationCleared { .. } => "conversation_cleared",
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to current subscribers, returning how many received it
    pub fn publish(&self, event: AppEvent) -> usize {
        debug!("Publishing {} event", event.name());
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        assert_eq!(bus.publish(AppEvent::ModeChanged { mode: Mode::Analyze }), 1);
        bus.publish(AppEvent::ThemeChanged {
            theme: "dark".to_string(),
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            AppEvent::ModeChanged { mode: Mode::Analyze }
        );
        assert_eq!(rx.recv().await.unwrap().name(), "theme_changed");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(
            bus.publish(AppEvent::ConversationCleared {
                domain: "example.com".to_string()
            }),
            0
        );
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(AppEvent::ModeChanged {
            mode: Mode::Translate,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "mode_changed", "mode": "translate"}));
    }
}
