use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{Notification, NotificationKind, NotificationRequest, Priority};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Hard bound on queued notifications; the oldest is evicted beyond it
    pub max_queue_size: usize,
    /// Notifications handed to subscribers
    pub max_visible: usize,
    pub default_duration_ms: u64,
    pub error_duration_ms: u64,
    /// Identical repeats inside this window are ignored
    pub throttle_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 20,
            max_visible: 3,
            default_duration_ms: 4000,
            error_duration_ms: 8000,
            throttle_ms: 1000,
        }
    }
}

struct Entry {
    notification: Notification,
    // Bumped on every refresh; a dismiss timer only fires for its own generation
    generation: u64,
    posted_at: Instant,
}

#[derive(Default)]
struct State {
    entries: Vec<Entry>,
    next_generation: u64,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

struct Inner {
    config: NotificationConfig,
    state: Mutex<State>,
    visible: watch::Sender<Vec<Notification>>,
}

/// Notification queue shared by every service that reports to the user
#[derive(Clone)]
pub struct NotificationManager {
    inner: Arc<Inner>,
}

impl NotificationManager {
    pub fn new(config: NotificationConfig) -> Self {
        let (visible, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
                visible,
            }),
        }
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.inner.config
    }

    /// Receive the visible list after every mutation
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.inner.visible.subscribe()
    }

    /// Post a notification and return its id
    ///
    /// A queued notification with the same kind and title is updated in place
    /// and its dismiss timer restarted, unless the message is identical and
    /// was posted inside the throttle window.
    pub fn notify(&self, request: NotificationRequest) -> String {
        let config = &self.inner.config;
        let now = Instant::now();
        let duration_ms = if request.persistent {
            None
        } else {
            Some(request.duration_ms.unwrap_or(match request.kind {
                NotificationKind::Error => config.error_duration_ms,
                _ => config.default_duration_ms,
            }))
        };
        let priority = request
            .priority
            .unwrap_or_else(|| Priority::default_for(request.kind));

        let mut state = self.inner.state.lock();
        let existing = state.entries.iter().position(|e| {
            e.notification.kind == request.kind && e.notification.title == request.title
        });

        let (id, generation) = match existing {
            Some(pos) => {
                let throttle = Duration::from_millis(config.throttle_ms);
                let entry = &state.entries[pos];
                if entry.notification.message == request.message
                    && now.duration_since(entry.posted_at) < throttle
                {
                    debug!("Throttled repeat of notification '{}'", request.title);
                    return entry.notification.id.clone();
                }

                let generation = state.bump();
                let mut entry = state.entries.remove(pos);
                entry.notification.message = request.message;
                entry.notification.priority = priority;
                entry.notification.persistent = request.persistent;
                entry.notification.duration_ms = duration_ms;
                entry.notification.timestamp = Utc::now();
                entry.generation = generation;
                entry.posted_at = now;
                let id = entry.notification.id.clone();
                // Refreshed entries count as the newest
                state.entries.push(entry);
                (id, generation)
            },
            None => {
                let generation = state.bump();
                let notification = Notification {
                    id: Uuid::new_v4().to_string(),
                    kind: request.kind,
                    title: request.title,
                    message: request.message,
                    priority,
                    timestamp: Utc::now(),
                    persistent: request.persistent,
                    duration_ms,
                };
                let id = notification.id.clone();
                debug!("Queued {} notification {}", notification.kind, id);
                state.entries.push(Entry {
                    notification,
                    generation,
                    posted_at: now,
                });

                let max = config.max_queue_size.max(1);
                if state.entries.len() > max {
                    let evicted = state.entries.len() - max;
                    state.entries.drain(..evicted);
                    info!("Evicted {} oldest notifications", evicted);
                }
                (id, generation)
            },
        };
        drop(state);

        self.publish();
        if let Some(ms) = duration_ms {
            self.schedule_dismiss(id.clone(), generation, Duration::from_millis(ms));
        }
        id
    }

    pub fn info(&self, title: impl Into<String>, message: impl Into<String>) -> String {
        self.notify(NotificationRequest::new(NotificationKind::Info, title, message))
    }

    pub fn success(&self, title: impl Into<String>, message: impl Into<String>) -> String {
        self.notify(NotificationRequest::new(
            NotificationKind::Success,
            title,
            message,
        ))
    }

    pub fn warning(&self, title: impl Into<String>, message: impl Into<String>) -> String {
        self.notify(NotificationRequest::new(
            NotificationKind::Warning,
            title,
            message,
        ))
    }

    pub fn error(&self, title: impl Into<String>, message: impl Into<String>) -> String {
        self.notify(NotificationRequest::new(NotificationKind::Error, title, message))
    }

    /// Remove a notification, returning whether it was queued
    pub fn dismiss(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.inner.state.lock();
            let before = state.entries.len();
            state.entries.retain(|e| e.notification.id != id);
            state.entries.len() != before
        };
        if removed {
            self.publish();
        }
        removed
    }

    pub fn clear(&self) {
        self.inner.state.lock().entries.clear();
        self.publish();
    }

    /// Every queued notification, oldest first
    pub fn all(&self) -> Vec<Notification> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .map(|e| e.notification.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest priority first, then most recent, capped at `max_visible`
    pub fn visible(&self) -> Vec<Notification> {
        let state = self.inner.state.lock();
        let mut entries: Vec<&Entry> = state.entries.iter().collect();
        entries.sort_by(|a, b| {
            b.notification
                .priority
                .cmp(&a.notification.priority)
                .then_with(|| b.notification.timestamp.cmp(&a.notification.timestamp))
                .then_with(|| b.generation.cmp(&a.generation))
        });
        entries
            .into_iter()
            .take(self.inner.config.max_visible)
            .map(|e| e.notification.clone())
            .collect()
    }

    fn publish(&self) {
        self.inner.visible.send_replace(self.visible());
    }

    fn schedule_dismiss(&self, id: String, generation: u64, after: Duration) {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            sleep(after).await;
            if let Some(inner) = inner.upgrade() {
                NotificationManager { inner }.expire(&id, generation);
            }
        });
    }

    fn expire(&self, id: &str, generation: u64) {
        let removed = {
            let mut state = self.inner.state.lock();
            let before = state.entries.len();
            state
                .entries
                .retain(|e| !(e.notification.id == id && e.generation == generation));
            state.entries.len() != before
        };
        if removed {
            debug!("Auto-dismissed notification {}", id);
            self.publish();
        }
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new(NotificationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max_queue_size: usize, max_visible: usize) -> NotificationManager {
        NotificationManager::new(NotificationConfig {
            max_queue_size,
            max_visible,
            default_duration_ms: 1000,
            error_duration_ms: 2000,
            throttle_ms: 500,
        })
    }

    async fn advance(ms: u64) {
        sleep(Duration::from_millis(ms)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dedup_replaces_message() {
        let manager = manager(10, 5);
        let first = manager.warning("Save failed", "retrying");
        advance(600).await;
        let second = manager.warning("Save failed", "gave up");

        assert_eq!(first, second);
        let all = manager.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message, "gave up");
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_repeat_is_throttled() {
        let manager = manager(10, 5);
        let mut rx = manager.subscribe();
        manager.info("Copied", "to clipboard");
        rx.borrow_and_update();

        manager.info("Copied", "to clipboard");
        assert!(!rx.has_changed().unwrap());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_is_bounded() {
        let manager = manager(3, 10);
        for i in 0..5 {
            manager.notify(
                NotificationRequest::new(NotificationKind::Info, format!("n{i}"), "").persistent(),
            );
        }

        let titles: Vec<String> = manager.all().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["n2", "n3", "n4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_ordering() {
        let manager = manager(10, 2);
        manager.info("low", "");
        advance(1).await;
        manager.error("urgent", "");
        advance(1).await;
        manager.notify(
            NotificationRequest::new(NotificationKind::Info, "newer low", "")
                .with_priority(Priority::High),
        );

        let visible: Vec<String> = manager.visible().into_iter().map(|n| n.title).collect();
        assert_eq!(visible, vec!["newer low", "urgent"]);
        assert_eq!(*manager.subscribe().borrow(), manager.visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_dismiss() {
        let manager = manager(10, 5);
        manager.info("Saved", "settings stored");
        manager.error("Oops", "network down");

        advance(999).await;
        assert_eq!(manager.len(), 2);
        advance(2).await;
        assert_eq!(manager.len(), 1);
        advance(1000).await;
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_resets_timer() {
        let manager = manager(10, 5);
        manager.info("Sync", "step 1");
        advance(600).await;
        manager.info("Sync", "step 2");

        // The first timer fires at 1000ms but belongs to a stale generation
        advance(600).await;
        assert_eq!(manager.len(), 1);
        advance(500).await;
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_stays_until_dismissed() {
        let manager = manager(10, 5);
        let id = manager.notify(
            NotificationRequest::new(NotificationKind::Error, "Quota", "storage full").persistent(),
        );

        advance(60_000).await;
        assert_eq!(manager.len(), 1);
        assert!(manager.all()[0].duration_ms.is_none());

        assert!(manager.dismiss(&id));
        assert!(!manager.dismiss(&id));
        assert!(manager.is_empty());
    }
}
