//! User-facing notification queue
//!
//! Notifications are deduplicated per (kind, title), throttled when repeated
//! verbatim, dismissed automatically unless persistent, and bounded in
//! number. Subscribers receive the recomputed visible list on every change.

mod manager;
mod types;

pub use manager::{NotificationConfig, NotificationManager};
pub use types::{Notification, NotificationKind, NotificationRequest, Priority};
