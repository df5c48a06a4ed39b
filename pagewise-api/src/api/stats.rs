use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde::Serialize;

use crate::{
    core::{config::StorageBackend, state::AppState},
    models::error::ApiResult,
};

#[derive(Debug, Serialize)]
pub struct SystemStats {
    pub version: &'static str,
    pub uptime_secs: i64,
    pub storage: StorageBackend,
    pub conversations: usize,
    pub entities: usize,
    pub pending_saves: usize,
    pub notifications: usize,
    pub event_subscribers: usize,
}

pub async fn get_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let stats = SystemStats {
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        storage: state.backend,
        conversations: state.service.store().domains().await?.len(),
        entities: state.tracker.all().await?.len(),
        pending_saves: state.save.pending_count(),
        notifications: state.notifications.len(),
        event_subscribers: state.events.subscriber_count(),
    };

    Ok(Json(stats))
}
