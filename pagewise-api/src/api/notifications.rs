use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use pagewise_core::{Notification, NotificationRequest};
use serde::Serialize;

use crate::{
    core::state::AppState,
    models::error::{ApiError, ApiResult},
};

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    /// What the UI should show, highest priority first
    pub visible: Vec<Notification>,
    pub queued: usize,
}

pub async fn list_notifications(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(NotificationListResponse {
        visible: state.notifications.visible(),
        queued: state.notifications.len(),
    }))
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: String,
}

pub async fn post_notification(
    State(state): State<AppState>,
    Json(request): Json<NotificationRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is empty".to_string()));
    }

    let id = state.notifications.notify(request);
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn dismiss_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.notifications.dismiss(&id) {
        return Err(ApiError::NotFound(format!("No notification {id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}
