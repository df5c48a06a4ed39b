use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use pagewise_core::{AppEvent, ContextError, Mode, SaveOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    core::state::AppState,
    models::error::{ApiError, ApiResult},
};

const THEME_KEY: &str = "theme";
const MODE_KEY: &str = "mode";

#[derive(Debug, Deserialize)]
pub struct SaveSettingRequest {
    pub value: Value,
    /// Skip the debounce window
    #[serde(default)]
    pub immediate: bool,
}

#[derive(Debug, Serialize)]
pub struct SaveSettingResponse {
    pub key: String,
    pub pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SaveOutcome>,
}

fn announce(state: &AppState, key: &str, value: &Value) {
    if key == THEME_KEY
        && let Some(theme) = value.as_str()
    {
        state.events.publish(AppEvent::ThemeChanged {
            theme: theme.to_string(),
        });
    }
}

pub async fn put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<SaveSettingRequest>,
) -> ApiResult<impl IntoResponse> {
    if !request.immediate {
        state.save.save(&key, request.value.clone())?;
        announce(&state, &key, &request.value);
        return Ok((
            StatusCode::ACCEPTED,
            Json(SaveSettingResponse {
                key,
                pending: true,
                outcome: None,
            }),
        ));
    }

    match state.save.save_now(&key, request.value.clone()).await? {
        SaveOutcome::Conflict { .. } => Err(ContextError::Conflict { key }.into()),
        outcome => {
            announce(&state, &key, &request.value);
            Ok((
                StatusCode::OK,
                Json(SaveSettingResponse {
                    key,
                    pending: false,
                    outcome: Some(outcome),
                }),
            ))
        },
    }
}

#[derive(Debug, Serialize)]
pub struct SettingResponse {
    pub key: String,
    pub value: Value,
}

pub async fn get_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let value = state
        .save
        .get(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No setting named {key}")))?;

    Ok(Json(SettingResponse { key, value }))
}

#[derive(Debug, Serialize)]
pub struct FlushResponse {
    pub flushed: usize,
}

pub async fn flush_settings(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let flushed = state.save.flush().await?;
    Ok(Json(FlushResponse { flushed }))
}

pub async fn save_status(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.save.status()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModeRequest {
    pub mode: Mode,
}

pub async fn set_mode(
    State(state): State<AppState>,
    Json(request): Json<ModeRequest>,
) -> ApiResult<impl IntoResponse> {
    let value = serde_json::to_value(request.mode)?;
    if let SaveOutcome::Conflict { .. } = state.save.save_now(MODE_KEY, value).await? {
        return Err(ContextError::Conflict {
            key: MODE_KEY.to_string(),
        }
        .into());
    }

    state
        .events
        .publish(AppEvent::ModeChanged { mode: request.mode });
    Ok(Json(request))
}
