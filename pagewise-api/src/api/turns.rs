use axum::{Json, extract::State, response::IntoResponse};
use pagewise_core::{MessageRange, Mode, PromptOptions, domain_key};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{core::state::AppState, models::error::ApiResult};

#[derive(Debug, Deserialize)]
pub struct BeginTurnRequest {
    pub url: String,
    pub selection: String,
    #[serde(default)]
    pub mode: Mode,
    pub target_language: Option<String>,
    pub instruction: Option<String>,
    pub page_title: Option<String>,
}

pub async fn begin_turn(
    State(state): State<AppState>,
    Json(request): Json<BeginTurnRequest>,
) -> ApiResult<impl IntoResponse> {
    let options = PromptOptions {
        mode: request.mode,
        target_language: request.target_language,
        instruction: request.instruction,
        page_title: request.page_title,
    };

    let turn = state
        .service
        .begin_turn(&request.url, &request.selection, &options)
        .await?;

    info!(
        "Prepared {} turn for {} with {} context tokens",
        options.mode, turn.context.domain, turn.context.token_count
    );
    Ok(Json(turn))
}

#[derive(Debug, Deserialize)]
pub struct CompleteTurnRequest {
    pub url: String,
    pub user: String,
    pub assistant: String,
    #[serde(default)]
    pub mode: Mode,
}

#[derive(Debug, Serialize)]
pub struct CompleteTurnResponse {
    pub domain: String,
    pub range: MessageRange,
}

pub async fn complete_turn(
    State(state): State<AppState>,
    Json(request): Json<CompleteTurnRequest>,
) -> ApiResult<impl IntoResponse> {
    let range = state
        .service
        .complete_turn(&request.url, &request.user, &request.assistant, request.mode)
        .await?;

    Ok(Json(CompleteTurnResponse {
        domain: domain_key(&request.url),
        range,
    }))
}
