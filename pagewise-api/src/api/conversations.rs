use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use pagewise_core::{ConversationMessage, ConversationSummaryBlock};
use serde::{Deserialize, Serialize};

use crate::{
    core::state::AppState,
    models::error::{ApiError, ApiResult},
};

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub domain: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub first_index: u64,
    pub next_index: u64,
    pub dropped_messages: u64,
    pub total_tokens: usize,
    pub summary: Option<ConversationSummaryBlock>,
    /// Oldest first
    pub messages: Vec<ConversationMessage>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Keep only the most recent `limit` messages
    pub limit: Option<usize>,
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let record = state
        .service
        .store()
        .record(&domain)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No conversation for {domain}")))?;

    let total_tokens = record.total_tokens();
    let mut messages = record.messages;
    if let Some(limit) = query.limit
        && messages.len() > limit
    {
        messages.drain(..messages.len() - limit);
    }

    Ok(Json(ConversationResponse {
        domain: record.domain,
        created_at: record.created_at,
        updated_at: record.updated_at,
        first_index: record.first_index,
        next_index: record.next_index,
        dropped_messages: record.dropped_messages,
        total_tokens,
        summary: record.summary,
        messages,
    }))
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub domain: String,
    pub updated_at: DateTime<Utc>,
}

pub async fn list_conversations(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let conversations = state.service.store().domains().await?;

    let response = ConversationListResponse {
        conversations: conversations
            .into_iter()
            .map(|(domain, updated_at)| ConversationSummary { domain, updated_at })
            .collect(),
    };

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub domain: String,
    pub deleted: bool,
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.service.clear(&domain).await? {
        return Err(ApiError::NotFound(format!("No conversation for {domain}")));
    }

    Ok(Json(DeleteResponse {
        domain: pagewise_core::domain_key(&domain),
        deleted: true,
    }))
}
