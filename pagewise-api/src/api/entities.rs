use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use pagewise_core::{EntityExtractor, EntityInfo, EntitySource};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    core::state::AppState,
    models::error::{ApiError, ApiResult},
};

fn default_track() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub text: String,
    pub url: String,
    /// Merge the result into the entity index
    #[serde(default = "default_track")]
    pub track: bool,
}

pub async fn extract_entities(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text is empty".to_string()));
    }

    let source = EntitySource::from_url(&request.url);
    let result = state.extractor.extract(&request.text, &source).await?;
    debug!(
        "Extracted {} entities from {}",
        result.entities.len(),
        source.domain
    );

    if request.track {
        state.tracker.observe(result.entities.clone()).await?;
    }

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct EntityQuery {
    pub domain: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EntityListResponse {
    pub entities: Vec<EntityInfo>,
}

pub async fn list_entities(
    State(state): State<AppState>,
    Query(query): Query<EntityQuery>,
) -> ApiResult<impl IntoResponse> {
    let domain = query.domain.as_deref().map(pagewise_core::domain_key);
    let entities = state
        .tracker
        .top(domain.as_deref(), query.limit.unwrap_or(50))
        .await?;

    Ok(Json(EntityListResponse { entities }))
}
