//! Author and publication statistics endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use pip_common::models::TemporalStats;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::orchestrator::{AuthorStatsResponse, PublicationStatsResponse};
use crate::AppState;

/// Optional year bounds for temporal statistics
#[derive(Debug, Default, Deserialize)]
pub struct YearRange {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

fn require_id(id: &str, what: &str) -> ApiResult<()> {
    if id.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be blank", what)));
    }
    Ok(())
}

/// GET /api/author/:id
///
/// Always answers with a valid aggregate; when the source has nothing yet the
/// aggregate is empty and `status` is `source_unavailable`.
pub async fn get_author(
    State(state): State<AppState>,
    Path(author_id): Path<String>,
) -> ApiResult<Json<AuthorStatsResponse>> {
    require_id(&author_id, "author id")?;
    Ok(Json(state.orchestrator.get_author_stats(&author_id).await))
}

/// GET /api/author/:id/publications/:publication_id
pub async fn get_publication(
    State(state): State<AppState>,
    Path((author_id, publication_id)): Path<(String, String)>,
) -> ApiResult<Json<PublicationStatsResponse>> {
    require_id(&author_id, "author id")?;
    require_id(&publication_id, "publication id")?;

    state
        .orchestrator
        .get_publication_stats(&author_id, &publication_id)
        .await
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "publication {} is not among the scored publications of {}",
                publication_id, author_id
            ))
        })
}

/// GET /api/author/:id/temporal?start_year=&end_year=
pub async fn get_temporal(
    State(state): State<AppState>,
    Path(author_id): Path<String>,
    Query(range): Query<YearRange>,
) -> ApiResult<Json<TemporalStats>> {
    require_id(&author_id, "author id")?;
    if let (Some(start), Some(end)) = (range.start_year, range.end_year) {
        if start > end {
            return Err(ApiError::BadRequest(format!("start_year {} is after end_year {}", start, end)));
        }
    }

    state
        .orchestrator
        .get_author_temporal_stats(&author_id, range.start_year, range.end_year)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no source data for author {} yet; refresh requested", author_id)))
}

pub fn author_routes() -> Router<AppState> {
    Router::new()
        .route("/api/author/:id", get(get_author))
        .route("/api/author/:id/temporal", get(get_temporal))
        .route("/api/author/:id/publications/:publication_id", get(get_publication))
}
