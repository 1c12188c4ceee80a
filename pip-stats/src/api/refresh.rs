//! Refresh endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};

use crate::error::{ApiError, ApiResult};
use crate::orchestrator::{RefreshReport, RefreshRequest};
use crate::AppState;

/// POST /api/refresh
///
/// Returns 202 once tasks are enqueued; fetches complete asynchronously.
pub async fn post_refresh(
    State(state): State<AppState>,
    request: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RefreshReport>)> {
    let Json(request) = request.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let report = state.orchestrator.refresh(&request).await;
    Ok((StatusCode::ACCEPTED, Json(report)))
}

pub fn refresh_routes() -> Router<AppState> {
    Router::new().route("/api/refresh", post(post_refresh))
}
