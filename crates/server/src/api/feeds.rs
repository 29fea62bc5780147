//! RSS feed API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tamer_core::config::{FeedConfig, FilterConfig};
use tamer_core::rss::{FeedView, PollReport};

use super::error::{api_error, ApiError, ApiResult, SuccessResponse};
use crate::state::AppState;

/// GET /api/v1/feeds
pub async fn list_feeds(State(state): State<Arc<AppState>>) -> Json<Vec<FeedView>> {
    Json(state.orchestrator().feeds().await)
}

/// POST /api/v1/feeds
pub async fn create_feed(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeedConfig>,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiError> {
    state
        .orchestrator()
        .add_feed(&request)
        .await
        .map_err(api_error)?;
    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse {
            message: format!("Feed {} added", request.feed_id),
        }),
    ))
}

/// DELETE /api/v1/feeds/{id}
pub async fn delete_feed(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
) -> ApiResult<SuccessResponse> {
    state
        .orchestrator()
        .remove_feed(&feed_id)
        .await
        .map_err(api_error)?;
    Ok(Json(SuccessResponse {
        message: format!("Feed {} removed", feed_id),
    }))
}

/// POST /api/v1/feeds/{id}/filters
pub async fn add_filter(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
    Json(request): Json<FilterConfig>,
) -> ApiResult<SuccessResponse> {
    state
        .orchestrator()
        .add_filter(&feed_id, &request)
        .await
        .map_err(api_error)?;
    Ok(Json(SuccessResponse {
        message: format!("Filter added to {}", feed_id),
    }))
}

/// POST /api/v1/feeds/poll
///
/// Poll every feed now, regardless of interval.
pub async fn poll_feeds(State(state): State<Arc<AppState>>) -> Json<Vec<PollReport>> {
    Json(state.orchestrator().poll_feeds().await)
}
