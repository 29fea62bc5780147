//! Fleet torrent API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tamer_core::{AddTorrentOptions, TorrentEntry, TorrentId, TorrentInfo, TorrentState};

use super::error::{api_error, bad_request, ApiError, ApiResult, SuccessResponse};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct AddTorrentRequest {
    /// Magnet link, URL or path readable by the daemon.
    pub source: String,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub sequential: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub status: Option<String>,
    /// Poll the engine before listing instead of reading the cache.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveParams {
    #[serde(default)]
    pub delete_data: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PriorityRequest {
    pub level: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilePriorityRequest {
    pub file_index: usize,
    pub level: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrackersRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

/// KB/s, 0 = unlimited.
#[derive(Debug, Serialize, Deserialize)]
pub struct LimitRequest {
    pub kbps: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MoveStorageRequest {
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TorrentListResponse {
    pub torrents: Vec<TorrentEntry>,
    pub count: usize,
}

impl From<Vec<TorrentEntry>> for TorrentListResponse {
    fn from(torrents: Vec<TorrentEntry>) -> Self {
        let count = torrents.len();
        Self { torrents, count }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/torrents
pub async fn add_torrent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddTorrentRequest>,
) -> Result<(StatusCode, Json<TorrentEntry>), ApiError> {
    let options = AddTorrentOptions {
        priority: request.priority,
        sequential: request.sequential,
    };
    let entry = state
        .orchestrator()
        .add(&request.source, options)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /api/v1/torrents
///
/// List the fleet, optionally filtered by state; `refresh=true` polls the
/// engine first.
pub async fn list_torrents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<TorrentListResponse> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(raw.parse::<TorrentState>().map_err(bad_request)?),
        None => None,
    };
    let entries = if params.refresh {
        state.orchestrator().list_live(status).await
    } else {
        state.orchestrator().list(status).await
    };
    Ok(Json(entries.into()))
}

/// GET /api/v1/torrents/search?q=
pub async fn search_torrents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<TorrentListResponse> {
    Json(state.orchestrator().search(&params.q).await.into())
}

/// GET /api/v1/torrents/{id}
///
/// Detailed view with a fresh status and file list.
pub async fn get_torrent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<TorrentInfo> {
    state
        .orchestrator()
        .info(TorrentId(id))
        .await
        .map(Json)
        .map_err(api_error)
}

/// DELETE /api/v1/torrents/{id}
pub async fn remove_torrent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Query(params): Query<RemoveParams>,
) -> ApiResult<SuccessResponse> {
    state
        .orchestrator()
        .remove(TorrentId(id), params.delete_data)
        .await
        .map_err(api_error)?;
    Ok(Json(SuccessResponse {
        message: format!("Torrent {} removed", id),
    }))
}

pub async fn pause_torrent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<TorrentEntry> {
    state
        .orchestrator()
        .pause(TorrentId(id))
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn resume_torrent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<TorrentEntry> {
    state
        .orchestrator()
        .resume(TorrentId(id))
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn set_priority(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(request): Json<PriorityRequest>,
) -> ApiResult<TorrentEntry> {
    state
        .orchestrator()
        .set_priority(TorrentId(id), request.level)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn set_file_priority(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(request): Json<FilePriorityRequest>,
) -> ApiResult<TorrentEntry> {
    state
        .orchestrator()
        .set_file_priority(TorrentId(id), request.file_index, request.level)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn add_trackers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(request): Json<TrackersRequest>,
) -> ApiResult<TorrentEntry> {
    if request.urls.is_empty() {
        return Err(bad_request("at least one tracker URL is required"));
    }
    state
        .orchestrator()
        .add_trackers(TorrentId(id), &request.urls)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn remove_trackers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(request): Json<TrackersRequest>,
) -> ApiResult<TorrentEntry> {
    if request.urls.is_empty() {
        return Err(bad_request("at least one tracker URL is required"));
    }
    state
        .orchestrator()
        .remove_trackers(TorrentId(id), &request.urls)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn set_sequential(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<TorrentEntry> {
    state
        .orchestrator()
        .set_sequential(TorrentId(id), request.enabled)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn set_super_seeding(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<TorrentEntry> {
    state
        .orchestrator()
        .set_super_seeding(TorrentId(id), request.enabled)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn recheck_torrent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<TorrentEntry> {
    state
        .orchestrator()
        .force_recheck(TorrentId(id))
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn set_download_limit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(request): Json<LimitRequest>,
) -> ApiResult<TorrentEntry> {
    state
        .orchestrator()
        .set_download_limit(TorrentId(id), request.kbps)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn set_upload_limit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(request): Json<LimitRequest>,
) -> ApiResult<TorrentEntry> {
    state
        .orchestrator()
        .set_upload_limit(TorrentId(id), request.kbps)
        .await
        .map(Json)
        .map_err(api_error)
}

/// POST /api/v1/torrents/{id}/move
pub async fn move_storage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(request): Json<MoveStorageRequest>,
) -> ApiResult<TorrentEntry> {
    state
        .orchestrator()
        .move_storage(TorrentId(id), &request.path)
        .await
        .map(Json)
        .map_err(api_error)
}

/// GET /api/v1/torrents/{id}/export
///
/// Raw `.torrent` metainfo.
pub async fn export_torrent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state
        .orchestrator()
        .export(TorrentId(id))
        .await
        .map_err(api_error)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/x-bittorrent".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.torrent\"", id),
            ),
        ],
        bytes,
    ))
}
