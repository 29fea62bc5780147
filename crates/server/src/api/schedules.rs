//! Schedule API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tamer_core::config::ScheduleConfig;
use tamer_core::scheduler::{FireRecord, ScheduleView};

use super::error::{api_error, ApiError, ApiResult, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ScheduleListResponse {
    pub schedules: Vec<ScheduleView>,
    /// Most recent firings, oldest first.
    pub history: Vec<FireRecord>,
}

/// GET /api/v1/schedules
pub async fn list_schedules(State(state): State<Arc<AppState>>) -> Json<ScheduleListResponse> {
    let orchestrator = state.orchestrator();
    Json(ScheduleListResponse {
        schedules: orchestrator.schedules().await,
        history: orchestrator.schedule_history().await,
    })
}

/// POST /api/v1/schedules
pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScheduleConfig>,
) -> Result<(StatusCode, Json<ScheduleView>), ApiError> {
    let view = state
        .orchestrator()
        .add_schedule(&request)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// DELETE /api/v1/schedules/{name}
pub async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<SuccessResponse> {
    state
        .orchestrator()
        .remove_schedule(&name)
        .await
        .map_err(api_error)?;
    Ok(Json(SuccessResponse {
        message: format!("Schedule {} removed", name),
    }))
}
