//! Backup API handlers.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tamer_core::{BackupError, BackupInfo, OrchestratorError, RestoreReport};

use super::error::{api_error, ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    #[serde(default = "default_label")]
    pub label: String,
}

fn default_label() -> String {
    "manual".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct RestoreRequest {
    /// Backup file name; the newest backup when omitted.
    #[serde(default)]
    pub name: Option<String>,
}

/// GET /api/v1/backups
pub async fn list_backups(State(state): State<Arc<AppState>>) -> ApiResult<Vec<BackupInfo>> {
    state
        .orchestrator()
        .list_backups()
        .await
        .map(Json)
        .map_err(api_error)
}

/// POST /api/v1/backups
pub async fn create_backup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateBackupRequest>,
) -> Result<(StatusCode, Json<BackupInfo>), ApiError> {
    let info = state
        .orchestrator()
        .create_backup(&request.label)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// POST /api/v1/backups/restore
///
/// A partial failure still answers with the report, as 207.
pub async fn restore_backup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RestoreRequest>,
) -> Result<(StatusCode, Json<RestoreReport>), ApiError> {
    match state
        .orchestrator()
        .restore_backup(request.name.as_deref())
        .await
    {
        Ok(report) => Ok((StatusCode::OK, Json(report))),
        Err(OrchestratorError::Backup(BackupError::PartialRestoreFailure(report))) => {
            Ok((StatusCode::MULTI_STATUS, Json(report)))
        }
        Err(e) => Err(api_error(e)),
    }
}
