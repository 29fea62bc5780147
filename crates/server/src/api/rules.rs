//! Automation rule API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tamer_core::automation::RuleView;

use super::error::{api_error, ApiResult, SuccessResponse};
use crate::state::AppState;

/// GET /api/v1/rules
pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<Vec<RuleView>> {
    Json(state.orchestrator().rules().await)
}

/// POST /api/v1/rules/{id}/enable
pub async fn enable_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
) -> ApiResult<SuccessResponse> {
    state
        .orchestrator()
        .enable_rule(&rule_id)
        .await
        .map_err(api_error)?;
    Ok(Json(SuccessResponse {
        message: format!("Rule {} enabled", rule_id),
    }))
}

/// POST /api/v1/rules/{id}/disable
pub async fn disable_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
) -> ApiResult<SuccessResponse> {
    state
        .orchestrator()
        .disable_rule(&rule_id)
        .await
        .map_err(api_error)?;
    Ok(Json(SuccessResponse {
        message: format!("Rule {} disabled", rule_id),
    }))
}
