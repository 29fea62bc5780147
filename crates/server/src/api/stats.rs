//! Statistics API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tamer_core::stats::{DailyStats, PeriodStats};
use tamer_core::FleetStats;

use super::error::{api_error, bad_request, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WeeklyParams {
    /// Last day of the window (YYYY-MM-DD); today when omitted.
    #[serde(default)]
    pub end: Option<String>,
}

fn parse_date(raw: &str) -> Result<NaiveDate, super::error::ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| bad_request(format!("invalid date {:?}: expected YYYY-MM-DD", raw)))
}

/// GET /api/v1/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<FleetStats> {
    state.orchestrator().stats().await.map(Json).map_err(api_error)
}

/// GET /api/v1/stats/daily/{date}
pub async fn get_daily(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> ApiResult<DailyStats> {
    let date = parse_date(&date)?;
    state
        .orchestrator()
        .daily_stats(date)
        .await
        .map(Json)
        .map_err(api_error)
}

/// GET /api/v1/stats/weekly
pub async fn get_weekly(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WeeklyParams>,
) -> ApiResult<PeriodStats> {
    let end = params.end.as_deref().map(parse_date).transpose()?;
    state
        .orchestrator()
        .weekly_stats(end)
        .await
        .map(Json)
        .map_err(api_error)
}
