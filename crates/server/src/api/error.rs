//! Mapping of orchestrator errors onto HTTP responses.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use tamer_core::{
    AutomationError, BackupError, EngineError, FleetError, OrchestratorError, RssError,
    SchedulerError,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable error class, e.g. `not_found`, `engine_timeout`.
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn error_response(status: StatusCode, kind: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            kind: kind.to_string(),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, "validation", message)
}

/// Status code and kind for an orchestrator error.
pub fn classify(error: &OrchestratorError) -> (StatusCode, &'static str) {
    match error {
        OrchestratorError::Fleet(e) => classify_fleet(e),
        OrchestratorError::Engine(e) => classify_engine(e),
        OrchestratorError::Stats(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        OrchestratorError::Backup(e) => match e {
            BackupError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            BackupError::InvalidLabel(_) => (StatusCode::BAD_REQUEST, "validation"),
            BackupError::PartialRestoreFailure(_) => {
                (StatusCode::MULTI_STATUS, "partial_restore_failure")
            }
            BackupError::Io(_) | BackupError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        },
        OrchestratorError::Scheduler(e) => match e {
            SchedulerError::DuplicateSchedule(_) => (StatusCode::CONFLICT, "duplicate"),
            SchedulerError::ScheduleNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            SchedulerError::InvalidTime(_)
            | SchedulerError::InvalidWeekday(_)
            | SchedulerError::InvalidAction(_) => (StatusCode::BAD_REQUEST, "validation"),
        },
        OrchestratorError::Rss(e) => match e {
            RssError::DuplicateFeed(_) => (StatusCode::CONFLICT, "duplicate"),
            RssError::FeedNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            RssError::InvalidFilter(_) => (StatusCode::BAD_REQUEST, "validation"),
            RssError::FetchFailed { .. } | RssError::FeedParseError(_) => {
                (StatusCode::BAD_GATEWAY, "feed_error")
            }
        },
        OrchestratorError::Automation(e) => match e {
            AutomationError::DuplicateRule(_) => (StatusCode::CONFLICT, "duplicate"),
            AutomationError::RuleNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        },
    }
}

fn classify_fleet(error: &FleetError) -> (StatusCode, &'static str) {
    match error {
        FleetError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        FleetError::InvalidPriority(_) => (StatusCode::BAD_REQUEST, "invalid_priority"),
        FleetError::InvalidFileIndex { .. } => (StatusCode::BAD_REQUEST, "invalid_file_index"),
        FleetError::InvalidPath(_) => (StatusCode::BAD_REQUEST, "validation"),
        FleetError::EngineRejected(_) => (StatusCode::BAD_REQUEST, "engine_rejected"),
        FleetError::EngineTimeout => (StatusCode::GATEWAY_TIMEOUT, "engine_timeout"),
        FleetError::EngineUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "engine_unavailable"),
        FleetError::Engine(e) => classify_engine(e),
    }
}

fn classify_engine(error: &EngineError) -> (StatusCode, &'static str) {
    match error {
        EngineError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "engine_timeout"),
        EngineError::ConnectionFailed(_) | EngineError::AuthenticationFailed(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "engine_unavailable")
        }
        _ => (StatusCode::BAD_GATEWAY, "engine_error"),
    }
}

impl From<OrchestratorError> for ErrorResponse {
    fn from(error: OrchestratorError) -> Self {
        let (_, kind) = classify(&error);
        Self {
            error: error.to_string(),
            kind: kind.to_string(),
        }
    }
}

pub fn api_error(error: OrchestratorError) -> ApiError {
    let (status, _) = classify(&error);
    (status, Json(ErrorResponse::from(error)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tamer_core::TorrentId;

    #[test]
    fn test_fleet_error_statuses() {
        let cases = [
            (FleetError::NotFound(TorrentId(1)), StatusCode::NOT_FOUND),
            (FleetError::InvalidPriority(9), StatusCode::BAD_REQUEST),
            (
                FleetError::InvalidFileIndex { index: 4, count: 2 },
                StatusCode::BAD_REQUEST,
            ),
            (FleetError::InvalidPath(" ".into()), StatusCode::BAD_REQUEST),
            (FleetError::EngineRejected("bad".into()), StatusCode::BAD_REQUEST),
            (FleetError::EngineTimeout, StatusCode::GATEWAY_TIMEOUT),
            (
                FleetError::EngineUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                FleetError::Engine(EngineError::ApiError("500".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, expected) in cases {
            let (status, _) = classify(&OrchestratorError::Fleet(error));
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_duplicates_conflict() {
        let (status, kind) = classify(&OrchestratorError::Rss(RssError::DuplicateFeed("f".into())));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(kind, "duplicate");
    }

    #[test]
    fn test_api_error_body() {
        let (status, Json(body)) = api_error(FleetError::NotFound(TorrentId(42)).into());
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.kind, "not_found");
        assert_eq!(body.error, "Torrent not found: 42");
    }
}
