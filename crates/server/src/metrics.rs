//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the tamer daemon:
//! - HTTP request metrics (latency, counts)
//! - Fleet gauges (collected at scrape time)
//! - Core subsystem counters re-registered from `tamer_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use tamer_core::engine::TorrentState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "tamer_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tamer_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tamer_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Fleet Metrics (collected dynamically)
// =============================================================================

/// Orchestrator running state (1 = running, 0 = stopped).
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tamer_orchestrator_running",
        "Whether the orchestrator is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Torrents by cached state.
pub static TORRENTS_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("tamer_torrents_by_state", "Current torrent count by state"),
        &["state"],
    )
    .unwrap()
});

/// Aggregate transfer rate by direction.
pub static FLEET_RATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "tamer_fleet_rate_bytes_per_second",
            "Aggregate fleet transfer rate",
        ),
        &["direction"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Fleet
    registry
        .register(Box::new(ORCHESTRATOR_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(TORRENTS_BY_STATE.clone()))
        .unwrap();
    registry.register(Box::new(FLEET_RATE.clone())).unwrap();

    // Core metrics (registry, sampler, scheduler, rss, automation)
    for metric in tamer_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh the fleet gauges from the orchestrator's cached state.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let orchestrator = state.orchestrator();
    ORCHESTRATOR_RUNNING.set(if orchestrator.is_running() { 1 } else { 0 });

    let entries = orchestrator.list(None).await;
    for torrent_state in [
        TorrentState::Queued,
        TorrentState::Checking,
        TorrentState::Downloading,
        TorrentState::Seeding,
        TorrentState::Paused,
        TorrentState::Error,
    ] {
        let count = entries
            .iter()
            .filter(|e| e.last_known_status.state == torrent_state)
            .count();
        TORRENTS_BY_STATE
            .with_label_values(&[torrent_state.as_str()])
            .set(count as i64);
    }

    let down: u64 = entries.iter().map(|e| e.last_known_status.download_rate).sum();
    let up: u64 = entries.iter().map(|e| e.last_known_status.upload_rate).sum();
    FLEET_RATE.with_label_values(&["download"]).set(down as i64);
    FLEET_RATE.with_label_values(&["upload"]).set(up as i64);
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    static NUMERIC: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());
    static DATE: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"/\d{4}-\d{2}-\d{2}(/|$)").unwrap());

    let result = DATE.replace_all(path, "/{date}$1");
    // Adjacent ids share a slash, so run twice.
    let result = NUMERIC.replace_all(&result, "/{id}$1");
    let result = NUMERIC.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/torrents/12"), "/api/v1/torrents/{id}");
        assert_eq!(
            normalize_path("/api/v1/torrents/12/pause"),
            "/api/v1/torrents/{id}/pause"
        );
    }

    #[test]
    fn test_normalize_path_date() {
        assert_eq!(
            normalize_path("/api/v1/stats/daily/2024-05-06"),
            "/api/v1/stats/daily/{date}"
        );
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        ORCHESTRATOR_RUNNING.set(0);

        let output = encode_metrics();
        assert!(output.contains("tamer_http_requests_total"));
        assert!(output.contains("tamer_orchestrator_running"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }
}
