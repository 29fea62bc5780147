//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Fleet registry (adds, removes, engine timeouts)
//! - Statistics sampler
//! - Scheduler, RSS pipeline and automation rules

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, Opts};

// =============================================================================
// Fleet Metrics
// =============================================================================

/// Add attempts by result.
pub static FLEET_ADDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tamer_fleet_adds_total", "Total torrent add attempts"),
        &["result"], // "added", "rejected", "failed"
    )
    .unwrap()
});

/// Torrents removed from the fleet.
pub static FLEET_REMOVES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tamer_fleet_removes_total", "Total torrents removed").unwrap()
});

/// Engine calls that exceeded their timeout.
pub static ENGINE_TIMEOUTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tamer_engine_timeouts_total", "Engine calls that timed out"),
        &["operation"],
    )
    .unwrap()
});

// =============================================================================
// Sampler Metrics
// =============================================================================

/// Statistics samples recorded.
pub static STATS_SAMPLES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tamer_stats_samples_total", "Statistics samples recorded").unwrap()
});

/// Per-torrent sampling failures.
pub static STATS_SAMPLE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tamer_stats_sample_failures_total",
        "Torrents that could not be sampled",
    )
    .unwrap()
});

// =============================================================================
// Background Subsystem Metrics
// =============================================================================

/// Schedule firings by outcome.
pub static SCHEDULE_FIRES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tamer_schedule_fires_total", "Schedule firings"),
        &["outcome"], // "fired", "skipped_missing_target", "failed"
    )
    .unwrap()
});

/// Feed polls by result.
pub static FEED_POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tamer_feed_polls_total", "RSS feed polls"),
        &["result"], // "success", "fetch_error", "parse_error"
    )
    .unwrap()
});

/// Feed items handed to the registry.
pub static FEED_ITEMS_ACQUIRED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tamer_feed_items_total", "RSS items processed"),
        &["result"], // "acquired", "add_failed"
    )
    .unwrap()
});

/// Automation rule firings by result.
pub static RULE_FIRES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tamer_rule_fires_total", "Automation rule firings"),
        &["result"], // "success", "action_error"
    )
    .unwrap()
});

/// Condition evaluations that errored or panicked.
pub static RULE_CONDITION_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tamer_rule_condition_errors_total",
        "Automation conditions that failed to evaluate",
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Fleet
        Box::new(FLEET_ADDS.clone()),
        Box::new(FLEET_REMOVES.clone()),
        Box::new(ENGINE_TIMEOUTS.clone()),
        // Sampler
        Box::new(STATS_SAMPLES.clone()),
        Box::new(STATS_SAMPLE_FAILURES.clone()),
        // Background subsystems
        Box::new(SCHEDULE_FIRES.clone()),
        Box::new(FEED_POLLS.clone()),
        Box::new(FEED_ITEMS_ACQUIRED.clone()),
        Box::new(RULE_FIRES.clone()),
        Box::new(RULE_CONDITION_ERRORS.clone()),
    ]
}
