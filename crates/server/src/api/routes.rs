use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{
    backups, feeds, handlers, middleware::metrics_middleware, rules, schedules, stats, torrents,
};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and status
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        // Torrents
        .route("/torrents", get(torrents::list_torrents))
        .route("/torrents", post(torrents::add_torrent))
        .route("/torrents/search", get(torrents::search_torrents))
        .route("/torrents/{id}", get(torrents::get_torrent))
        .route("/torrents/{id}", delete(torrents::remove_torrent))
        .route("/torrents/{id}/pause", post(torrents::pause_torrent))
        .route("/torrents/{id}/resume", post(torrents::resume_torrent))
        .route("/torrents/{id}/priority", post(torrents::set_priority))
        .route("/torrents/{id}/file-priority", post(torrents::set_file_priority))
        .route("/torrents/{id}/trackers/add", post(torrents::add_trackers))
        .route("/torrents/{id}/trackers/remove", post(torrents::remove_trackers))
        .route("/torrents/{id}/sequential", post(torrents::set_sequential))
        .route("/torrents/{id}/super-seeding", post(torrents::set_super_seeding))
        .route("/torrents/{id}/recheck", post(torrents::recheck_torrent))
        .route("/torrents/{id}/download-limit", post(torrents::set_download_limit))
        .route("/torrents/{id}/upload-limit", post(torrents::set_upload_limit))
        .route("/torrents/{id}/move", post(torrents::move_storage))
        .route("/torrents/{id}/export", get(torrents::export_torrent))
        // Statistics
        .route("/stats", get(stats::get_stats))
        .route("/stats/daily/{date}", get(stats::get_daily))
        .route("/stats/weekly", get(stats::get_weekly))
        // Schedules
        .route("/schedules", get(schedules::list_schedules))
        .route("/schedules", post(schedules::create_schedule))
        .route("/schedules/{name}", delete(schedules::delete_schedule))
        // Feeds
        .route("/feeds", get(feeds::list_feeds))
        .route("/feeds", post(feeds::create_feed))
        .route("/feeds/poll", post(feeds::poll_feeds))
        .route("/feeds/{id}", delete(feeds::delete_feed))
        .route("/feeds/{id}/filters", post(feeds::add_filter))
        // Automation rules
        .route("/rules", get(rules::list_rules))
        .route("/rules/{id}/enable", post(rules::enable_rule))
        .route("/rules/{id}/disable", post(rules::disable_rule))
        // Backups
        .route("/backups", get(backups::list_backups))
        .route("/backups", post(backups::create_backup))
        .route("/backups/restore", post(backups::restore_backup));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
