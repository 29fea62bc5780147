//! RSS pipeline types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{FeedConfig, FilterConfig};
use crate::fleet::{TorrentId, DEFAULT_PRIORITY};

#[derive(Debug, Error)]
pub enum RssError {
    #[error("Failed to fetch {url}: {message}")]
    FetchFailed { url: String, message: String },

    #[error("Feed parse error: {0}")]
    FeedParseError(String),

    #[error("Feed already exists: {0}")]
    DuplicateFeed(String),

    #[error("Feed not found: {0}")]
    FeedNotFound(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

/// Title filter attached to a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedFilter {
    pub pattern: String,
    /// Treat `pattern` as a regular expression instead of a substring.
    #[serde(default)]
    pub regex: bool,
    #[serde(default = "default_filter_priority")]
    pub priority: u8,
    /// Matching items are vetoed.
    #[serde(default)]
    pub exclude: bool,
}

fn default_filter_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl FeedFilter {
    pub fn include(pattern: &str, priority: u8) -> Self {
        Self {
            pattern: pattern.to_string(),
            regex: false,
            priority,
            exclude: false,
        }
    }

    pub fn exclude(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            regex: false,
            priority: DEFAULT_PRIORITY,
            exclude: true,
        }
    }
}

impl From<&FilterConfig> for FeedFilter {
    fn from(config: &FilterConfig) -> Self {
        Self {
            pattern: config.pattern.clone(),
            regex: config.regex,
            priority: config.priority,
            exclude: config.exclude,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub feed_id: String,
    pub url: String,
    pub filters: Vec<FeedFilter>,
    pub poll_interval: Duration,
}

impl Feed {
    pub fn from_config(config: &FeedConfig, default_poll_interval: Duration) -> Self {
        Self {
            feed_id: config.feed_id.clone(),
            url: config.url.clone(),
            filters: config.filters.iter().map(FeedFilter::from).collect(),
            poll_interval: config
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(default_poll_interval),
        }
    }
}

/// One parsed feed item.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    /// GUID, else link.
    pub key: String,
    pub title: String,
    /// Magnet link, else enclosure URL, else link.
    pub source: Option<String>,
}

/// Read-only view of a registered feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedView {
    pub feed_id: String,
    pub url: String,
    pub filters: Vec<FeedFilter>,
    pub poll_interval_secs: u64,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub seen_items: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquiredItem {
    pub key: String,
    pub title: String,
    pub torrent_id: TorrentId,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub key: String,
    pub reason: String,
}

/// Result of polling one feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollReport {
    pub feed_id: String,
    pub acquired: Vec<AcquiredItem>,
    /// Items no filter accepted.
    pub filtered: usize,
    pub already_seen: usize,
    pub failed: Vec<ItemFailure>,
    /// Fetch or parse failure; no items were processed.
    pub error: Option<String>,
}
