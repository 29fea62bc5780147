//! Types for the fleet registry.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{EngineError, StatusSnapshot};

/// Highest torrent/file priority level.
pub const MAX_PRIORITY: u8 = 7;

/// Priority used when neither the caller nor the config sets one.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Errors from fleet operations.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Torrent not found: {0}")]
    NotFound(TorrentId),

    #[error("Invalid priority {0}: must be between 0 and 7")]
    InvalidPriority(i64),

    #[error("Invalid file index {index}: torrent has {count} files")]
    InvalidFileIndex { index: usize, count: usize },

    #[error("Invalid storage path: {0:?}")]
    InvalidPath(String),

    #[error("Engine rejected source: {0}")]
    EngineRejected(String),

    #[error("Engine call timed out")]
    EngineTimeout,

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Engine error: {0}")]
    Engine(EngineError),
}

impl FleetError {
    /// Classify an engine failure on an existing torrent.
    pub fn from_engine(error: EngineError) -> Self {
        match error {
            EngineError::Timeout => FleetError::EngineTimeout,
            EngineError::ConnectionFailed(msg) | EngineError::AuthenticationFailed(msg) => {
                FleetError::EngineUnavailable(msg)
            }
            other => FleetError::Engine(other),
        }
    }

    /// Classify an engine failure while adding a source.
    pub fn from_add(error: EngineError) -> Self {
        match error {
            EngineError::InvalidSource(msg) | EngineError::ApiError(msg) => {
                FleetError::EngineRejected(msg)
            }
            EngineError::Unsupported(msg) => FleetError::EngineRejected(msg),
            other => Self::from_engine(other),
        }
    }
}

/// Validate a priority level (0-7).
pub fn validate_priority(level: i64) -> Result<u8, FleetError> {
    if (0..=MAX_PRIORITY as i64).contains(&level) {
        Ok(level as u8)
    } else {
        Err(FleetError::InvalidPriority(level))
    }
}

/// Stable torrent identifier, assigned at add time and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TorrentId(pub u64);

impl fmt::Display for TorrentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TorrentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(TorrentId)
    }
}

/// A torrent tracked by the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentEntry {
    pub id: TorrentId,
    /// Magnet link, URL or file path as given at add time.
    pub source: String,
    pub name: String,
    /// Engine key (info hash).
    pub info_hash: String,
    pub added_at: DateTime<Utc>,
    pub priority: u8,
    pub sequential: bool,
    pub super_seeding: bool,
    /// Ordered, duplicate-free.
    pub trackers: Vec<String>,
    /// Per-torrent caps in KB/s, 0 = unlimited.
    #[serde(default)]
    pub download_limit: u64,
    #[serde(default)]
    pub upload_limit: u64,
    /// Where the engine stores the data.
    #[serde(default)]
    pub save_path: String,
    pub last_known_status: StatusSnapshot,
}

/// Caller-supplied add options; `None` falls back to session defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddTorrentOptions {
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub sequential: Option<bool>,
}

impl AddTorrentOptions {
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = Some(sequential);
        self
    }
}
