//! Types for the fleet orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::automation::AutomationError;
use crate::backup::BackupError;
use crate::engine::{EngineError, FileEntry};
use crate::fleet::{FleetError, TorrentEntry};
use crate::rss::RssError;
use crate::scheduler::SchedulerError;
use crate::stats::{DailyStats, FleetTotals, StatSample, StatsError};

/// Errors surfaced by orchestrator commands.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Rss(#[from] RssError),

    #[error(transparent)]
    Automation(#[from] AutomationError),
}

/// Detailed view of one torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentInfo {
    #[serde(flatten)]
    pub entry: TorrentEntry,
    /// Empty when the engine cannot list files.
    pub files: Vec<FileEntry>,
    /// False when the status shown is the cached one.
    pub live: bool,
}

/// Fleet-wide statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetStats {
    pub totals: FleetTotals,
    pub today: DailyStats,
    pub latest_sample: Option<StatSample>,
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub engine: String,
    pub torrents: usize,
    pub schedules: usize,
    pub feeds: usize,
    pub rules: usize,
}
