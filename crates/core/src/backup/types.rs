//! Backup snapshot types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SessionConfig;
use crate::fleet::{TorrentEntry, TorrentId};

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backup not found: {0}")]
    NotFound(String),

    #[error("Invalid backup label: {0:?}")]
    InvalidLabel(String),

    #[error("Partial restore failure: {0}")]
    PartialRestoreFailure(RestoreReport),
}

/// Durable description of one fleet entry. Never holds the live handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub source: String,
    pub name: String,
    pub priority: u8,
    pub sequential: bool,
    pub super_seeding: bool,
    #[serde(default)]
    pub trackers: Vec<String>,
    /// KB/s, 0 = unlimited.
    #[serde(default)]
    pub download_limit: u64,
    #[serde(default)]
    pub upload_limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl From<&TorrentEntry> for BackupEntry {
    fn from(entry: &TorrentEntry) -> Self {
        Self {
            source: entry.source.clone(),
            name: entry.name.clone(),
            priority: entry.priority,
            sequential: entry.sequential,
            super_seeding: entry.super_seeding,
            trackers: entry.trackers.clone(),
            download_limit: entry.download_limit,
            upload_limit: entry.upload_limit,
            save_path: Some(entry.save_path.clone()).filter(|p| !p.is_empty()),
            added_at: entry.added_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<BackupEntry>,
    /// Session settings at backup time.
    pub config: SessionConfig,
}

/// A backup file on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    /// File name, usable with `load_backup`.
    pub name: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoredEntry {
    pub source: String,
    pub id: TorrentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreFailure {
    pub source: String,
    pub reason: String,
}

/// Outcome of a restore, one line per snapshot entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub restored: Vec<RestoredEntry>,
    pub failed: Vec<RestoreFailure>,
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} entries failed",
            self.failed.len(),
            self.failed.len() + self.restored.len()
        )?;
        for failure in &self.failed {
            write!(f, "; {}: {}", failure.source, failure.reason)?;
        }
        Ok(())
    }
}
