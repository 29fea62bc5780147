//! Types for transfer engine operations.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SessionConfig;

/// Errors that can occur during transfer engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Torrent not found: {0}")]
    TorrentNotFound(String),

    #[error("Invalid torrent source: {0}")]
    InvalidSource(String),

    #[error("Operation not supported by this engine: {0}")]
    Unsupported(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

/// State of a transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Waiting for the engine to start it.
    #[default]
    Queued,
    /// Verifying pieces on disk.
    Checking,
    Downloading,
    Seeding,
    Paused,
    Error,
}

impl TorrentState {
    /// Returns the string representation for API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentState::Queued => "queued",
            TorrentState::Checking => "checking",
            TorrentState::Downloading => "downloading",
            TorrentState::Seeding => "seeding",
            TorrentState::Paused => "paused",
            TorrentState::Error => "error",
        }
    }
}

impl fmt::Display for TorrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TorrentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queued" => Ok(TorrentState::Queued),
            "checking" => Ok(TorrentState::Checking),
            "downloading" => Ok(TorrentState::Downloading),
            "seeding" => Ok(TorrentState::Seeding),
            "paused" => Ok(TorrentState::Paused),
            "error" => Ok(TorrentState::Error),
            other => Err(format!("unknown torrent state '{}'", other)),
        }
    }
}

/// A connected peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub ip: String,
    pub port: u16,
    pub client: String,
    /// Peer's own progress (0.0 - 1.0).
    pub progress: f64,
    /// Bytes/s we receive from this peer.
    pub download_rate: u64,
    /// Bytes/s we send to this peer.
    pub upload_rate: u64,
}

/// Point-in-time status of a transfer as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Engine display name, once metadata is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    /// Bytes/s.
    pub download_rate: u64,
    /// Bytes/s.
    pub upload_rate: u64,
    pub num_peers: u32,
    pub state: TorrentState,
    /// One entry per piece; `true` when the piece is complete.
    #[serde(default)]
    pub piece_bitmap: Vec<bool>,
    #[serde(default)]
    pub peers: Vec<PeerInfo>,
    #[serde(default)]
    pub total_size: u64,
    #[serde(default)]
    pub total_downloaded: u64,
    #[serde(default)]
    pub total_uploaded: u64,
}

/// A file inside a torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub index: usize,
    pub path: String,
    pub size: u64,
    /// File priority (0 = skip, 1-7).
    pub priority: u8,
}

/// Where a torrent comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentSource {
    Magnet(String),
    Url(String),
    File(PathBuf),
}

impl TorrentSource {
    /// Classify a source string: magnet link, http(s) URL, or file path.
    pub fn parse(source: &str) -> Self {
        let trimmed = source.trim();
        if trimmed.starts_with("magnet:") {
            TorrentSource::Magnet(trimmed.to_string())
        } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            TorrentSource::Url(trimmed.to_string())
        } else {
            TorrentSource::File(PathBuf::from(trimmed))
        }
    }

    /// Read a file source, mapping IO failures to `InvalidSource`.
    pub async fn read_file(path: &PathBuf) -> Result<Vec<u8>, EngineError> {
        tokio::fs::read(path).await.map_err(|e| {
            EngineError::InvalidSource(format!("cannot read {}: {}", path.display(), e))
        })
    }
}

impl fmt::Display for TorrentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentSource::Magnet(uri) => f.write_str(uri),
            TorrentSource::Url(url) => f.write_str(url),
            TorrentSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Options applied when handing a source to the engine.
///
/// Sources are never added stopped: the engine's queue decides when a new
/// transfer starts unless the registry resumes it right away.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub download_path: Option<String>,
}

/// An engine-side transfer. Owned exclusively by the fleet registry.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// Stable engine key (info hash, lowercase hex).
    fn key(&self) -> &str;

    async fn status(&self) -> Result<StatusSnapshot, EngineError>;

    async fn files(&self) -> Result<Vec<FileEntry>, EngineError>;

    async fn pause(&self) -> Result<(), EngineError>;

    async fn resume(&self) -> Result<(), EngineError>;

    /// Remove from the engine, optionally deleting downloaded data.
    async fn remove(&self, delete_data: bool) -> Result<(), EngineError>;

    /// Torrent-level priority (0-7).
    async fn set_priority(&self, level: u8) -> Result<(), EngineError>;

    async fn set_file_priority(&self, index: usize, level: u8) -> Result<(), EngineError>;

    async fn set_sequential(&self, enabled: bool) -> Result<(), EngineError>;

    async fn set_super_seeding(&self, enabled: bool) -> Result<(), EngineError>;

    /// Tracker URLs the engine announces to, in tier order.
    async fn trackers(&self) -> Result<Vec<String>, EngineError>;

    async fn add_trackers(&self, urls: &[String]) -> Result<(), EngineError>;

    async fn remove_trackers(&self, urls: &[String]) -> Result<(), EngineError>;

    /// Per-torrent download cap in bytes/s; 0 lifts it.
    async fn set_download_limit(&self, bytes_per_sec: u64) -> Result<(), EngineError>;

    /// Per-torrent upload cap in bytes/s; 0 lifts it.
    async fn set_upload_limit(&self, bytes_per_sec: u64) -> Result<(), EngineError>;

    /// Move downloaded data to `path`.
    async fn move_storage(&self, path: &str) -> Result<(), EngineError>;

    async fn force_recheck(&self) -> Result<(), EngineError>;

    /// Serialized `.torrent` metainfo.
    async fn export_torrent_file(&self) -> Result<Vec<u8>, EngineError>;
}

/// Transfer engine abstraction.
///
/// Implementations must be thread-safe (Send + Sync) to allow sharing
/// across async tasks.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Backend name (e.g., "qbittorrent", "librqbit").
    fn name(&self) -> &str;

    /// Hand a source to the engine and return its handle.
    async fn add(
        &self,
        source: &TorrentSource,
        options: &AddOptions,
    ) -> Result<Arc<dyn EngineHandle>, EngineError>;

    /// Apply session-wide settings (rate limits, DHT/LSD/UPnP, connections).
    async fn apply_session_settings(&self, settings: &SessionConfig) -> Result<(), EngineError>;
}

/// Parsed fields of a magnet link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MagnetInfo {
    /// `xt=urn:btih:` value, lowercased.
    pub info_hash: Option<String>,
    /// `dn=` display name.
    pub display_name: Option<String>,
    /// `tr=` trackers, in order.
    pub trackers: Vec<String>,
}

/// Parse the query parameters of a magnet link.
pub fn parse_magnet(uri: &str) -> Option<MagnetInfo> {
    let query = uri.strip_prefix("magnet:?")?;
    let mut info = MagnetInfo::default();

    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = urlencoding::decode(&value.replace('+', " "))
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());
        match key {
            "xt" => {
                if let Some(hash) = value.strip_prefix("urn:btih:") {
                    if !hash.is_empty() {
                        info.info_hash = Some(hash.to_lowercase());
                    }
                }
            }
            "dn" => info.display_name = Some(value),
            "tr" => {
                if !info.trackers.contains(&value) {
                    info.trackers.push(value);
                }
            }
            _ => {}
        }
    }

    Some(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_classification() {
        assert!(matches!(
            TorrentSource::parse("magnet:?xt=urn:btih:abc"),
            TorrentSource::Magnet(_)
        ));
        assert!(matches!(
            TorrentSource::parse("https://example.org/a.torrent"),
            TorrentSource::Url(_)
        ));
        assert!(matches!(
            TorrentSource::parse("/tmp/a.torrent"),
            TorrentSource::File(_)
        ));
    }

    #[test]
    fn test_parse_magnet_fields() {
        let uri = "magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01&dn=Ubuntu+24.04&tr=udp%3A%2F%2Ftracker.example%3A1337&tr=udp%3A%2F%2Fother%3A80";
        let info = parse_magnet(uri).unwrap();
        assert_eq!(
            info.info_hash.as_deref(),
            Some("abcdef0123456789abcdef0123456789abcdef01")
        );
        assert_eq!(info.display_name.as_deref(), Some("Ubuntu 24.04"));
        assert_eq!(
            info.trackers,
            vec!["udp://tracker.example:1337", "udp://other:80"]
        );
    }

    #[test]
    fn test_parse_magnet_rejects_other_schemes() {
        assert!(parse_magnet("http://example.org").is_none());
    }

    #[test]
    fn test_state_from_str() {
        assert_eq!("Seeding".parse::<TorrentState>(), Ok(TorrentState::Seeding));
        assert!("stalled".parse::<TorrentState>().is_err());
    }
}
