//! Mock transfer engine for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::SessionConfig;
use crate::engine::{
    parse_magnet, AddOptions, EngineError, EngineHandle, FileEntry, PeerInfo, StatusSnapshot,
    TorrentSource, TorrentState, TransferEngine,
};

/// Files created for every mock torrent.
pub const MOCK_FILE_COUNT: usize = 3;

/// A recorded add for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedAdd {
    pub source: String,
    pub download_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Engine-side state of a mock torrent.
#[derive(Debug, Clone)]
pub struct MockTorrent {
    pub key: String,
    pub source: String,
    pub name: String,
    pub state: TorrentState,
    pub progress: f64,
    pub download_rate: u64,
    pub upload_rate: u64,
    pub num_peers: u32,
    pub priority: u8,
    pub sequential: bool,
    pub super_seeding: bool,
    pub trackers: Vec<String>,
    /// Bytes/s, 0 = unlimited.
    pub download_limit: u64,
    pub upload_limit: u64,
    pub save_path: Option<String>,
    pub files: Vec<FileEntry>,
    pub peers: Vec<PeerInfo>,
    pub total_size: u64,
    pub rechecks: u32,
    pub metainfo: Vec<u8>,
}

impl MockTorrent {
    fn snapshot(&self) -> StatusSnapshot {
        let pieces = 16;
        let have = (self.progress * pieces as f64).floor() as usize;
        StatusSnapshot {
            name: Some(self.name.clone()),
            progress: self.progress,
            download_rate: self.download_rate,
            upload_rate: self.upload_rate,
            num_peers: self.num_peers,
            state: self.state,
            piece_bitmap: (0..pieces).map(|i| i < have).collect(),
            peers: self.peers.clone(),
            total_size: self.total_size,
            total_downloaded: (self.total_size as f64 * self.progress) as u64,
            total_uploaded: 0,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    torrents: HashMap<String, MockTorrent>,
    added: Vec<RecordedAdd>,
    removed: Vec<(String, bool)>,
    rejected_sources: HashSet<String>,
    next_add_error: Option<EngineError>,
    failing_keys: HashSet<String>,
    failing_operations: HashSet<String>,
    stall: Option<Duration>,
    session_settings: Option<SessionConfig>,
    counter: u64,
}

/// Mock implementation of the TransferEngine trait.
///
/// Provides controllable behavior for testing:
/// - Track added and removed torrents for assertions
/// - Control torrent progress/state/rates
/// - Simulate rejections, per-torrent failures and stalled calls
///
/// # Example
///
/// ```rust,ignore
/// let engine = Arc::new(MockEngine::new());
/// let registry = FleetRegistry::new(engine.clone(), RegistryConfig::default());
///
/// let id = registry.add(&test_magnet(1, "debian"), Default::default()).await?;
/// let key = registry.get(id).await?.info_hash;
///
/// engine.set_progress(&key, 1.0).await; // Complete
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    state: Arc<RwLock<MockState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded add calls, including rejected ones.
    pub async fn added(&self) -> Vec<RecordedAdd> {
        self.state.read().await.added.clone()
    }

    /// Keys handed to `remove`, with their delete-data flag.
    pub async fn removed(&self) -> Vec<(String, bool)> {
        self.state.read().await.removed.clone()
    }

    pub async fn torrent(&self, key: &str) -> Option<MockTorrent> {
        self.state.read().await.torrents.get(key).cloned()
    }

    pub async fn torrent_count(&self) -> usize {
        self.state.read().await.torrents.len()
    }

    /// Make `add` reject this exact source.
    pub async fn reject_source(&self, source: &str) {
        self.state
            .write()
            .await
            .rejected_sources
            .insert(source.to_string());
    }

    /// The next `add` fails with this error.
    pub async fn set_next_add_error(&self, error: EngineError) {
        self.state.write().await.next_add_error = Some(error);
    }

    /// Every handle call for this key fails.
    pub async fn fail_key(&self, key: &str) {
        self.state.write().await.failing_keys.insert(key.to_string());
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.write().await;
        state.failing_keys.clear();
        state.failing_operations.clear();
    }

    /// Every handle call of this operation fails (e.g. "set_sequential").
    pub async fn fail_operation(&self, operation: &str) {
        self.state
            .write()
            .await
            .failing_operations
            .insert(operation.to_string());
    }

    /// Delay every engine call by `delay` (stalled engine).
    pub async fn set_stall(&self, delay: Option<Duration>) {
        self.state.write().await.stall = delay;
    }

    /// Mutate a torrent in place. Returns false when the key is unknown.
    pub async fn update<F>(&self, key: &str, f: F) -> bool
    where
        F: FnOnce(&mut MockTorrent),
    {
        match self.state.write().await.torrents.get_mut(key) {
            Some(torrent) => {
                f(torrent);
                true
            }
            None => false,
        }
    }

    /// Set progress; 1.0 switches the torrent to seeding.
    pub async fn set_progress(&self, key: &str, progress: f64) -> bool {
        self.update(key, |t| {
            t.progress = progress.clamp(0.0, 1.0);
            if t.progress >= 1.0
                && matches!(t.state, TorrentState::Downloading | TorrentState::Queued)
            {
                t.state = TorrentState::Seeding;
                t.download_rate = 0;
            }
        })
        .await
    }

    pub async fn set_rates(&self, key: &str, download_rate: u64, upload_rate: u64) -> bool {
        self.update(key, |t| {
            t.download_rate = download_rate;
            t.upload_rate = upload_rate;
        })
        .await
    }

    /// Forget a torrent as if it was removed outside the registry.
    pub async fn forget(&self, key: &str) {
        self.state.write().await.torrents.remove(key);
    }

    pub async fn session_settings(&self) -> Option<SessionConfig> {
        self.state.read().await.session_settings.clone()
    }

    async fn stall(&self) {
        let delay = self.state.read().await.stall;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn derive_name(source: &TorrentSource, magnet_name: Option<String>, counter: u64) -> String {
        if let Some(name) = magnet_name {
            return name;
        }
        match source {
            TorrentSource::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("torrent-{}", counter)),
            TorrentSource::Url(url) => url
                .rsplit('/')
                .next()
                .map(|s| s.trim_end_matches(".torrent").to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("torrent-{}", counter)),
            TorrentSource::Magnet(_) => format!("torrent-{}", counter),
        }
    }
}

#[async_trait]
impl TransferEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn add(
        &self,
        source: &TorrentSource,
        options: &AddOptions,
    ) -> Result<Arc<dyn EngineHandle>, EngineError> {
        self.stall().await;

        let source_text = source.to_string();
        let (magnet_hash, magnet_name, trackers) = match source {
            TorrentSource::Magnet(uri) => {
                let info = parse_magnet(uri).unwrap_or_default();
                (info.info_hash, info.display_name, info.trackers)
            }
            _ => (None, None, Vec::new()),
        };

        let metainfo = match source {
            TorrentSource::File(path) => Some(TorrentSource::read_file(path).await),
            _ => None,
        };

        let mut state = self.state.write().await;
        state.added.push(RecordedAdd {
            source: source_text.clone(),
            download_path: options.download_path.clone(),
            timestamp: Utc::now(),
        });

        if let Some(error) = state.next_add_error.take() {
            return Err(error);
        }
        if state.rejected_sources.contains(&source_text) {
            return Err(EngineError::InvalidSource(source_text));
        }
        if matches!(source, TorrentSource::Magnet(_)) && magnet_hash.is_none() {
            return Err(EngineError::InvalidSource(format!(
                "malformed magnet link: {}",
                source_text
            )));
        }
        let metainfo = match metainfo {
            Some(result) => result?,
            None => b"d4:infod4:name4:mockee".to_vec(),
        };

        state.counter += 1;
        let counter = state.counter;
        let key = magnet_hash.unwrap_or_else(|| format!("{:040x}", counter));

        if !state.torrents.contains_key(&key) {
            let name = Self::derive_name(source, magnet_name, counter);
            let files = (0..MOCK_FILE_COUNT)
                .map(|index| FileEntry {
                    index,
                    path: format!("{}/file{}.bin", name, index),
                    size: 1024 * 1024,
                    priority: 1,
                })
                .collect();
            state.torrents.insert(
                key.clone(),
                MockTorrent {
                    key: key.clone(),
                    source: source_text,
                    name,
                    // Left to the queue until resumed
                    state: TorrentState::Queued,
                    progress: 0.0,
                    download_rate: 0,
                    upload_rate: 0,
                    num_peers: 0,
                    priority: 5,
                    sequential: false,
                    super_seeding: false,
                    trackers,
                    download_limit: 0,
                    upload_limit: 0,
                    save_path: options.download_path.clone(),
                    files,
                    peers: Vec::new(),
                    total_size: 3 * 1024 * 1024,
                    rechecks: 0,
                    metainfo,
                },
            );
        }

        Ok(Arc::new(MockHandle {
            key,
            engine: self.clone(),
        }))
    }

    async fn apply_session_settings(&self, settings: &SessionConfig) -> Result<(), EngineError> {
        self.stall().await;
        self.state.write().await.session_settings = Some(settings.clone());
        Ok(())
    }
}

/// Handle onto a mock torrent.
pub struct MockHandle {
    key: String,
    engine: MockEngine,
}

impl MockHandle {
    /// Apply a mutation after the stall/failure checks.
    async fn with_torrent<T, F>(&self, operation: &str, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut MockTorrent) -> Result<T, EngineError>,
    {
        self.engine.stall().await;
        let mut state = self.engine.state.write().await;
        if state.failing_keys.contains(&self.key) || state.failing_operations.contains(operation) {
            return Err(EngineError::ApiError(format!(
                "mock failure: {} on {}",
                operation, self.key
            )));
        }
        let torrent = state
            .torrents
            .get_mut(&self.key)
            .ok_or_else(|| EngineError::TorrentNotFound(self.key.clone()))?;
        f(torrent)
    }
}

#[async_trait]
impl EngineHandle for MockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn status(&self) -> Result<StatusSnapshot, EngineError> {
        self.with_torrent("status", |t| Ok(t.snapshot())).await
    }

    async fn files(&self) -> Result<Vec<FileEntry>, EngineError> {
        self.with_torrent("files", |t| Ok(t.files.clone())).await
    }

    async fn pause(&self) -> Result<(), EngineError> {
        self.with_torrent("pause", |t| {
            t.state = TorrentState::Paused;
            Ok(())
        })
        .await
    }

    async fn resume(&self) -> Result<(), EngineError> {
        self.with_torrent("resume", |t| {
            t.state = if t.progress >= 1.0 {
                TorrentState::Seeding
            } else {
                TorrentState::Downloading
            };
            Ok(())
        })
        .await
    }

    async fn remove(&self, delete_data: bool) -> Result<(), EngineError> {
        self.with_torrent("remove", |_| Ok(())).await?;
        let mut state = self.engine.state.write().await;
        state.torrents.remove(&self.key);
        state.removed.push((self.key.clone(), delete_data));
        Ok(())
    }

    async fn set_priority(&self, level: u8) -> Result<(), EngineError> {
        self.with_torrent("set_priority", |t| {
            t.priority = level;
            Ok(())
        })
        .await
    }

    async fn set_file_priority(&self, index: usize, level: u8) -> Result<(), EngineError> {
        self.with_torrent("set_file_priority", |t| {
            let file = t
                .files
                .get_mut(index)
                .ok_or_else(|| EngineError::ApiError(format!("no file {}", index)))?;
            file.priority = level;
            Ok(())
        })
        .await
    }

    async fn set_sequential(&self, enabled: bool) -> Result<(), EngineError> {
        self.with_torrent("set_sequential", |t| {
            t.sequential = enabled;
            Ok(())
        })
        .await
    }

    async fn set_super_seeding(&self, enabled: bool) -> Result<(), EngineError> {
        self.with_torrent("set_super_seeding", |t| {
            t.super_seeding = enabled;
            Ok(())
        })
        .await
    }

    async fn trackers(&self) -> Result<Vec<String>, EngineError> {
        self.with_torrent("trackers", |t| Ok(t.trackers.clone())).await
    }

    async fn add_trackers(&self, urls: &[String]) -> Result<(), EngineError> {
        self.with_torrent("add_trackers", |t| {
            for url in urls {
                if !t.trackers.contains(url) {
                    t.trackers.push(url.clone());
                }
            }
            Ok(())
        })
        .await
    }

    async fn remove_trackers(&self, urls: &[String]) -> Result<(), EngineError> {
        self.with_torrent("remove_trackers", |t| {
            t.trackers.retain(|existing| !urls.contains(existing));
            Ok(())
        })
        .await
    }

    async fn set_download_limit(&self, bytes_per_sec: u64) -> Result<(), EngineError> {
        self.with_torrent("set_download_limit", |t| {
            t.download_limit = bytes_per_sec;
            Ok(())
        })
        .await
    }

    async fn set_upload_limit(&self, bytes_per_sec: u64) -> Result<(), EngineError> {
        self.with_torrent("set_upload_limit", |t| {
            t.upload_limit = bytes_per_sec;
            Ok(())
        })
        .await
    }

    async fn move_storage(&self, path: &str) -> Result<(), EngineError> {
        self.with_torrent("move_storage", |t| {
            t.save_path = Some(path.to_string());
            Ok(())
        })
        .await
    }

    async fn force_recheck(&self) -> Result<(), EngineError> {
        self.with_torrent("force_recheck", |t| {
            t.rechecks += 1;
            t.state = TorrentState::Checking;
            Ok(())
        })
        .await
    }

    async fn export_torrent_file(&self) -> Result<Vec<u8>, EngineError> {
        self.with_torrent("export_torrent_file", |t| Ok(t.metainfo.clone()))
            .await
    }
}
