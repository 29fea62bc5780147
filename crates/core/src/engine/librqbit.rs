//! librqbit embedded engine.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use librqbit::{
    AddTorrent as RqbitAddTorrent, AddTorrentOptions, AddTorrentResponse, ManagedTorrent, Session,
    SessionOptions, SessionPersistenceConfig, TorrentStatsState,
};
use tracing::{debug, info, warn};

use super::{
    AddOptions, EngineError, EngineHandle, FileEntry, StatusSnapshot, TorrentSource, TorrentState,
    TransferEngine,
};
use crate::config::{LibrqbitConfig, SessionConfig};

/// Embedded librqbit engine.
pub struct LibrqbitEngine {
    session: Arc<Session>,
}

impl LibrqbitEngine {
    /// Start a librqbit session rooted at `session.download_path`.
    pub async fn new(
        config: &LibrqbitConfig,
        session: &SessionConfig,
    ) -> Result<Self, EngineError> {
        let download_path = PathBuf::from(&session.download_path);

        if !download_path.exists() {
            std::fs::create_dir_all(&download_path).map_err(|e| {
                EngineError::ConnectionFailed(format!(
                    "Failed to create download directory: {}",
                    e
                ))
            })?;
        }

        let mut opts = SessionOptions::default();

        if !session.enable_dht {
            opts.disable_dht = true;
        }

        // Range, not RangeInclusive
        if let Some(port) = config.listen_port {
            opts.listen_port_range = Some(port..(port + 1));
        }

        if let Some(ref persistence_path) = config.persistence_path {
            let persistence_dir = PathBuf::from(persistence_path);
            if !persistence_dir.exists() {
                std::fs::create_dir_all(&persistence_dir).map_err(|e| {
                    EngineError::ConnectionFailed(format!(
                        "Failed to create persistence directory: {}",
                        e
                    ))
                })?;
            }
            opts.persistence = Some(SessionPersistenceConfig::Json {
                folder: Some(persistence_dir),
            });
        }

        info!(
            download_path = %download_path.display(),
            dht_enabled = !opts.disable_dht,
            "Initializing librqbit session"
        );

        let rqbit = Session::new_with_opts(download_path, opts)
            .await
            .map_err(|e| {
                EngineError::ConnectionFailed(format!(
                    "Failed to initialize librqbit session: {}",
                    e
                ))
            })?;

        if let Some(port) = rqbit.tcp_listen_port() {
            info!(port = port, "librqbit listening on TCP port");
        }

        Ok(Self { session: rqbit })
    }
}

#[async_trait]
impl TransferEngine for LibrqbitEngine {
    fn name(&self) -> &str {
        "librqbit"
    }

    async fn add(
        &self,
        source: &TorrentSource,
        options: &AddOptions,
    ) -> Result<Arc<dyn EngineHandle>, EngineError> {
        let (uri_storage, data_storage) = match source {
            TorrentSource::Magnet(uri) | TorrentSource::Url(uri) => (Some(uri.clone()), None),
            TorrentSource::File(path) => (None, Some(TorrentSource::read_file(path).await?)),
        };

        let add_torrent = match (&uri_storage, &data_storage) {
            (Some(uri), _) => RqbitAddTorrent::from_url(uri),
            (None, Some(data)) => RqbitAddTorrent::from_bytes(data.clone()),
            (None, None) => {
                return Err(EngineError::InvalidSource(source.to_string()));
            }
        };

        let opts = options.download_path.as_ref().map(|path| AddTorrentOptions {
            output_folder: Some(path.clone()),
            ..Default::default()
        });

        // Bounded by the registry's add timeout
        let response = self
            .session
            .add_torrent(add_torrent, opts)
            .await
            .map_err(|e| EngineError::InvalidSource(format!("Failed to add torrent: {}", e)))?;

        let torrent = match response {
            AddTorrentResponse::Added(_, handle) => handle,
            AddTorrentResponse::AlreadyManaged(_, handle) => {
                warn!(
                    hash = %handle.info_hash().as_string(),
                    "Torrent already managed by librqbit"
                );
                handle
            }
            AddTorrentResponse::ListOnly(_) => {
                return Err(EngineError::ApiError(
                    "Torrent was added in list-only mode".to_string(),
                ))
            }
        };

        let hash = torrent.info_hash().as_string();
        debug!(hash = %hash, name = ?torrent.name(), "Torrent added to librqbit");

        Ok(Arc::new(LibrqbitHandle {
            session: self.session.clone(),
            torrent,
            hash,
            metainfo: data_storage,
        }))
    }

    async fn apply_session_settings(&self, settings: &SessionConfig) -> Result<(), EngineError> {
        // DHT and download path are fixed at session creation
        warn!(
            max_upload_speed = settings.max_upload_speed,
            max_download_speed = settings.max_download_speed,
            max_connections = settings.max_connections,
            "Runtime session limits not supported by librqbit"
        );
        Ok(())
    }
}

/// A torrent managed by the embedded session.
pub struct LibrqbitHandle {
    session: Arc<Session>,
    torrent: Arc<ManagedTorrent>,
    hash: String,
    /// Original `.torrent` bytes, when added from a file.
    metainfo: Option<Vec<u8>>,
}

impl LibrqbitHandle {
    fn unsupported(&self, operation: &str) -> Result<(), EngineError> {
        warn!(hash = %self.hash, operation = operation, "Operation not supported by librqbit");
        Ok(())
    }
}

/// Map librqbit state to our TorrentState.
fn map_state(state: &TorrentStatsState, is_paused: bool, is_finished: bool) -> TorrentState {
    if is_paused {
        return TorrentState::Paused;
    }

    match state {
        TorrentStatsState::Initializing => TorrentState::Checking,
        TorrentStatsState::Live => {
            if is_finished {
                TorrentState::Seeding
            } else {
                TorrentState::Downloading
            }
        }
        TorrentStatsState::Paused => TorrentState::Paused,
        TorrentStatsState::Error => TorrentState::Error,
    }
}

/// librqbit reports MiB/s in a field named `mbps`.
fn mib_per_sec_to_bytes(mibps: f64) -> u64 {
    (mibps * 1024.0 * 1024.0) as u64
}

#[async_trait]
impl EngineHandle for LibrqbitHandle {
    fn key(&self) -> &str {
        &self.hash
    }

    async fn status(&self) -> Result<StatusSnapshot, EngineError> {
        let stats = self.torrent.stats();

        let progress = if stats.total_bytes > 0 {
            stats.progress_bytes as f64 / stats.total_bytes as f64
        } else {
            0.0
        };

        let (download_rate, upload_rate, num_peers) = stats
            .live
            .as_ref()
            .map(|live| {
                let peers = live.snapshot.peer_stats.queued
                    + live.snapshot.peer_stats.connecting
                    + live.snapshot.peer_stats.live;
                (
                    mib_per_sec_to_bytes(live.download_speed.mbps),
                    mib_per_sec_to_bytes(live.upload_speed.mbps),
                    peers as u32,
                )
            })
            .unwrap_or((0, 0, 0));

        Ok(StatusSnapshot {
            name: self.torrent.name().map(|s| s.to_string()),
            progress,
            download_rate,
            upload_rate,
            num_peers,
            state: map_state(&stats.state, self.torrent.is_paused(), stats.finished),
            // Neither piece map nor peer list is exposed by the session API
            piece_bitmap: Vec::new(),
            peers: Vec::new(),
            total_size: stats.total_bytes,
            total_downloaded: stats.progress_bytes,
            total_uploaded: stats.uploaded_bytes,
        })
    }

    async fn files(&self) -> Result<Vec<FileEntry>, EngineError> {
        Err(EngineError::Unsupported("file listing".to_string()))
    }

    async fn pause(&self) -> Result<(), EngineError> {
        self.session
            .pause(&self.torrent)
            .await
            .map_err(|e| EngineError::ApiError(format!("Failed to pause torrent: {}", e)))?;
        debug!(hash = %self.hash, "Torrent paused");
        Ok(())
    }

    async fn resume(&self) -> Result<(), EngineError> {
        self.session
            .unpause(&self.torrent)
            .await
            .map_err(|e| EngineError::ApiError(format!("Failed to resume torrent: {}", e)))?;
        debug!(hash = %self.hash, "Torrent resumed");
        Ok(())
    }

    async fn remove(&self, delete_data: bool) -> Result<(), EngineError> {
        let id = self.torrent.id();
        self.session
            .delete(id.into(), delete_data)
            .await
            .map_err(|e| EngineError::ApiError(format!("Failed to remove torrent: {}", e)))?;
        debug!(hash = %self.hash, delete_data = delete_data, "Torrent removed");
        Ok(())
    }

    async fn set_priority(&self, _level: u8) -> Result<(), EngineError> {
        self.unsupported("set_priority")
    }

    async fn set_file_priority(&self, _index: usize, _level: u8) -> Result<(), EngineError> {
        Err(EngineError::Unsupported("file priorities".to_string()))
    }

    async fn set_sequential(&self, _enabled: bool) -> Result<(), EngineError> {
        self.unsupported("set_sequential")
    }

    async fn set_super_seeding(&self, _enabled: bool) -> Result<(), EngineError> {
        self.unsupported("set_super_seeding")
    }

    async fn trackers(&self) -> Result<Vec<String>, EngineError> {
        Err(EngineError::Unsupported("tracker listing".to_string()))
    }

    async fn add_trackers(&self, _urls: &[String]) -> Result<(), EngineError> {
        self.unsupported("add_trackers")
    }

    async fn remove_trackers(&self, _urls: &[String]) -> Result<(), EngineError> {
        self.unsupported("remove_trackers")
    }

    async fn set_download_limit(&self, _bytes_per_sec: u64) -> Result<(), EngineError> {
        self.unsupported("set_download_limit")
    }

    async fn set_upload_limit(&self, _bytes_per_sec: u64) -> Result<(), EngineError> {
        self.unsupported("set_upload_limit")
    }

    async fn move_storage(&self, _path: &str) -> Result<(), EngineError> {
        // Acknowledging would leave the data where it is
        Err(EngineError::Unsupported("moving storage".to_string()))
    }

    async fn force_recheck(&self) -> Result<(), EngineError> {
        self.unsupported("force_recheck")
    }

    async fn export_torrent_file(&self) -> Result<Vec<u8>, EngineError> {
        self.metainfo.clone().ok_or_else(|| {
            EngineError::Unsupported("export of torrents not added from a file".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_state() {
        assert_eq!(
            map_state(&TorrentStatsState::Live, true, false),
            TorrentState::Paused
        );
        assert_eq!(
            map_state(&TorrentStatsState::Live, false, true),
            TorrentState::Seeding
        );
        assert_eq!(
            map_state(&TorrentStatsState::Initializing, false, false),
            TorrentState::Checking
        );
        assert_eq!(
            map_state(&TorrentStatsState::Error, false, false),
            TorrentState::Error
        );
    }

    #[test]
    fn test_mib_conversion() {
        assert_eq!(mib_per_sec_to_bytes(1.0), 1_048_576);
        assert_eq!(mib_per_sec_to_bytes(0.0), 0);
    }
}
