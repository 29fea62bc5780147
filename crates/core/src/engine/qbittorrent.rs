//! qBittorrent Web API engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{QBittorrentConfig, SessionConfig};

use super::{
    parse_magnet, AddOptions, EngineError, EngineHandle, FileEntry, PeerInfo, StatusSnapshot,
    TorrentSource, TorrentState, TransferEngine,
};

/// Attempts made to find a freshly added torrent by its tag.
const HASH_LOOKUP_ATTEMPTS: u32 = 20;
const HASH_LOOKUP_DELAY: Duration = Duration::from_millis(250);

/// Authenticated Web API session shared by the engine and its handles.
struct QBittorrentApi {
    client: Client,
    config: QBittorrentConfig,
    /// Session marker (cookie lives in the client's jar; cleared on 403).
    session: RwLock<Option<String>>,
}

impl QBittorrentApi {
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Login and store session cookie.
    async fn login(&self) -> Result<(), EngineError> {
        let url = format!("{}/api/v2/auth/login", self.base_url());

        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            *self.session.write().await = Some("authenticated".to_string());
            Ok(())
        } else if body.contains("Fails.") || status.as_u16() == 403 {
            Err(EngineError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(EngineError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    /// Ensure we have a valid session, logging in if needed.
    async fn ensure_authenticated(&self) -> Result<(), EngineError> {
        if self.session.read().await.is_some() {
            return Ok(());
        }
        self.login().await
    }

    /// Send an authenticated request, re-authenticating once on 403.
    async fn send<F>(&self, build: F) -> Result<Response, EngineError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.ensure_authenticated().await?;

        let response = build().send().await.map_err(map_send_error)?;
        let response = if response.status().as_u16() == 403 {
            warn!("qBittorrent session expired, re-authenticating");
            *self.session.write().await = None;
            self.login().await?;
            build().send().await.map_err(map_send_error)?
        } else {
            response
        };

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::ApiError(format!("HTTP {}", status)));
        }
        Ok(response)
    }

    /// Make an authenticated GET request.
    async fn get(&self, endpoint: &str) -> Result<String, EngineError> {
        let url = format!("{}{}", self.base_url(), endpoint);
        self.send(|| self.client.get(&url))
            .await?
            .text()
            .await
            .map_err(|e| EngineError::ApiError(e.to_string()))
    }

    /// GET and decode a JSON body.
    async fn get_json<T>(&self, endpoint: &str) -> Result<T, EngineError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let body = self.get(endpoint).await?;
        serde_json::from_str(&body)
            .map_err(|e| EngineError::ApiError(format!("Failed to parse response: {}", e)))
    }

    /// Make an authenticated GET request returning raw bytes.
    async fn get_bytes(&self, endpoint: &str) -> Result<Vec<u8>, EngineError> {
        let url = format!("{}{}", self.base_url(), endpoint);
        self.send(|| self.client.get(&url))
            .await?
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| EngineError::ApiError(e.to_string()))
    }

    /// Make an authenticated POST request with form data.
    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, EngineError> {
        let url = format!("{}{}", self.base_url(), endpoint);
        self.send(|| self.client.post(&url).form(params))
            .await?
            .text()
            .await
            .map_err(|e| EngineError::ApiError(e.to_string()))
    }

    /// POST to `primary`, falling back to `fallback` when the endpoint is missing
    /// (qBittorrent 5 renamed pause/resume to stop/start).
    async fn post_form_with_fallback(
        &self,
        primary: &str,
        fallback: &str,
        params: &[(&str, &str)],
    ) -> Result<String, EngineError> {
        match self.post_form(primary, params).await {
            Err(EngineError::ApiError(msg)) if msg.contains("404") => {
                debug!(endpoint = primary, fallback = fallback, "Endpoint missing, using fallback");
                self.post_form(fallback, params).await
            }
            other => other,
        }
    }

    /// Make an authenticated POST request with multipart data.
    ///
    /// Multipart bodies cannot be replayed, so a 403 re-authenticates but is
    /// reported to the caller.
    async fn post_multipart(
        &self,
        endpoint: &str,
        form: multipart::Form,
    ) -> Result<String, EngineError> {
        self.ensure_authenticated().await?;

        let url = format!("{}{}", self.base_url(), endpoint);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status.as_u16() == 403 {
            *self.session.write().await = None;
            self.login().await?;
            return Err(EngineError::ApiError(
                "session expired during upload, retry the add".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(EngineError::ApiError(format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| EngineError::ApiError(e.to_string()))
    }
}

fn map_send_error(e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::Timeout
    } else if e.is_connect() {
        EngineError::ConnectionFailed(e.to_string())
    } else {
        EngineError::ApiError(e.to_string())
    }
}

/// qBittorrent Web API engine.
pub struct QBittorrentEngine {
    api: Arc<QBittorrentApi>,
}

impl QBittorrentEngine {
    pub fn new(config: QBittorrentConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()
            .map_err(|e| {
                EngineError::ConnectionFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            api: Arc::new(QBittorrentApi {
                client,
                config,
                session: RwLock::new(None),
            }),
        })
    }

    /// Find the hash of a torrent we just added.
    ///
    /// Magnets with a hex info hash are resolved directly; everything else is
    /// looked up through the unique tag attached at add time.
    async fn resolve_hash(&self, source: &TorrentSource, tag: &str) -> Result<String, EngineError> {
        if let TorrentSource::Magnet(uri) = source {
            if let Some(hash) = parse_magnet(uri).and_then(|m| m.info_hash) {
                if hash.len() == 40 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Ok(hash);
                }
            }
        }

        let endpoint = format!("/api/v2/torrents/info?tag={}", urlencoding::encode(tag));
        for _ in 0..HASH_LOOKUP_ATTEMPTS {
            let torrents: Vec<QBTorrentInfo> = self.api.get_json(&endpoint).await?;
            if let Some(torrent) = torrents.into_iter().next() {
                return Ok(torrent.hash.to_lowercase());
            }
            tokio::time::sleep(HASH_LOOKUP_DELAY).await;
        }

        Err(EngineError::InvalidSource(format!(
            "qBittorrent did not register {}",
            source
        )))
    }
}

#[async_trait]
impl TransferEngine for QBittorrentEngine {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn add(
        &self,
        source: &TorrentSource,
        options: &AddOptions,
    ) -> Result<Arc<dyn EngineHandle>, EngineError> {
        let tag = format!("tamer-{}", uuid::Uuid::new_v4().simple());

        let mut form = match source {
            TorrentSource::Magnet(uri) | TorrentSource::Url(uri) => {
                multipart::Form::new().text("urls", uri.clone())
            }
            TorrentSource::File(path) => {
                let data = TorrentSource::read_file(path).await?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "torrent.torrent".to_string());
                let part = multipart::Part::bytes(data)
                    .file_name(filename)
                    .mime_str("application/x-bittorrent")
                    .map_err(|e| EngineError::InvalidSource(e.to_string()))?;
                multipart::Form::new().part("torrents", part)
            }
        };

        form = form.text("tags", tag.clone());
        if let Some(path) = options.download_path.as_ref() {
            form = form.text("savepath", path.clone());
        }

        let body = self.api.post_multipart("/api/v2/torrents/add", form).await?;
        if body.contains("Fails.") {
            return Err(EngineError::InvalidSource(format!(
                "qBittorrent rejected {}",
                source
            )));
        }

        let hash = self.resolve_hash(source, &tag).await?;
        debug!(hash = %hash, "Torrent added to qBittorrent");

        Ok(Arc::new(QBittorrentHandle {
            api: self.api.clone(),
            hash,
        }))
    }

    async fn apply_session_settings(&self, settings: &SessionConfig) -> Result<(), EngineError> {
        let prefs = serde_json::json!({
            "save_path": settings.download_path,
            "up_limit": settings.max_upload_speed * 1024,
            "dl_limit": settings.max_download_speed * 1024,
            "max_connec": settings.max_connections,
            "dht": settings.enable_dht,
            "lsd": settings.enable_lsd,
            "upnp": settings.enable_upnp,
        })
        .to_string();

        self.api
            .post_form("/api/v2/app/setPreferences", &[("json", prefs.as_str())])
            .await?;
        debug!("qBittorrent preferences applied");
        Ok(())
    }
}

/// A single torrent inside qBittorrent.
pub struct QBittorrentHandle {
    api: Arc<QBittorrentApi>,
    hash: String,
}

impl QBittorrentHandle {
    async fn info(&self) -> Result<QBTorrentInfo, EngineError> {
        let endpoint = format!("/api/v2/torrents/info?hashes={}", self.hash);
        let torrents: Vec<QBTorrentInfo> = self.api.get_json(&endpoint).await?;
        torrents
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::TorrentNotFound(self.hash.clone()))
    }

    async fn piece_bitmap(&self) -> Result<Vec<bool>, EngineError> {
        let endpoint = format!("/api/v2/torrents/pieceStates?hash={}", self.hash);
        let states: Vec<i64> = self.api.get_json(&endpoint).await?;
        // 0 = not downloaded, 1 = downloading, 2 = downloaded
        Ok(states.into_iter().map(|s| s == 2).collect())
    }

    async fn peers(&self) -> Result<Vec<PeerInfo>, EngineError> {
        let endpoint = format!("/api/v2/sync/torrentPeers?hash={}&rid=0", self.hash);
        let response: QBPeersResponse = self.api.get_json(&endpoint).await?;
        let mut peers: Vec<PeerInfo> = response
            .peers
            .into_values()
            .map(QBPeer::into_peer_info)
            .collect();
        peers.sort_by(|a, b| b.download_rate.cmp(&a.download_rate));
        Ok(peers)
    }

    async fn post_hash(&self, endpoint: &str) -> Result<(), EngineError> {
        self.api
            .post_form(endpoint, &[("hashes", self.hash.as_str())])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EngineHandle for QBittorrentHandle {
    fn key(&self) -> &str {
        &self.hash
    }

    async fn status(&self) -> Result<StatusSnapshot, EngineError> {
        let info = self.info().await?;

        let piece_bitmap = self.piece_bitmap().await.unwrap_or_else(|e| {
            debug!(hash = %self.hash, error = %e, "Piece states unavailable");
            Vec::new()
        });
        let peers = self.peers().await.unwrap_or_else(|e| {
            debug!(hash = %self.hash, error = %e, "Peer list unavailable");
            Vec::new()
        });

        Ok(info.into_snapshot(piece_bitmap, peers))
    }

    async fn files(&self) -> Result<Vec<FileEntry>, EngineError> {
        let endpoint = format!("/api/v2/torrents/files?hash={}", self.hash);
        let files: Vec<QBFile> = self.api.get_json(&endpoint).await?;
        Ok(files
            .into_iter()
            .enumerate()
            .map(|(i, f)| FileEntry {
                index: f.index.unwrap_or(i),
                path: f.name,
                size: f.size.max(0) as u64,
                priority: f.priority.clamp(0, 7) as u8,
            })
            .collect())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        self.api
            .post_form_with_fallback(
                "/api/v2/torrents/pause",
                "/api/v2/torrents/stop",
                &[("hashes", self.hash.as_str())],
            )
            .await?;
        debug!(hash = %self.hash, "Torrent paused");
        Ok(())
    }

    async fn resume(&self) -> Result<(), EngineError> {
        self.api
            .post_form_with_fallback(
                "/api/v2/torrents/resume",
                "/api/v2/torrents/start",
                &[("hashes", self.hash.as_str())],
            )
            .await?;
        debug!(hash = %self.hash, "Torrent resumed");
        Ok(())
    }

    async fn remove(&self, delete_data: bool) -> Result<(), EngineError> {
        // qBittorrent answers 200 for unknown hashes, so check first
        self.info().await?;

        let delete_files = if delete_data { "true" } else { "false" };
        self.api
            .post_form(
                "/api/v2/torrents/delete",
                &[("hashes", self.hash.as_str()), ("deleteFiles", delete_files)],
            )
            .await?;
        debug!(hash = %self.hash, delete_data = delete_data, "Torrent removed");
        Ok(())
    }

    async fn set_priority(&self, level: u8) -> Result<(), EngineError> {
        // qBittorrent only has queue positions; map the extremes onto them
        match level {
            7 => self.post_hash("/api/v2/torrents/topPrio").await,
            0 => self.post_hash("/api/v2/torrents/bottomPrio").await,
            _ => {
                debug!(hash = %self.hash, level = level, "Priority kept as queue position");
                Ok(())
            }
        }
    }

    async fn set_file_priority(&self, index: usize, level: u8) -> Result<(), EngineError> {
        let id = index.to_string();
        let priority = qb_file_priority(level).to_string();
        self.api
            .post_form(
                "/api/v2/torrents/filePrio",
                &[
                    ("hash", self.hash.as_str()),
                    ("id", id.as_str()),
                    ("priority", priority.as_str()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn set_sequential(&self, enabled: bool) -> Result<(), EngineError> {
        // Only a toggle endpoint exists
        let info = self.info().await?;
        if info.seq_dl != enabled {
            self.post_hash("/api/v2/torrents/toggleSequentialDownload")
                .await?;
        }
        Ok(())
    }

    async fn set_super_seeding(&self, enabled: bool) -> Result<(), EngineError> {
        let value = if enabled { "true" } else { "false" };
        self.api
            .post_form(
                "/api/v2/torrents/setSuperSeeding",
                &[("hashes", self.hash.as_str()), ("value", value)],
            )
            .await?;
        Ok(())
    }

    async fn trackers(&self) -> Result<Vec<String>, EngineError> {
        let endpoint = format!("/api/v2/torrents/trackers?hash={}", self.hash);
        let trackers: Vec<QBTracker> = self.api.get_json(&endpoint).await?;
        Ok(tracker_urls(trackers))
    }

    async fn add_trackers(&self, urls: &[String]) -> Result<(), EngineError> {
        let joined = urls.join("\n");
        self.api
            .post_form(
                "/api/v2/torrents/addTrackers",
                &[("hash", self.hash.as_str()), ("urls", joined.as_str())],
            )
            .await?;
        Ok(())
    }

    async fn remove_trackers(&self, urls: &[String]) -> Result<(), EngineError> {
        let joined = urls.join("|");
        self.api
            .post_form(
                "/api/v2/torrents/removeTrackers",
                &[("hash", self.hash.as_str()), ("urls", joined.as_str())],
            )
            .await?;
        Ok(())
    }

    async fn set_download_limit(&self, bytes_per_sec: u64) -> Result<(), EngineError> {
        let limit = bytes_per_sec.to_string();
        self.api
            .post_form(
                "/api/v2/torrents/setDownloadLimit",
                &[("hashes", self.hash.as_str()), ("limit", limit.as_str())],
            )
            .await?;
        debug!(hash = %self.hash, limit = bytes_per_sec, "Download limit set");
        Ok(())
    }

    async fn set_upload_limit(&self, bytes_per_sec: u64) -> Result<(), EngineError> {
        let limit = bytes_per_sec.to_string();
        self.api
            .post_form(
                "/api/v2/torrents/setUploadLimit",
                &[("hashes", self.hash.as_str()), ("limit", limit.as_str())],
            )
            .await?;
        debug!(hash = %self.hash, limit = bytes_per_sec, "Upload limit set");
        Ok(())
    }

    async fn move_storage(&self, path: &str) -> Result<(), EngineError> {
        self.api
            .post_form(
                "/api/v2/torrents/setLocation",
                &[("hashes", self.hash.as_str()), ("location", path)],
            )
            .await?;
        debug!(hash = %self.hash, path = %path, "Storage moved");
        Ok(())
    }

    async fn force_recheck(&self) -> Result<(), EngineError> {
        self.post_hash("/api/v2/torrents/recheck").await
    }

    async fn export_torrent_file(&self) -> Result<Vec<u8>, EngineError> {
        let endpoint = format!("/api/v2/torrents/export?hash={}", self.hash);
        self.api.get_bytes(&endpoint).await
    }
}

/// Map 0-7 onto qBittorrent file priorities (0 skip, 1 normal, 6 high, 7 max).
fn qb_file_priority(level: u8) -> u8 {
    match level {
        0 => 0,
        1..=5 => 1,
        6 => 6,
        _ => 7,
    }
}

/// Entry of `/torrents/trackers`.
#[derive(Debug, Deserialize)]
struct QBTracker {
    url: String,
}

/// Drop the DHT/PeX/LSD pseudo-trackers ("** [DHT] **" and friends).
fn tracker_urls(trackers: Vec<QBTracker>) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for tracker in trackers {
        if !tracker.url.starts_with("** [") && !urls.contains(&tracker.url) {
            urls.push(tracker.url);
        }
    }
    urls
}

/// qBittorrent torrent info response.
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    total_size: i64,
    #[serde(default)]
    downloaded: i64,
    #[serde(default)]
    uploaded: i64,
    #[serde(default)]
    dlspeed: i64,
    #[serde(default)]
    upspeed: i64,
    #[serde(default)]
    num_seeds: i64,
    #[serde(default)]
    num_leechs: i64,
    #[serde(default)]
    seq_dl: bool,
}

impl QBTorrentInfo {
    fn into_snapshot(self, piece_bitmap: Vec<bool>, peers: Vec<PeerInfo>) -> StatusSnapshot {
        StatusSnapshot {
            name: if self.name.is_empty() {
                None
            } else {
                Some(self.name)
            },
            progress: self.progress.clamp(0.0, 1.0),
            download_rate: self.dlspeed.max(0) as u64,
            upload_rate: self.upspeed.max(0) as u64,
            num_peers: (self.num_seeds.max(0) + self.num_leechs.max(0)) as u32,
            state: parse_qb_state(&self.state),
            piece_bitmap,
            peers,
            total_size: self.total_size.max(0) as u64,
            total_downloaded: self.downloaded.max(0) as u64,
            total_uploaded: self.uploaded.max(0) as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QBFile {
    #[serde(default)]
    index: Option<usize>,
    name: String,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    priority: i64,
}

#[derive(Debug, Default, Deserialize)]
struct QBPeersResponse {
    #[serde(default)]
    peers: HashMap<String, QBPeer>,
}

#[derive(Debug, Deserialize)]
struct QBPeer {
    #[serde(default)]
    ip: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    client: String,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    dl_speed: i64,
    #[serde(default)]
    up_speed: i64,
}

impl QBPeer {
    fn into_peer_info(self) -> PeerInfo {
        PeerInfo {
            ip: self.ip,
            port: self.port,
            client: self.client,
            progress: self.progress,
            download_rate: self.dl_speed.max(0) as u64,
            upload_rate: self.up_speed.max(0) as u64,
        }
    }
}

/// Parse qBittorrent state string to TorrentState.
fn parse_qb_state(state: &str) -> TorrentState {
    match state {
        "downloading" | "forcedDL" | "metaDL" | "forcedMetaDL" | "allocating" | "stalledDL" => {
            TorrentState::Downloading
        }
        "uploading" | "forcedUP" | "stalledUP" => TorrentState::Seeding,
        "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP" => TorrentState::Paused,
        "checkingDL" | "checkingUP" | "checkingResumeData" | "moving" => TorrentState::Checking,
        "error" | "missingFiles" => TorrentState::Error,
        _ => TorrentState::Queued,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qb_state() {
        assert_eq!(parse_qb_state("downloading"), TorrentState::Downloading);
        assert_eq!(parse_qb_state("stalledDL"), TorrentState::Downloading);
        assert_eq!(parse_qb_state("uploading"), TorrentState::Seeding);
        assert_eq!(parse_qb_state("stoppedUP"), TorrentState::Paused);
        assert_eq!(parse_qb_state("checkingResumeData"), TorrentState::Checking);
        assert_eq!(parse_qb_state("queuedDL"), TorrentState::Queued);
        assert_eq!(parse_qb_state("missingFiles"), TorrentState::Error);
        assert_eq!(parse_qb_state("somethingNew"), TorrentState::Queued);
    }

    #[test]
    fn test_tracker_list_skips_pseudo_trackers() {
        let json = r#"[
            {"url": "** [DHT] **", "status": 2},
            {"url": "** [PeX] **", "status": 2},
            {"url": "udp://tracker.example:1337/announce", "status": 2},
            {"url": "http://other.example/announce", "status": 4}
        ]"#;
        let trackers: Vec<QBTracker> = serde_json::from_str(json).unwrap();
        assert_eq!(
            tracker_urls(trackers),
            vec![
                "udp://tracker.example:1337/announce",
                "http://other.example/announce"
            ]
        );
    }

    #[test]
    fn test_file_priority_mapping() {
        assert_eq!(qb_file_priority(0), 0);
        assert_eq!(qb_file_priority(3), 1);
        assert_eq!(qb_file_priority(6), 6);
        assert_eq!(qb_file_priority(7), 7);
    }

    #[test]
    fn test_info_into_snapshot() {
        let json = r#"{
            "hash": "ABCDEF",
            "name": "debian.iso",
            "state": "downloading",
            "progress": 0.42,
            "total_size": 1000,
            "downloaded": 420,
            "uploaded": 10,
            "dlspeed": 2048,
            "upspeed": 512,
            "num_seeds": 3,
            "num_leechs": 2,
            "seq_dl": true
        }"#;
        let info: QBTorrentInfo = serde_json::from_str(json).unwrap();
        assert!(info.seq_dl);
        let snapshot = info.into_snapshot(vec![true, false], Vec::new());
        assert_eq!(snapshot.name.as_deref(), Some("debian.iso"));
        assert_eq!(snapshot.state, TorrentState::Downloading);
        assert_eq!(snapshot.num_peers, 5);
        assert_eq!(snapshot.download_rate, 2048);
        assert_eq!(snapshot.piece_bitmap, vec![true, false]);
    }

    #[test]
    fn test_peers_response_parsing() {
        let json = r#"{
            "rid": 1,
            "peers": {
                "1.2.3.4:6881": {"ip": "1.2.3.4", "port": 6881, "client": "qBittorrent 4.6", "progress": 0.5, "dl_speed": 100, "up_speed": 5},
                "5.6.7.8:51413": {"ip": "5.6.7.8", "port": 51413, "client": "Transmission", "progress": 1.0, "dl_speed": 900, "up_speed": 0}
            }
        }"#;
        let response: QBPeersResponse = serde_json::from_str(json).unwrap();
        let mut peers: Vec<PeerInfo> = response
            .peers
            .into_values()
            .map(QBPeer::into_peer_info)
            .collect();
        peers.sort_by_key(|p| p.port);
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[1].client, "Transmission");
        assert_eq!(peers[1].download_rate, 900);
    }
}
