//! HTTP client for the daemon's `/api/v1` surface.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use tamer_core::{FleetStats, TorrentEntry, TorrentInfo};

use crate::api::torrents::{AddTorrentRequest, TorrentListResponse};
use crate::api::ErrorResponse;

/// CLI failure, carrying its process exit code.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad arguments or a request the daemon refused.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Daemon unreachable, engine timeout or engine failure.
    #[error("{0}")]
    Unavailable(String),

    #[error("{0:#}")]
    Failure(anyhow::Error),
}

pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::NotFound(_) | Self::Failure(_) => 1,
            Self::Unavailable(_) => 2,
        }
    }

    fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::NOT_FOUND => Self::NotFound(message),
            s if s.is_client_error() => Self::Validation(message),
            _ => Self::Unavailable(message),
        }
    }
}

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> CliResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CliError::Failure(anyhow::anyhow!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn send_raw(&self, request: RequestBuilder) -> CliResult<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            CliError::Unavailable(format!("daemon unreachable at {}: {}", self.base_url, e))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| {
                if body.is_empty() {
                    format!("request failed with status {}", status)
                } else {
                    body
                }
            });
        Err(CliError::from_status(status, message))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> CliResult<T> {
        self.send_raw(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| CliError::Failure(anyhow::anyhow!("invalid response from daemon: {}", e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> CliResult<T> {
        self.send(self.http.get(self.url(path))).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> CliResult<T> {
        self.send(self.http.post(self.url(path)).json(body)).await
    }

    pub async fn add(
        &self,
        source: &str,
        priority: Option<u8>,
        sequential: Option<bool>,
    ) -> CliResult<TorrentEntry> {
        let request = AddTorrentRequest {
            source: source.to_string(),
            priority,
            sequential,
        };
        self.post("/torrents", &request).await
    }

    /// Cached fleet view.
    pub async fn list(&self, status: Option<&str>) -> CliResult<Vec<TorrentEntry>> {
        self.list_with(status, false).await
    }

    /// Fleet view with status polled from the engine.
    pub async fn list_live(&self, status: Option<&str>) -> CliResult<Vec<TorrentEntry>> {
        self.list_with(status, true).await
    }

    async fn list_with(&self, status: Option<&str>, refresh: bool) -> CliResult<Vec<TorrentEntry>> {
        let mut request = self.http.get(self.url("/torrents"));
        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }
        if refresh {
            request = request.query(&[("refresh", "true")]);
        }
        let response: TorrentListResponse = self.send(request).await?;
        Ok(response.torrents)
    }

    pub async fn info(&self, id: u64) -> CliResult<TorrentInfo> {
        self.get(&format!("/torrents/{}", id)).await
    }

    pub async fn pause(&self, id: u64) -> CliResult<TorrentEntry> {
        self.post(&format!("/torrents/{}/pause", id), &json!({})).await
    }

    pub async fn resume(&self, id: u64) -> CliResult<TorrentEntry> {
        self.post(&format!("/torrents/{}/resume", id), &json!({})).await
    }

    pub async fn remove(&self, id: u64, delete_data: bool) -> CliResult<()> {
        let request = self
            .http
            .delete(self.url(&format!("/torrents/{}", id)))
            .query(&[("delete_data", delete_data)]);
        self.send_raw(request).await.map(|_| ())
    }

    pub async fn set_priority(&self, id: u64, level: i64) -> CliResult<TorrentEntry> {
        self.post(&format!("/torrents/{}/priority", id), &json!({ "level": level }))
            .await
    }

    pub async fn set_file_priority(
        &self,
        id: u64,
        file_index: usize,
        level: i64,
    ) -> CliResult<TorrentEntry> {
        self.post(
            &format!("/torrents/{}/file-priority", id),
            &json!({ "file_index": file_index, "level": level }),
        )
        .await
    }

    pub async fn add_trackers(&self, id: u64, urls: &[String]) -> CliResult<TorrentEntry> {
        self.post(&format!("/torrents/{}/trackers/add", id), &json!({ "urls": urls }))
            .await
    }

    pub async fn remove_trackers(&self, id: u64, urls: &[String]) -> CliResult<TorrentEntry> {
        self.post(&format!("/torrents/{}/trackers/remove", id), &json!({ "urls": urls }))
            .await
    }

    pub async fn set_sequential(&self, id: u64, enabled: bool) -> CliResult<TorrentEntry> {
        self.post(&format!("/torrents/{}/sequential", id), &json!({ "enabled": enabled }))
            .await
    }

    pub async fn set_super_seeding(&self, id: u64, enabled: bool) -> CliResult<TorrentEntry> {
        self.post(&format!("/torrents/{}/super-seeding", id), &json!({ "enabled": enabled }))
            .await
    }

    pub async fn force_recheck(&self, id: u64) -> CliResult<TorrentEntry> {
        self.post(&format!("/torrents/{}/recheck", id), &json!({})).await
    }

    pub async fn set_download_limit(&self, id: u64, kbps: u64) -> CliResult<TorrentEntry> {
        self.post(&format!("/torrents/{}/download-limit", id), &json!({ "kbps": kbps }))
            .await
    }

    pub async fn set_upload_limit(&self, id: u64, kbps: u64) -> CliResult<TorrentEntry> {
        self.post(&format!("/torrents/{}/upload-limit", id), &json!({ "kbps": kbps }))
            .await
    }

    pub async fn move_storage(&self, id: u64, path: &str) -> CliResult<TorrentEntry> {
        self.post(&format!("/torrents/{}/move", id), &json!({ "path": path }))
            .await
    }

    pub async fn search(&self, query: &str) -> CliResult<Vec<TorrentEntry>> {
        let request = self
            .http
            .get(self.url("/torrents/search"))
            .query(&[("q", query)]);
        let response: TorrentListResponse = self.send(request).await?;
        Ok(response.torrents)
    }

    pub async fn stats(&self) -> CliResult<FleetStats> {
        self.get("/stats").await
    }

    pub async fn export(&self, id: u64) -> CliResult<Vec<u8>> {
        let response = self
            .send_raw(self.http.get(self.url(&format!("/torrents/{}/export", id))))
            .await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| CliError::Unavailable(format!("export download failed: {}", e)))
    }
}
