//! Common test utilities for in-process API testing with mocks.
//!
//! The fixture builds the full router around an orchestrator wired to the
//! mock engine and mock feed fetcher, so every endpoint can be exercised
//! without a torrent client or network.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use tamer_core::testing::{MockEngine, MockFeedFetcher};
use tamer_core::{Config, Orchestrator, SqliteStatsStore};

pub use tamer_core::testing::{rss_feed, test_magnet};

/// In-process daemon with controllable doubles.
pub struct TestFixture {
    pub router: Router,
    pub orchestrator: Arc<Orchestrator>,
    pub engine: MockEngine,
    pub fetcher: MockFeedFetcher,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub raw: Bytes,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build a fixture after letting the caller adjust the config.
    pub async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.server.port = 0;
        config.database.path = temp_dir.path().join("stats.db");
        config.backup.dir = temp_dir.path().join("backups");
        config.backup.on_shutdown = false;
        config.backup.restore_on_start = false;
        config.session.auto_start = true;
        customize(&mut config);

        let engine = MockEngine::new();
        let fetcher = MockFeedFetcher::new();
        let store = Arc::new(SqliteStatsStore::in_memory().expect("Failed to open stats store"));

        let orchestrator = Arc::new(
            Orchestrator::new(
                &config,
                Arc::new(engine.clone()),
                Arc::new(fetcher.clone()),
                Some(store),
            )
            .await
            .expect("Failed to build orchestrator"),
        );

        let state = Arc::new(tamer_server::state::AppState::new(
            config,
            Arc::clone(&orchestrator),
        ));
        let router = tamer_server::api::create_router(state);

        Self {
            router,
            orchestrator,
            engine,
            fetcher,
            temp_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Add a magnet through the API and return the new torrent id.
    pub async fn add_magnet(&self, n: u32, name: &str) -> u64 {
        let response = self
            .post(
                "/api/v1/torrents",
                serde_json::json!({ "source": test_magnet(n, name) }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_u64().expect("id in add response")
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let raw = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
            raw,
        }
    }
}

#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
