//! Mock feed fetcher for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::rss::{FeedFetcher, RssError};

#[derive(Debug, Default)]
struct MockFetcherState {
    documents: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    fetches: HashMap<String, usize>,
}

/// Serves canned documents by URL.
///
/// Unknown URLs fail like an unreachable host.
#[derive(Debug, Clone, Default)]
pub struct MockFeedFetcher {
    state: Arc<RwLock<MockFetcherState>>,
}

impl MockFeedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_feed(&self, url: &str, body: Vec<u8>) {
        let mut state = self.state.write().await;
        state.failing.remove(url);
        state.documents.insert(url.to_string(), body);
    }

    pub async fn set_failure(&self, url: &str) {
        self.state.write().await.failing.insert(url.to_string());
    }

    pub async fn clear_failure(&self, url: &str) {
        self.state.write().await.failing.remove(url);
    }

    /// How many times `url` has been fetched, including failures.
    pub async fn fetch_count(&self, url: &str) -> usize {
        self.state
            .read()
            .await
            .fetches
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl FeedFetcher for MockFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RssError> {
        let mut state = self.state.write().await;
        *state.fetches.entry(url.to_string()).or_default() += 1;

        if state.failing.contains(url) {
            return Err(RssError::FetchFailed {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        }
        state
            .documents
            .get(url)
            .cloned()
            .ok_or_else(|| RssError::FetchFailed {
                url: url.to_string(),
                message: "not found".to_string(),
            })
    }
}
