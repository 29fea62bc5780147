//! Feed retrieval and parsing.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{FeedItem, RssError};

/// Retrieves raw feed documents.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RssError>;
}

/// HTTP fetcher over a shared client.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self, RssError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tamer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RssError::FetchFailed {
                url: String::new(),
                message: format!("client setup: {}", e),
            })?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RssError> {
        let failed = |message: String| RssError::FetchFailed {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Parse an RSS document into items. Items with neither GUID nor link are dropped.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedItem>, RssError> {
    let channel =
        ::rss::Channel::read_from(bytes).map_err(|e| RssError::FeedParseError(e.to_string()))?;

    Ok(channel
        .items()
        .iter()
        .filter_map(|item: &::rss::Item| {
            let link = item.link().map(str::to_string);
            let enclosure = item.enclosure().map(|e| e.url().to_string());
            let guid = item.guid().map(|g| g.value().to_string());

            let key = guid.clone().or_else(|| link.clone())?;
            let magnet = [&link, &enclosure, &guid]
                .into_iter()
                .flatten()
                .find(|candidate| candidate.starts_with("magnet:"))
                .cloned();
            let source = magnet.or(enclosure).or(link);

            Some(FeedItem {
                key,
                title: item.title().unwrap_or_default().to_string(),
                source,
            })
        })
        .collect())
}
