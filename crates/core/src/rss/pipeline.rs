//! Feed polling and acquisition into the fleet.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::fetcher::{parse_feed, FeedFetcher};
use super::filter::{CompiledFilter, FilterPolicy, SeenItems};
use super::types::{
    AcquiredItem, Feed, FeedFilter, FeedItem, FeedView, ItemFailure, PollReport, RssError,
};
use crate::config::RssConfig;
use crate::fleet::{AddTorrentOptions, FleetError, FleetRegistry};
use crate::metrics::{FEED_ITEMS_ACQUIRED, FEED_POLLS};

struct FeedState {
    feed: Feed,
    compiled: Vec<CompiledFilter>,
    seen: SeenItems,
    last_polled_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl FeedState {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_polled_at {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed >= self.feed.poll_interval)
                .unwrap_or(false),
        }
    }
}

/// Polls registered feeds and adds accepted items through the registry.
pub struct RssPipeline {
    registry: Arc<FleetRegistry>,
    fetcher: Arc<dyn FeedFetcher>,
    policy: FilterPolicy,
    seen_retention: usize,
    poll_tick: Duration,
    default_poll_interval: Duration,
    feeds: Mutex<BTreeMap<String, FeedState>>,
    /// Serializes polls so one item is never added twice concurrently.
    polling: Mutex<()>,
}

impl RssPipeline {
    pub fn new(
        registry: Arc<FleetRegistry>,
        fetcher: Arc<dyn FeedFetcher>,
        config: &RssConfig,
    ) -> Self {
        let default_priority = registry.session_defaults().default_priority;
        Self {
            registry,
            fetcher,
            policy: FilterPolicy {
                accept_when_no_filters: config.accept_when_no_filters,
                case_sensitive: config.case_sensitive,
                default_priority,
            },
            seen_retention: config.seen_retention,
            poll_tick: Duration::from_secs(config.poll_tick_secs),
            default_poll_interval: Duration::from_secs(config.default_poll_interval_secs),
            feeds: Mutex::new(BTreeMap::new()),
            polling: Mutex::new(()),
        }
    }

    pub fn poll_tick(&self) -> Duration {
        self.poll_tick
    }

    pub fn default_poll_interval(&self) -> Duration {
        self.default_poll_interval
    }

    pub async fn add_feed(&self, feed: Feed) -> Result<(), RssError> {
        let compiled = self.compile(&feed.filters)?;
        let mut feeds = self.feeds.lock().await;
        if feeds.contains_key(&feed.feed_id) {
            return Err(RssError::DuplicateFeed(feed.feed_id));
        }
        info!(
            feed_id = %feed.feed_id,
            url = %feed.url,
            filters = feed.filters.len(),
            "Feed registered"
        );
        feeds.insert(
            feed.feed_id.clone(),
            FeedState {
                feed,
                compiled,
                seen: SeenItems::new(self.seen_retention),
                last_polled_at: None,
                last_error: None,
            },
        );
        Ok(())
    }

    pub async fn remove_feed(&self, feed_id: &str) -> Result<(), RssError> {
        if self.feeds.lock().await.remove(feed_id).is_none() {
            return Err(RssError::FeedNotFound(feed_id.to_string()));
        }
        info!(feed_id = %feed_id, "Feed removed");
        Ok(())
    }

    pub async fn add_filter(&self, feed_id: &str, filter: FeedFilter) -> Result<(), RssError> {
        let compiled = CompiledFilter::compile(&filter, self.policy.case_sensitive)?;
        let mut feeds = self.feeds.lock().await;
        let state = feeds
            .get_mut(feed_id)
            .ok_or_else(|| RssError::FeedNotFound(feed_id.to_string()))?;
        state.feed.filters.push(filter);
        state.compiled.push(compiled);
        debug!(feed_id = %feed_id, "Filter added");
        Ok(())
    }

    pub async fn feeds(&self) -> Vec<FeedView> {
        self.feeds
            .lock()
            .await
            .values()
            .map(|state| FeedView {
                feed_id: state.feed.feed_id.clone(),
                url: state.feed.url.clone(),
                filters: state.compiled.iter().map(|c| c.filter().clone()).collect(),
                poll_interval_secs: state.feed.poll_interval.as_secs(),
                last_polled_at: state.last_polled_at,
                last_error: state.last_error.clone(),
                seen_items: state.seen.len(),
            })
            .collect()
    }

    /// Poll feeds whose interval has elapsed.
    pub async fn poll_due(&self) -> Vec<PollReport> {
        self.poll_at(Utc::now(), false).await
    }

    /// Poll every feed now.
    pub async fn poll_now(&self) -> Vec<PollReport> {
        self.poll_at(Utc::now(), true).await
    }

    pub async fn poll_at(&self, now: DateTime<Utc>, force: bool) -> Vec<PollReport> {
        let _polling = self.polling.lock().await;

        let due: Vec<(String, String)> = self
            .feeds
            .lock()
            .await
            .values()
            .filter(|state| force || state.is_due(now))
            .map(|state| (state.feed.feed_id.clone(), state.feed.url.clone()))
            .collect();

        let mut reports = Vec::with_capacity(due.len());
        for (feed_id, url) in due {
            reports.push(self.poll_feed(&feed_id, &url, now).await);
        }
        reports
    }

    async fn poll_feed(&self, feed_id: &str, url: &str, now: DateTime<Utc>) -> PollReport {
        let mut report = PollReport {
            feed_id: feed_id.to_string(),
            ..Default::default()
        };

        let fetched = self.fetcher.fetch(url).await;
        let items = fetched.and_then(|bytes| parse_feed(&bytes));

        let items = match items {
            Ok(items) => {
                FEED_POLLS.with_label_values(&["success"]).inc();
                items
            }
            Err(e) => {
                let label = match e {
                    RssError::FeedParseError(_) => "parse_error",
                    _ => "fetch_error",
                };
                FEED_POLLS.with_label_values(&[label]).inc();
                warn!(feed_id = %feed_id, error = %e, "Feed poll failed");
                self.finish_poll(feed_id, now, Some(e.to_string())).await;
                report.error = Some(e.to_string());
                return report;
            }
        };

        // Decide under the lock, add outside it
        let candidates: Vec<(FeedItem, u8)> = {
            let feeds = self.feeds.lock().await;
            let Some(state) = feeds.get(feed_id) else {
                return report;
            };
            let mut batch = HashSet::new();
            let mut candidates = Vec::new();
            for item in items {
                if state.seen.contains(&item.key) || !batch.insert(item.key.clone()) {
                    report.already_seen += 1;
                    continue;
                }
                match self.policy.evaluate(&state.compiled, &item.title) {
                    Some(priority) => candidates.push((item, priority)),
                    None => report.filtered += 1,
                }
            }
            candidates
        };

        let mut seen_keys = Vec::new();
        for (item, priority) in candidates {
            let Some(source) = item.source.clone() else {
                report.failed.push(ItemFailure {
                    key: item.key.clone(),
                    reason: "item has no link".to_string(),
                });
                seen_keys.push(item.key);
                continue;
            };

            match self
                .registry
                .add(&source, AddTorrentOptions::default().with_priority(priority))
                .await
            {
                Ok(torrent_id) => {
                    FEED_ITEMS_ACQUIRED.with_label_values(&["acquired"]).inc();
                    info!(
                        feed_id = %feed_id,
                        torrent_id = %torrent_id,
                        title = %item.title,
                        priority = priority,
                        "Feed item acquired"
                    );
                    report.acquired.push(AcquiredItem {
                        key: item.key.clone(),
                        title: item.title.clone(),
                        torrent_id,
                        priority,
                    });
                    seen_keys.push(item.key);
                }
                Err(e) => {
                    FEED_ITEMS_ACQUIRED.with_label_values(&["add_failed"]).inc();
                    warn!(
                        feed_id = %feed_id,
                        title = %item.title,
                        error = %e,
                        "Failed to add feed item"
                    );
                    // Rejected sources will not improve on retry
                    if matches!(e, FleetError::EngineRejected(_)) {
                        seen_keys.push(item.key.clone());
                    }
                    report.failed.push(ItemFailure {
                        key: item.key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        {
            let mut feeds = self.feeds.lock().await;
            if let Some(state) = feeds.get_mut(feed_id) {
                for key in &seen_keys {
                    state.seen.insert(key);
                }
            }
        }
        self.finish_poll(feed_id, now, None).await;

        debug!(
            feed_id = %feed_id,
            acquired = report.acquired.len(),
            filtered = report.filtered,
            already_seen = report.already_seen,
            failed = report.failed.len(),
            "Feed polled"
        );
        report
    }

    async fn finish_poll(&self, feed_id: &str, now: DateTime<Utc>, error: Option<String>) {
        if let Some(state) = self.feeds.lock().await.get_mut(feed_id) {
            state.last_polled_at = Some(now);
            state.last_error = error;
        }
    }

    fn compile(&self, filters: &[FeedFilter]) -> Result<Vec<CompiledFilter>, RssError> {
        filters
            .iter()
            .map(|f| CompiledFilter::compile(f, self.policy.case_sensitive))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::RegistryConfig;
    use crate::testing::{rss_feed, test_magnet, MockEngine, MockFeedFetcher};

    const URL: &str = "https://feeds.example.org/linux.rss";

    fn rss_config() -> RssConfig {
        RssConfig {
            poll_tick_secs: 60,
            default_poll_interval_secs: 600,
            fetch_timeout_secs: 5,
            seen_retention: 100,
            accept_when_no_filters: true,
            case_sensitive: false,
            feeds: Vec::new(),
        }
    }

    fn linux_feed(filters: Vec<FeedFilter>) -> Feed {
        Feed {
            feed_id: "linux".to_string(),
            url: URL.to_string(),
            filters,
            poll_interval: Duration::from_secs(600),
        }
    }

    async fn setup() -> (MockEngine, MockFeedFetcher, Arc<FleetRegistry>, RssPipeline) {
        let engine = MockEngine::new();
        let fetcher = MockFeedFetcher::new();
        let registry = Arc::new(FleetRegistry::new(
            Arc::new(engine.clone()),
            RegistryConfig::default(),
        ));
        let pipeline = RssPipeline::new(registry.clone(), Arc::new(fetcher.clone()), &rss_config());
        (engine, fetcher, registry, pipeline)
    }

    #[tokio::test]
    async fn test_include_exclude_acquisition() {
        let (_engine, fetcher, registry, pipeline) = setup().await;
        let stable = test_magnet(1, "Ubuntu 24.04");
        let beta = test_magnet(2, "Ubuntu 24.04 beta");
        fetcher
            .set_feed(
                URL,
                rss_feed(&[("Ubuntu 24.04 beta", &beta), ("Ubuntu 24.04", &stable)]),
            )
            .await;
        pipeline
            .add_feed(linux_feed(vec![
                FeedFilter::include("Ubuntu", 6),
                FeedFilter::exclude("beta"),
            ]))
            .await
            .unwrap();

        let reports = pipeline.poll_due().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].acquired.len(), 1);
        assert_eq!(reports[0].filtered, 1);

        let entries = registry.list(None).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, stable);
        assert_eq!(entries[0].priority, 6);
    }

    #[tokio::test]
    async fn test_seen_items_not_reacquired() {
        let (_engine, fetcher, registry, pipeline) = setup().await;
        let magnet = test_magnet(1, "Ubuntu 24.04");
        fetcher.set_feed(URL, rss_feed(&[("Ubuntu 24.04", &magnet)])).await;
        pipeline.add_feed(linux_feed(Vec::new())).await.unwrap();

        let first = pipeline.poll_now().await;
        assert_eq!(first[0].acquired.len(), 1);

        let second = pipeline.poll_now().await;
        assert!(second[0].acquired.is_empty());
        assert_eq!(second[0].already_seen, 1);
        assert!(second[0].failed.is_empty());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_feed_interval_respected() {
        let (_engine, fetcher, _registry, pipeline) = setup().await;
        fetcher.set_feed(URL, rss_feed(&[])).await;
        pipeline.add_feed(linux_feed(Vec::new())).await.unwrap();

        let start = Utc::now();
        assert_eq!(pipeline.poll_at(start, false).await.len(), 1);
        assert!(pipeline
            .poll_at(start + chrono::Duration::seconds(300), false)
            .await
            .is_empty());
        assert_eq!(
            pipeline
                .poll_at(start + chrono::Duration::seconds(600), false)
                .await
                .len(),
            1
        );
        assert_eq!(fetcher.fetch_count(URL).await, 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_block_other_feeds() {
        let (_engine, fetcher, registry, pipeline) = setup().await;
        let other_url = "https://feeds.example.org/other.rss";
        fetcher.set_failure(URL).await;
        fetcher
            .set_feed(other_url, rss_feed(&[("Fedora 40", &test_magnet(3, "Fedora 40"))]))
            .await;

        pipeline.add_feed(linux_feed(Vec::new())).await.unwrap();
        pipeline
            .add_feed(Feed {
                feed_id: "other".to_string(),
                url: other_url.to_string(),
                filters: Vec::new(),
                poll_interval: Duration::from_secs(600),
            })
            .await
            .unwrap();

        let reports = pipeline.poll_now().await;
        let linux = reports.iter().find(|r| r.feed_id == "linux").unwrap();
        let other = reports.iter().find(|r| r.feed_id == "other").unwrap();
        assert!(linux.error.is_some());
        assert_eq!(other.acquired.len(), 1);
        assert_eq!(registry.len().await, 1);

        let views = pipeline.feeds().await;
        assert!(views.iter().find(|v| v.feed_id == "linux").unwrap().last_error.is_some());
    }

    #[tokio::test]
    async fn test_malformed_feed_is_parse_error() {
        let (_engine, fetcher, _registry, pipeline) = setup().await;
        fetcher.set_feed(URL, b"<not-rss/>".to_vec()).await;
        pipeline.add_feed(linux_feed(Vec::new())).await.unwrap();

        let reports = pipeline.poll_now().await;
        assert!(reports[0].error.as_deref().unwrap().contains("parse"));
    }

    #[tokio::test]
    async fn test_transient_add_failure_retried_next_cycle() {
        let (engine, fetcher, registry, pipeline) = setup().await;
        fetcher
            .set_feed(URL, rss_feed(&[("Ubuntu", &test_magnet(1, "Ubuntu"))]))
            .await;
        pipeline.add_feed(linux_feed(Vec::new())).await.unwrap();

        engine
            .set_next_add_error(crate::engine::EngineError::ConnectionFailed("down".into()))
            .await;
        let first = pipeline.poll_now().await;
        assert_eq!(first[0].failed.len(), 1);
        assert!(registry.is_empty().await);

        let second = pipeline.poll_now().await;
        assert_eq!(second[0].acquired.len(), 1);
    }

    #[tokio::test]
    async fn test_feed_management() {
        let (_engine, _fetcher, _registry, pipeline) = setup().await;
        pipeline.add_feed(linux_feed(Vec::new())).await.unwrap();

        assert!(matches!(
            pipeline.add_feed(linux_feed(Vec::new())).await,
            Err(RssError::DuplicateFeed(_))
        ));
        pipeline
            .add_filter("linux", FeedFilter::include("Ubuntu", 3))
            .await
            .unwrap();
        assert_eq!(pipeline.feeds().await[0].filters.len(), 1);
        assert!(matches!(
            pipeline.add_filter("nope", FeedFilter::include("x", 3)).await,
            Err(RssError::FeedNotFound(_))
        ));

        pipeline.remove_feed("linux").await.unwrap();
        assert!(pipeline.feeds().await.is_empty());
        assert!(matches!(
            pipeline.remove_feed("linux").await,
            Err(RssError::FeedNotFound(_))
        ));
    }
}
