//! Periodic fleet sampling and daily rollups.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::store::StatsStore;
use super::types::{DailyStats, FleetTotals, PeriodStats, StatSample, StatsError, TorrentSample};
use crate::config::StatsConfig;
use crate::fleet::{FleetRegistry, TorrentId};
use crate::metrics::{STATS_SAMPLES, STATS_SAMPLE_FAILURES};

#[derive(Default)]
struct SamplerState {
    /// Oldest first.
    samples: VecDeque<StatSample>,
    /// Running rollup for the day of the latest sample.
    today: Option<DailyStats>,
    /// Last observed completion flag per torrent.
    complete: HashMap<TorrentId, bool>,
    last_sample_at: Option<DateTime<Utc>>,
}

/// Samples the fleet and keeps a bounded in-memory history.
///
/// Each sample is also folded into a per-day rollup, which is written to the
/// optional store so daily figures survive eviction and restarts.
pub struct StatsSampler {
    registry: Arc<FleetRegistry>,
    interval: Duration,
    retention: chrono::Duration,
    store: Option<Arc<dyn StatsStore>>,
    state: RwLock<SamplerState>,
}

impl StatsSampler {
    pub fn new(
        registry: Arc<FleetRegistry>,
        config: &StatsConfig,
        store: Option<Arc<dyn StatsStore>>,
    ) -> Self {
        Self {
            registry,
            interval: Duration::from_secs(config.interval_secs),
            retention: chrono::Duration::seconds(config.retention_secs as i64),
            store,
            state: RwLock::new(SamplerState::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn tick(&self) -> StatSample {
        self.tick_at(Utc::now()).await
    }

    /// Take one sample at `now`.
    ///
    /// Torrents whose status cannot be read are listed in `failed` and left
    /// out of the totals; the tick itself never fails.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> StatSample {
        let results = self.registry.refresh_all().await;

        let mut torrents = Vec::with_capacity(results.len());
        let mut statuses = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for (id, result) in results {
            match result {
                Ok(status) => {
                    torrents.push(TorrentSample {
                        id,
                        progress: status.progress,
                        download_rate: status.download_rate,
                        upload_rate: status.upload_rate,
                        num_peers: status.num_peers,
                        state: status.state,
                    });
                    statuses.push(status);
                }
                Err(e) => {
                    debug!(torrent_id = %id, error = %e, "Status unavailable for sample");
                    STATS_SAMPLE_FAILURES.inc();
                    failed.push(id);
                }
            }
        }

        let sample = StatSample {
            timestamp: now,
            totals: FleetTotals::from_statuses(&statuses),
            torrents,
            failed,
        };

        let mut state = self.state.write().await;

        let mut newly_completed = 0;
        for torrent in &sample.torrents {
            let complete = torrent.progress >= 1.0;
            let previous = state.complete.insert(torrent.id, complete);
            if complete && previous == Some(false) {
                newly_completed += 1;
            }
        }
        let live: Vec<TorrentId> = sample
            .torrents
            .iter()
            .map(|t| t.id)
            .chain(sample.failed.iter().copied())
            .collect();
        state.complete.retain(|id, _| live.contains(id));

        let interval_secs = self.interval.as_secs_f64();
        let elapsed_secs = state
            .last_sample_at
            .map(|prev| (now - prev).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(interval_secs)
            .min(interval_secs * 2.0);
        state.last_sample_at = Some(now);

        let date = now.date_naive();
        let mut today = match state.today.take() {
            Some(rollup) if rollup.date == date => rollup,
            Some(previous) => {
                self.persist(&previous);
                self.load_or_empty(date)
            }
            None => self.load_or_empty(date),
        };
        today.absorb(&sample, elapsed_secs, newly_completed);
        self.persist(&today);
        state.today = Some(today);

        state.samples.push_back(sample.clone());
        let cutoff = now - self.retention;
        while state
            .samples
            .front()
            .map(|s| s.timestamp < cutoff)
            .unwrap_or(false)
        {
            state.samples.pop_front();
        }

        STATS_SAMPLES.inc();
        debug!(
            torrents = sample.torrents.len(),
            failed = sample.failed.len(),
            download_rate = sample.totals.download_rate,
            "Stats sample recorded"
        );
        sample
    }

    fn load_or_empty(&self, date: NaiveDate) -> DailyStats {
        let Some(store) = &self.store else {
            return DailyStats::empty(date);
        };
        match store.get_daily(date) {
            Ok(Some(existing)) => existing,
            Ok(None) => DailyStats::empty(date),
            Err(e) => {
                warn!(date = %date, error = %e, "Failed to load daily stats");
                DailyStats::empty(date)
            }
        }
    }

    fn persist(&self, stats: &DailyStats) {
        if let Some(store) = &self.store {
            if let Err(e) = store.upsert_daily(stats) {
                warn!(date = %stats.date, error = %e, "Failed to persist daily stats");
            }
        }
    }

    /// Retained samples, oldest first.
    pub async fn samples(&self) -> Vec<StatSample> {
        self.state.read().await.samples.iter().cloned().collect()
    }

    pub async fn latest(&self) -> Option<StatSample> {
        self.state.read().await.samples.back().cloned()
    }

    /// Rollup for one UTC day; a day without samples is an empty rollup.
    pub async fn get_daily_stats(&self, date: NaiveDate) -> Result<DailyStats, StatsError> {
        let state = self.state.read().await;
        if let Some(today) = state.today.as_ref().filter(|t| t.date == date) {
            return Ok(today.clone());
        }

        if let Some(store) = &self.store {
            if let Some(stored) = store.get_daily(date)? {
                return Ok(stored);
            }
        }

        Ok(self.fold_retained(&state.samples, date))
    }

    /// The seven days ending at `end` (inclusive).
    pub async fn get_weekly_stats(&self, end: NaiveDate) -> Result<PeriodStats, StatsError> {
        let start = end - chrono::Duration::days(6);
        let mut days = Vec::with_capacity(7);
        for offset in (0..7).rev() {
            days.push(self.get_daily_stats(end - chrono::Duration::days(offset)).await?);
        }
        Ok(PeriodStats::from_days(start, end, days))
    }

    /// Totals over the registry's cached statuses, without touching the engine.
    pub async fn session_totals(&self) -> FleetTotals {
        let entries = self.registry.list(None).await;
        FleetTotals::from_statuses(entries.iter().map(|e| &e.last_known_status))
    }

    fn fold_retained(&self, samples: &VecDeque<StatSample>, date: NaiveDate) -> DailyStats {
        let mut daily = DailyStats::empty(date);
        let mut complete: HashMap<TorrentId, bool> = HashMap::new();
        let mut previous: Option<DateTime<Utc>> = None;
        let interval_secs = self.interval.as_secs_f64();

        for sample in samples {
            let mut newly_completed = 0;
            for torrent in &sample.torrents {
                let done = torrent.progress >= 1.0;
                if complete.insert(torrent.id, done) == Some(false) && done {
                    newly_completed += 1;
                }
            }
            let elapsed = previous
                .map(|p| (sample.timestamp - p).num_milliseconds().max(0) as f64 / 1000.0)
                .unwrap_or(interval_secs)
                .min(interval_secs * 2.0);
            previous = Some(sample.timestamp);

            if sample.timestamp.date_naive() == date {
                daily.absorb(sample, elapsed, newly_completed);
            }
        }
        daily
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::fleet::RegistryConfig;
    use crate::stats::SqliteStatsStore;
    use crate::testing::{test_magnet, MockEngine};
    use chrono::TimeZone;

    fn config() -> StatsConfig {
        StatsConfig {
            interval_secs: 60,
            retention_secs: 3600,
        }
    }

    async fn setup() -> (MockEngine, Arc<FleetRegistry>) {
        let engine = MockEngine::new();
        let mut session = SessionConfig::default();
        session.auto_start = true;
        let registry = Arc::new(FleetRegistry::new(
            Arc::new(engine.clone()),
            RegistryConfig {
                session,
                ..RegistryConfig::default()
            },
        ));
        (engine, registry)
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_sample_totals() {
        let (engine, registry) = setup().await;
        let a = registry.add(&test_magnet(1, "a"), Default::default()).await.unwrap();
        let b = registry.add(&test_magnet(2, "b"), Default::default()).await.unwrap();
        let key_a = registry.get(a).await.unwrap().info_hash;
        let key_b = registry.get(b).await.unwrap().info_hash;
        engine.set_rates(&key_a, 1000, 10).await;
        engine.set_rates(&key_b, 500, 20).await;

        let sampler = StatsSampler::new(registry, &config(), None);
        let sample = sampler.tick_at(at(12, 0)).await;

        assert_eq!(sample.torrents.len(), 2);
        assert_eq!(sample.totals.download_rate, 1500);
        assert_eq!(sample.totals.upload_rate, 30);
        assert_eq!(sample.totals.active, 2);
        assert!(sample.failed.is_empty());
    }

    #[tokio::test]
    async fn test_failed_torrent_is_partial() {
        let (engine, registry) = setup().await;
        let a = registry.add(&test_magnet(1, "a"), Default::default()).await.unwrap();
        registry.add(&test_magnet(2, "b"), Default::default()).await.unwrap();
        let key_a = registry.get(a).await.unwrap().info_hash;
        engine.fail_key(&key_a).await;

        let sampler = StatsSampler::new(registry, &config(), None);
        let sample = sampler.tick_at(at(12, 0)).await;

        assert_eq!(sample.torrents.len(), 1);
        assert_eq!(sample.failed, vec![a]);
        assert_eq!(sampler.samples().await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_fleet_still_samples() {
        let (_engine, registry) = setup().await;
        let sampler = StatsSampler::new(registry, &config(), None);

        let sample = sampler.tick_at(at(12, 0)).await;
        assert!(sample.torrents.is_empty());
        assert_eq!(sample.totals, FleetTotals::default());
    }

    #[tokio::test]
    async fn test_retention_evicts_old_samples() {
        let (_engine, registry) = setup().await;
        let sampler = StatsSampler::new(registry, &config(), None);

        sampler.tick_at(at(10, 0)).await;
        sampler.tick_at(at(10, 30)).await;
        sampler.tick_at(at(11, 31)).await;

        let samples = sampler.samples().await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].timestamp, at(11, 31));
    }

    #[tokio::test]
    async fn test_daily_rollup_counts_completions_and_bytes() {
        let (engine, registry) = setup().await;
        let id = registry.add(&test_magnet(1, "a"), Default::default()).await.unwrap();
        let key = registry.get(id).await.unwrap().info_hash;
        engine.set_rates(&key, 100, 0).await;

        let sampler = StatsSampler::new(registry, &config(), None);
        sampler.tick_at(at(12, 0)).await;
        engine.set_progress(&key, 1.0).await;
        sampler.tick_at(at(12, 1)).await;
        sampler.tick_at(at(12, 2)).await;

        let daily = sampler.get_daily_stats(at(12, 0).date_naive()).await.unwrap();
        assert_eq!(daily.sample_count, 3);
        assert_eq!(daily.torrents_completed, 1);
        assert_eq!(daily.peak_download_rate, 100);
        // Completion drops the download rate to zero
        assert_eq!(daily.downloaded_bytes, 100 * 60);
    }

    #[tokio::test]
    async fn test_day_without_samples_is_empty() {
        let (_engine, registry) = setup().await;
        let sampler = StatsSampler::new(registry, &config(), None);
        sampler.tick_at(at(12, 0)).await;

        let other = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let daily = sampler.get_daily_stats(other).await.unwrap();
        assert_eq!(daily.sample_count, 0);
        assert_eq!(daily.date, other);
    }

    #[tokio::test]
    async fn test_rollup_survives_in_store() {
        let (_engine, registry) = setup().await;
        let store: Arc<dyn StatsStore> = Arc::new(SqliteStatsStore::in_memory().unwrap());

        let sampler = StatsSampler::new(registry.clone(), &config(), Some(store.clone()));
        let day_one = Utc.with_ymd_and_hms(2024, 6, 9, 23, 59, 0).unwrap();
        sampler.tick_at(day_one).await;
        sampler.tick_at(at(0, 1)).await;

        // A fresh sampler reads past days back from the store
        let fresh = StatsSampler::new(registry, &config(), Some(store));
        let daily = fresh.get_daily_stats(day_one.date_naive()).await.unwrap();
        assert_eq!(daily.sample_count, 1);

        let weekly = fresh.get_weekly_stats(at(0, 0).date_naive()).await.unwrap();
        assert_eq!(weekly.days.len(), 7);
        assert_eq!(weekly.sample_count, 2);
    }

    #[tokio::test]
    async fn test_session_totals_use_cache() {
        let (engine, registry) = setup().await;
        let id = registry.add(&test_magnet(1, "a"), Default::default()).await.unwrap();
        let key = registry.get(id).await.unwrap().info_hash;
        engine.set_rates(&key, 42, 7).await;
        registry.refresh(id).await.unwrap();

        let sampler = StatsSampler::new(registry, &config(), None);
        engine.set_stall(Some(Duration::from_secs(5))).await;
        let totals = sampler.session_totals().await;
        assert_eq!(totals.num_torrents, 1);
        assert_eq!(totals.download_rate, 42);
    }
}
