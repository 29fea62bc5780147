//! Fleet orchestrator: owns every subsystem and drives the background loops.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::config::{OrchestratorConfig, SHUTDOWN_BACKUP_LABEL};
use super::types::{FleetStats, OrchestratorError, OrchestratorStatus, TorrentInfo};
use crate::automation::{rule_from_config, AutomationRule, RuleEngine, RuleView};
use crate::backup::{BackupError, BackupInfo, BackupManager, RestoreReport};
use crate::config::{Config, FeedConfig, FilterConfig, ScheduleConfig, SessionConfig};
use crate::engine::{TorrentState, TransferEngine};
use crate::fleet::{
    AddTorrentOptions, AttributeController, FleetError, FleetRegistry, RegistryConfig,
    TorrentEntry, TorrentId,
};
use crate::rss::{Feed, FeedFetcher, FeedFilter, FeedView, PollReport, RssPipeline};
use crate::scheduler::{FireRecord, Schedule, ScheduleView, Scheduler};
use crate::stats::{DailyStats, PeriodStats, StatsSampler, StatsStore};

/// The fleet orchestrator.
///
/// Commands go straight to the owned subsystems. `start` spawns one task per
/// background loop; `stop` signals them, waits for in-flight ticks, then
/// releases engine handles.
pub struct Orchestrator {
    config: OrchestratorConfig,
    engine: Arc<dyn TransferEngine>,
    session: SessionConfig,
    registry: Arc<FleetRegistry>,
    attributes: Arc<AttributeController>,
    sampler: Arc<StatsSampler>,
    backup: Arc<BackupManager>,
    scheduler: Arc<Scheduler>,
    rss: Arc<RssPipeline>,
    automation: Arc<RuleEngine>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build the subsystems and register the schedules, feeds and rules
    /// declared in `config`.
    pub async fn new(
        config: &Config,
        engine: Arc<dyn TransferEngine>,
        fetcher: Arc<dyn FeedFetcher>,
        stats_store: Option<Arc<dyn StatsStore>>,
    ) -> Result<Self, OrchestratorError> {
        let registry = Arc::new(FleetRegistry::new(
            engine.clone(),
            RegistryConfig::from_config(&config.engine, &config.session),
        ));
        let attributes = Arc::new(AttributeController::new(registry.clone()));
        let sampler = Arc::new(StatsSampler::new(registry.clone(), &config.stats, stats_store));
        let backup = Arc::new(BackupManager::new(
            registry.clone(),
            attributes.clone(),
            config.session.clone(),
            config.backup.dir.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(registry.clone(), &config.scheduler));
        let rss = Arc::new(RssPipeline::new(registry.clone(), fetcher, &config.rss));
        let automation = Arc::new(RuleEngine::new(Duration::from_secs(
            config.automation.interval_secs,
        )));

        for schedule in &config.scheduler.schedules {
            scheduler.add_schedule(Schedule::from_config(schedule)?).await?;
        }
        for feed in &config.rss.feeds {
            rss.add_feed(Feed::from_config(feed, rss.default_poll_interval()))
                .await?;
        }
        for rule in &config.automation.rules {
            automation
                .add_rule(rule_from_config(rule, registry.clone(), backup.clone()))
                .await?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config: OrchestratorConfig::from(config),
            engine,
            session: config.session.clone(),
            registry,
            attributes,
            sampler,
            backup,
            scheduler,
            rss,
            automation,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Apply session settings, optionally restore, then spawn the loops.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!(engine = %self.registry.engine_name(), "Starting orchestrator");

        if let Err(e) = self.engine.apply_session_settings(&self.session).await {
            warn!(error = %e, "Failed to apply session settings");
        }

        if self.config.restore_on_start && self.registry.is_empty().await {
            self.restore_on_start().await;
        }

        let mut handles = Vec::with_capacity(4);

        let sampler = self.sampler.clone();
        handles.push(self.spawn_loop("Stats", sampler.interval(), move || {
            let sampler = sampler.clone();
            async move {
                let sample = sampler.tick().await;
                debug!(
                    torrents = sample.torrents.len(),
                    failed = sample.failed.len(),
                    "Stats sample recorded"
                );
            }
        }));

        let scheduler = self.scheduler.clone();
        handles.push(self.spawn_loop("Scheduler", scheduler.tick_interval(), move || {
            let scheduler = scheduler.clone();
            async move {
                for record in scheduler.tick().await {
                    debug!(
                        schedule = %record.schedule,
                        outcome = record.outcome.label(),
                        "Schedule fire recorded"
                    );
                }
            }
        }));

        let rss = self.rss.clone();
        handles.push(self.spawn_loop("RSS", rss.poll_tick(), move || {
            let rss = rss.clone();
            async move {
                for report in rss.poll_due().await {
                    if let Some(e) = &report.error {
                        warn!(feed_id = %report.feed_id, error = %e, "Feed poll failed");
                    }
                }
            }
        }));

        let automation = self.automation.clone();
        handles.push(self.spawn_loop("Automation", automation.interval(), move || {
            let automation = automation.clone();
            async move {
                automation.evaluate().await;
            }
        }));

        self.tasks.lock().await.extend(handles);
        info!("Orchestrator started");
    }

    /// Stop the loops, take the shutdown backup if configured, then release
    /// every engine handle. Torrents keep running in the engine.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Orchestrator not running");
            return;
        }

        info!("Stopping orchestrator");
        let _ = self.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Background loop ended abnormally");
            }
        }

        if self.config.backup_on_shutdown {
            match self.backup.create_backup(SHUTDOWN_BACKUP_LABEL).await {
                Ok(info) => info!(
                    backup = %info.name,
                    entries = info.entries,
                    "Shutdown backup written"
                ),
                Err(e) => warn!(error = %e, "Shutdown backup failed"),
            }
        }

        let released = self.registry.release_all().await;
        info!(released = released, "Orchestrator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn restore_on_start(&self) {
        let snapshot = match self.backup.load_latest().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("No backup to restore");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load latest backup");
                return;
            }
        };

        match self.backup.restore(&snapshot).await {
            Ok(report) => info!(
                label = %snapshot.label,
                restored = report.restored.len(),
                "Fleet restored from backup"
            ),
            Err(e) => warn!(label = %snapshot.label, error = %e, "Restore on start incomplete"),
        }
    }

    fn spawn_loop<F, Fut>(&self, name: &'static str, period: Duration, tick: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let running = self.running.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(period_secs = period.as_secs_f64(), "{} loop started", name);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("{} loop received shutdown signal", name);
                        break;
                    }
                    _ = ticker.tick() => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        tick().await;
                    }
                }
            }

            info!("{} loop stopped", name);
        })
    }

    // =========================================================================
    // Torrent commands
    // =========================================================================

    pub async fn add(
        &self,
        source: &str,
        options: AddTorrentOptions,
    ) -> Result<TorrentEntry, OrchestratorError> {
        let id = self.registry.add(source, options).await?;
        Ok(self.registry.get(id).await?)
    }

    pub async fn list(&self, status: Option<TorrentState>) -> Vec<TorrentEntry> {
        self.registry.list(status).await
    }

    /// Poll every torrent, then list. Entries the engine did not answer
    /// for keep their cached status.
    pub async fn list_live(&self, status: Option<TorrentState>) -> Vec<TorrentEntry> {
        for (id, result) in self.registry.refresh_all().await {
            if let Err(e) = result {
                debug!(torrent_id = %id, error = %e, "Using cached status");
            }
        }
        self.registry.list(status).await
    }

    pub async fn get(&self, id: TorrentId) -> Result<TorrentEntry, OrchestratorError> {
        Ok(self.registry.get(id).await?)
    }

    pub async fn pause(&self, id: TorrentId) -> Result<TorrentEntry, OrchestratorError> {
        self.registry.pause(id).await?;
        self.get(id).await
    }

    pub async fn resume(&self, id: TorrentId) -> Result<TorrentEntry, OrchestratorError> {
        self.registry.resume(id).await?;
        self.get(id).await
    }

    pub async fn remove(&self, id: TorrentId, delete_data: bool) -> Result<(), OrchestratorError> {
        Ok(self.registry.remove(id, delete_data).await?)
    }

    pub async fn set_priority(
        &self,
        id: TorrentId,
        level: i64,
    ) -> Result<TorrentEntry, OrchestratorError> {
        self.attributes.set_priority(id, level).await?;
        self.get(id).await
    }

    pub async fn set_file_priority(
        &self,
        id: TorrentId,
        file_index: usize,
        level: i64,
    ) -> Result<TorrentEntry, OrchestratorError> {
        self.attributes.set_file_priority(id, file_index, level).await?;
        self.get(id).await
    }

    pub async fn add_trackers(
        &self,
        id: TorrentId,
        urls: &[String],
    ) -> Result<TorrentEntry, OrchestratorError> {
        self.attributes.add_trackers(id, urls).await?;
        self.get(id).await
    }

    pub async fn remove_trackers(
        &self,
        id: TorrentId,
        urls: &[String],
    ) -> Result<TorrentEntry, OrchestratorError> {
        self.attributes.remove_trackers(id, urls).await?;
        self.get(id).await
    }

    pub async fn set_sequential(
        &self,
        id: TorrentId,
        enabled: bool,
    ) -> Result<TorrentEntry, OrchestratorError> {
        self.attributes.set_sequential(id, enabled).await?;
        self.get(id).await
    }

    pub async fn set_super_seeding(
        &self,
        id: TorrentId,
        enabled: bool,
    ) -> Result<TorrentEntry, OrchestratorError> {
        self.attributes.set_super_seeding(id, enabled).await?;
        self.get(id).await
    }

    pub async fn force_recheck(&self, id: TorrentId) -> Result<TorrentEntry, OrchestratorError> {
        self.attributes.force_recheck(id).await?;
        self.get(id).await
    }

    pub async fn set_download_limit(
        &self,
        id: TorrentId,
        kbps: u64,
    ) -> Result<TorrentEntry, OrchestratorError> {
        self.attributes.set_download_limit(id, kbps).await?;
        self.get(id).await
    }

    pub async fn set_upload_limit(
        &self,
        id: TorrentId,
        kbps: u64,
    ) -> Result<TorrentEntry, OrchestratorError> {
        self.attributes.set_upload_limit(id, kbps).await?;
        self.get(id).await
    }

    pub async fn move_storage(
        &self,
        id: TorrentId,
        path: &str,
    ) -> Result<TorrentEntry, OrchestratorError> {
        self.attributes.move_storage(id, path).await?;
        self.get(id).await
    }

    pub async fn search(&self, query: &str) -> Vec<TorrentEntry> {
        self.registry.search(query).await
    }

    /// Entry with a fresh status and its file list.
    ///
    /// Falls back to the cached status when the engine does not answer.
    pub async fn info(&self, id: TorrentId) -> Result<TorrentInfo, OrchestratorError> {
        let live = match self.registry.refresh(id).await {
            Ok(_) => true,
            Err(FleetError::NotFound(id)) => return Err(FleetError::NotFound(id).into()),
            Err(e) => {
                debug!(torrent_id = %id, error = %e, "Using cached status");
                false
            }
        };
        let entry = self.registry.get(id).await?;
        let files = match self.registry.files(id).await {
            Ok(files) => files,
            Err(FleetError::NotFound(id)) => return Err(FleetError::NotFound(id).into()),
            Err(e) => {
                debug!(torrent_id = %id, error = %e, "File list unavailable");
                Vec::new()
            }
        };
        Ok(TorrentInfo { entry, files, live })
    }

    pub async fn export(&self, id: TorrentId) -> Result<Vec<u8>, OrchestratorError> {
        Ok(self.registry.export_torrent_file(id).await?)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    pub async fn stats(&self) -> Result<FleetStats, OrchestratorError> {
        Ok(FleetStats {
            totals: self.sampler.session_totals().await,
            today: self.sampler.get_daily_stats(Utc::now().date_naive()).await?,
            latest_sample: self.sampler.latest().await,
        })
    }

    pub async fn daily_stats(&self, date: NaiveDate) -> Result<DailyStats, OrchestratorError> {
        Ok(self.sampler.get_daily_stats(date).await?)
    }

    /// Seven days ending at `end` (today when `None`).
    pub async fn weekly_stats(
        &self,
        end: Option<NaiveDate>,
    ) -> Result<PeriodStats, OrchestratorError> {
        let end = end.unwrap_or_else(|| Utc::now().date_naive());
        Ok(self.sampler.get_weekly_stats(end).await?)
    }

    // =========================================================================
    // Schedules
    // =========================================================================

    pub async fn add_schedule(
        &self,
        config: &ScheduleConfig,
    ) -> Result<ScheduleView, OrchestratorError> {
        let schedule = Schedule::from_config(config)?;
        let name = schedule.name.clone();
        self.scheduler.add_schedule(schedule).await?;
        Ok(self
            .scheduler
            .schedules()
            .await
            .into_iter()
            .find(|v| v.name == name)
            .ok_or(crate::scheduler::SchedulerError::ScheduleNotFound(name))?)
    }

    pub async fn remove_schedule(&self, name: &str) -> Result<(), OrchestratorError> {
        Ok(self.scheduler.remove_schedule(name).await?)
    }

    pub async fn schedules(&self) -> Vec<ScheduleView> {
        self.scheduler.schedules().await
    }

    pub async fn schedule_history(&self) -> Vec<FireRecord> {
        self.scheduler.history().await
    }

    // =========================================================================
    // Feeds
    // =========================================================================

    pub async fn add_feed(&self, config: &FeedConfig) -> Result<(), OrchestratorError> {
        let feed = Feed::from_config(config, self.rss.default_poll_interval());
        Ok(self.rss.add_feed(feed).await?)
    }

    pub async fn remove_feed(&self, feed_id: &str) -> Result<(), OrchestratorError> {
        Ok(self.rss.remove_feed(feed_id).await?)
    }

    pub async fn add_filter(
        &self,
        feed_id: &str,
        filter: &FilterConfig,
    ) -> Result<(), OrchestratorError> {
        Ok(self.rss.add_filter(feed_id, FeedFilter::from(filter)).await?)
    }

    pub async fn feeds(&self) -> Vec<FeedView> {
        self.rss.feeds().await
    }

    /// Poll every feed now, ignoring intervals.
    pub async fn poll_feeds(&self) -> Vec<PollReport> {
        self.rss.poll_now().await
    }

    // =========================================================================
    // Rules
    // =========================================================================

    pub async fn add_rule(&self, rule: AutomationRule) -> Result<(), OrchestratorError> {
        Ok(self.automation.add_rule(rule).await?)
    }

    pub async fn remove_rule(&self, rule_id: &str) -> Result<(), OrchestratorError> {
        Ok(self.automation.remove_rule(rule_id).await?)
    }

    pub async fn enable_rule(&self, rule_id: &str) -> Result<(), OrchestratorError> {
        Ok(self.automation.enable_rule(rule_id).await?)
    }

    pub async fn disable_rule(&self, rule_id: &str) -> Result<(), OrchestratorError> {
        Ok(self.automation.disable_rule(rule_id).await?)
    }

    pub async fn rules(&self) -> Vec<RuleView> {
        self.automation.rules().await
    }

    // =========================================================================
    // Backups
    // =========================================================================

    pub async fn create_backup(&self, label: &str) -> Result<BackupInfo, OrchestratorError> {
        Ok(self.backup.create_backup(label).await?)
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>, OrchestratorError> {
        Ok(self.backup.list_backups().await?)
    }

    /// Restore the named backup, or the newest one when `name` is `None`.
    pub async fn restore_backup(
        &self,
        name: Option<&str>,
    ) -> Result<RestoreReport, OrchestratorError> {
        let snapshot = match name {
            Some(name) => self.backup.load_backup(name).await?,
            None => self
                .backup
                .load_latest()
                .await?
                .ok_or_else(|| BackupError::NotFound("no backups available".to_string()))?,
        };
        Ok(self.backup.restore(&snapshot).await?)
    }

    // =========================================================================
    // Status and accessors
    // =========================================================================

    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            running: self.is_running(),
            engine: self.registry.engine_name().to_string(),
            torrents: self.registry.len().await,
            schedules: self.scheduler.schedules().await.len(),
            feeds: self.rss.feeds().await.len(),
            rules: self.automation.rules().await.len(),
        }
    }

    pub fn registry(&self) -> &Arc<FleetRegistry> {
        &self.registry
    }

    pub fn sampler(&self) -> &Arc<StatsSampler> {
        &self.sampler
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn rss(&self) -> &Arc<RssPipeline> {
        &self.rss
    }

    pub fn automation(&self) -> &Arc<RuleEngine> {
        &self.automation
    }

    pub fn backup_manager(&self) -> &Arc<BackupManager> {
        &self.backup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_magnet, MockEngine, MockFeedFetcher};

    async fn orchestrator(config: Config) -> (Orchestrator, MockEngine) {
        let engine = MockEngine::new();
        let orchestrator = Orchestrator::new(
            &config,
            Arc::new(engine.clone()),
            Arc::new(MockFeedFetcher::new()),
            None,
        )
        .await
        .unwrap();
        (orchestrator, engine)
    }

    fn config_in(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.backup.dir = dir.path().to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _) = orchestrator(config_in(&dir)).await;

        orchestrator.start().await;
        orchestrator.start().await;
        assert!(orchestrator.is_running());
        assert_eq!(orchestrator.tasks.lock().await.len(), 4);

        orchestrator.stop().await;
        assert!(!orchestrator.is_running());
        assert!(orchestrator.tasks.lock().await.is_empty());
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_start_applies_session_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.session.max_upload_speed = 512;
        let (orchestrator, engine) = orchestrator(config).await;

        orchestrator.start().await;
        let applied = engine.session_settings().await.unwrap();
        assert_eq!(applied.max_upload_speed, 512);
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_info_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, engine) = orchestrator(config_in(&dir)).await;
        let entry = orchestrator
            .add(&test_magnet(1, "one"), AddTorrentOptions::default())
            .await
            .unwrap();

        let info = orchestrator.info(entry.id).await.unwrap();
        assert!(info.live);
        assert!(!info.files.is_empty());

        engine.fail_key(&entry.info_hash).await;
        let info = orchestrator.info(entry.id).await.unwrap();
        assert!(!info.live);
        assert!(info.files.is_empty());
        assert_eq!(info.entry.id, entry.id);

        assert!(matches!(
            orchestrator.info(TorrentId(99)).await,
            Err(OrchestratorError::Fleet(FleetError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_config_declarations_registered() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.scheduler.schedules.push(ScheduleConfig {
            name: "night".to_string(),
            torrent_id: 1,
            action: "pause".to_string(),
            time: "23:00".to_string(),
            weekdays: vec![],
        });
        config.rss.feeds.push(FeedConfig {
            feed_id: "distros".to_string(),
            url: "https://example.org/rss".to_string(),
            poll_interval_secs: None,
            filters: vec![],
        });
        let (orchestrator, _) = orchestrator(config).await;

        let status = orchestrator.status().await;
        assert_eq!(status.schedules, 1);
        assert_eq!(status.feeds, 1);
        assert_eq!(status.rules, 0);
        assert_eq!(status.engine, "mock");
    }

    #[tokio::test]
    async fn test_restore_without_backups_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _) = orchestrator(config_in(&dir)).await;

        assert!(matches!(
            orchestrator.restore_backup(None).await,
            Err(OrchestratorError::Backup(BackupError::NotFound(_)))
        ));
    }
}
