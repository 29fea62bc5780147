//! Fleet conditions and actions declared in config.
//!
//! Conditions read the registry's cached statuses; the stats sampler keeps
//! them fresh, so evaluating a rule never waits on the engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{Action, AutomationRule, Condition};
use crate::backup::BackupManager;
use crate::config::{ActionConfig, ConditionConfig, RuleConfig};
use crate::engine::TorrentState;
use crate::fleet::{FleetRegistry, TorrentEntry, TorrentId};

pub struct FleetCondition {
    registry: Arc<FleetRegistry>,
    config: ConditionConfig,
}

impl FleetCondition {
    pub fn new(registry: Arc<FleetRegistry>, config: ConditionConfig) -> Self {
        Self { registry, config }
    }
}

#[async_trait]
impl Condition for FleetCondition {
    async fn evaluate(&self) -> anyhow::Result<bool> {
        let entries = self.registry.list(None).await;
        Ok(match &self.config {
            ConditionConfig::AllComplete => {
                !entries.is_empty() && entries.iter().all(is_complete)
            }
            ConditionConfig::DownloadRateAbove { bytes_per_sec } => {
                let total: u64 = entries
                    .iter()
                    .map(|e| e.last_known_status.download_rate)
                    .sum();
                total > *bytes_per_sec
            }
            ConditionConfig::ActiveDownloadsAbove { count } => {
                let active = entries
                    .iter()
                    .filter(|e| e.last_known_status.state == TorrentState::Downloading)
                    .count();
                active > *count
            }
        })
    }

    fn describe(&self) -> String {
        match &self.config {
            ConditionConfig::AllComplete => "all_complete".to_string(),
            ConditionConfig::DownloadRateAbove { bytes_per_sec } => {
                format!("download_rate_above({})", bytes_per_sec)
            }
            ConditionConfig::ActiveDownloadsAbove { count } => {
                format!("active_downloads_above({})", count)
            }
        }
    }
}

pub struct FleetAction {
    registry: Arc<FleetRegistry>,
    backup: Arc<BackupManager>,
    config: ActionConfig,
}

impl FleetAction {
    pub fn new(
        registry: Arc<FleetRegistry>,
        backup: Arc<BackupManager>,
        config: ActionConfig,
    ) -> Self {
        Self {
            registry,
            backup,
            config,
        }
    }

    async fn pause_where(&self, select: impl Fn(&TorrentEntry) -> bool) -> anyhow::Result<()> {
        let targets: Vec<TorrentId> = self
            .registry
            .list(None)
            .await
            .iter()
            .filter(|e| e.last_known_status.state != TorrentState::Paused && select(e))
            .map(|e| e.id)
            .collect();

        let mut failures = Vec::new();
        for id in targets {
            if let Err(e) = self.registry.pause(id).await {
                failures.push(format!("{}: {}", id, e));
            }
        }
        summarize("pause", failures)
    }

    async fn resume_paused(&self) -> anyhow::Result<()> {
        let targets = self.registry.list(Some(TorrentState::Paused)).await;
        let mut failures = Vec::new();
        for entry in targets {
            if let Err(e) = self.registry.resume(entry.id).await {
                failures.push(format!("{}: {}", entry.id, e));
            }
        }
        summarize("resume", failures)
    }
}

#[async_trait]
impl Action for FleetAction {
    async fn act(&self) -> anyhow::Result<()> {
        match &self.config {
            ActionConfig::PauseAll => self.pause_where(|_| true).await,
            ActionConfig::ResumeAll => self.resume_paused().await,
            ActionConfig::PauseCompleted => self.pause_where(is_complete).await,
            ActionConfig::CreateBackup { label } => {
                self.backup.create_backup(label).await?;
                Ok(())
            }
        }
    }

    fn describe(&self) -> String {
        match &self.config {
            ActionConfig::PauseAll => "pause_all".to_string(),
            ActionConfig::ResumeAll => "resume_all".to_string(),
            ActionConfig::PauseCompleted => "pause_completed".to_string(),
            ActionConfig::CreateBackup { label } => format!("create_backup({})", label),
        }
    }
}

/// Build a rule from its config declaration.
pub fn rule_from_config(
    config: &RuleConfig,
    registry: Arc<FleetRegistry>,
    backup: Arc<BackupManager>,
) -> AutomationRule {
    let mut rule = AutomationRule::new(
        config.rule_id.clone(),
        Arc::new(FleetCondition::new(registry.clone(), config.condition.clone())),
        Arc::new(FleetAction::new(registry, backup, config.action.clone())),
        Duration::from_secs(config.cooldown_secs),
    );
    rule.enabled = config.enabled;
    rule
}

fn is_complete(entry: &TorrentEntry) -> bool {
    entry.last_known_status.progress >= 1.0
}

fn summarize(verb: &str, failures: Vec<String>) -> anyhow::Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("failed to {} {} torrent(s): {}", verb, failures.len(), failures.join(", "))
    }
}
