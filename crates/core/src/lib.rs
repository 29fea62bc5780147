pub mod automation;
pub mod backup;
pub mod config;
pub mod engine;
pub mod fleet;
pub mod metrics;
pub mod orchestrator;
pub mod rss;
pub mod scheduler;
pub mod stats;
pub mod testing;

pub use automation::{AutomationError, AutomationRule, RuleEngine};
pub use backup::{BackupError, BackupInfo, BackupManager, BackupSnapshot, RestoreReport};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use engine::{create_engine, EngineError, TorrentState, TransferEngine};
pub use fleet::{AddTorrentOptions, FleetError, FleetRegistry, TorrentEntry, TorrentId};
pub use orchestrator::{
    FleetStats, Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorStatus,
    TorrentInfo,
};
pub use rss::{FeedFetcher, HttpFeedFetcher, RssError, RssPipeline};
pub use scheduler::{Scheduler, SchedulerError};
pub use stats::{SqliteStatsStore, StatsError, StatsSampler, StatsStore};
