use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub rss: RssConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    7340
}

/// Database configuration (daily statistics rollups)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tamer.db")
}

/// Transfer engine backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineBackend {
    #[default]
    Qbittorrent,
    Librqbit,
}

impl EngineBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineBackend::Qbittorrent => "qbittorrent",
            EngineBackend::Librqbit => "librqbit",
        }
    }
}

/// Transfer engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: EngineBackend,
    /// Upper bound for every engine call except add.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// Upper bound for add (magnet metadata resolution can be slow).
    #[serde(default = "default_add_timeout")]
    pub add_timeout_secs: u64,
    #[serde(default)]
    pub qbittorrent: Option<QBittorrentConfig>,
    #[serde(default)]
    pub librqbit: Option<LibrqbitConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::default(),
            call_timeout_secs: default_call_timeout(),
            add_timeout_secs: default_add_timeout(),
            qbittorrent: None,
            librqbit: None,
        }
    }
}

fn default_call_timeout() -> u64 {
    10
}

fn default_add_timeout() -> u64 {
    60
}

/// qBittorrent Web API connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// Web UI URL (e.g., "http://localhost:8080")
    pub url: String,
    pub username: String,
    pub password: String,
    /// HTTP request timeout in seconds (default: 30)
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_http_timeout() -> u64 {
    30
}

/// Embedded librqbit session
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LibrqbitConfig {
    /// Session persistence folder; no persistence when unset.
    #[serde(default)]
    pub persistence_path: Option<String>,
    #[serde(default)]
    pub listen_port: Option<u16>,
}

/// Session settings applied to the engine and used as add-time defaults
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_download_path")]
    pub download_path: String,
    /// KB/s, 0 = unlimited
    #[serde(default = "default_max_upload_speed")]
    pub max_upload_speed: u64,
    /// KB/s, 0 = unlimited
    #[serde(default)]
    pub max_download_speed: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_true")]
    pub enable_dht: bool,
    #[serde(default = "default_true")]
    pub enable_lsd: bool,
    #[serde(default = "default_true")]
    pub enable_upnp: bool,
    /// Start transfers immediately on add; paused otherwise.
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub sequential_download: bool,
    #[serde(default)]
    pub super_seeding: bool,
    #[serde(default = "default_priority")]
    pub default_priority: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            max_upload_speed: default_max_upload_speed(),
            max_download_speed: 0,
            max_connections: default_max_connections(),
            enable_dht: true,
            enable_lsd: true,
            enable_upnp: true,
            auto_start: false,
            sequential_download: false,
            super_seeding: false,
            default_priority: default_priority(),
        }
    }
}

fn default_download_path() -> String {
    "downloads".to_string()
}

fn default_max_upload_speed() -> u64 {
    500
}

fn default_max_connections() -> u32 {
    200
}

fn default_priority() -> u8 {
    5
}

fn default_true() -> bool {
    true
}

/// Statistics sampler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsConfig {
    #[serde(default = "default_sample_interval")]
    pub interval_secs: u64,
    /// Samples older than this are evicted from memory.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sample_interval(),
            retention_secs: default_retention(),
        }
    }
}

fn default_sample_interval() -> u64 {
    60
}

fn default_retention() -> u64 {
    24 * 60 * 60
}

/// Backup configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub on_shutdown: bool,
    #[serde(default)]
    pub restore_on_start: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            on_shutdown: false,
            restore_on_start: false,
        }
    }
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_tick")]
    pub tick_interval_secs: u64,
    /// A schedule fires while local time is within this many seconds after its slot.
    #[serde(default = "default_fire_window")]
    pub fire_window_secs: u64,
    /// A schedule is armed this many seconds before its slot.
    #[serde(default = "default_arm_lead")]
    pub arm_lead_secs: u64,
    #[serde(default)]
    pub schedules: Vec<ScheduleConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_scheduler_tick(),
            fire_window_secs: default_fire_window(),
            arm_lead_secs: default_arm_lead(),
            schedules: Vec::new(),
        }
    }
}

fn default_scheduler_tick() -> u64 {
    30
}

fn default_fire_window() -> u64 {
    60
}

fn default_arm_lead() -> u64 {
    300
}

/// A schedule declared in config
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    pub name: String,
    pub torrent_id: u64,
    /// start, stop, pause or resume
    pub action: String,
    /// "HH:MM" local time
    pub time: String,
    /// Weekday names; every day when empty.
    #[serde(default)]
    pub weekdays: Vec<String>,
}

/// RSS pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RssConfig {
    /// How often the poller looks for due feeds.
    #[serde(default = "default_rss_tick")]
    pub poll_tick_secs: u64,
    /// Per-feed interval when a feed does not set its own.
    #[serde(default = "default_feed_interval")]
    pub default_poll_interval_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Seen item keys remembered per feed.
    #[serde(default = "default_seen_retention")]
    pub seen_retention: usize,
    /// A feed without inclusion filters accepts every item not excluded.
    #[serde(default = "default_true")]
    pub accept_when_no_filters: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            poll_tick_secs: default_rss_tick(),
            default_poll_interval_secs: default_feed_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            seen_retention: default_seen_retention(),
            accept_when_no_filters: true,
            case_sensitive: false,
            feeds: Vec::new(),
        }
    }
}

fn default_rss_tick() -> u64 {
    300
}

fn default_feed_interval() -> u64 {
    3600
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_seen_retention() -> usize {
    1000
}

/// A feed declared in config
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    pub feed_id: String,
    pub url: String,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

/// A feed filter declared in config
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FilterConfig {
    pub pattern: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub exclude: bool,
}

/// Automation engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutomationConfig {
    #[serde(default = "default_automation_interval")]
    pub interval_secs: u64,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_automation_interval(),
            rules: Vec::new(),
        }
    }
}

fn default_automation_interval() -> u64 {
    10
}

/// A built-in rule declared in config
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    pub rule_id: String,
    #[serde(default)]
    pub cooldown_secs: u64,
    pub condition: ConditionConfig,
    pub action: ActionConfig,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Built-in fleet conditions
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionConfig {
    /// Fleet is non-empty and every torrent has finished downloading.
    AllComplete,
    /// Aggregate download rate exceeds the threshold (bytes/s).
    DownloadRateAbove { bytes_per_sec: u64 },
    /// More than `count` torrents are downloading.
    ActiveDownloadsAbove { count: usize },
}

/// Built-in fleet actions
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    PauseAll,
    ResumeAll,
    PauseCompleted,
    CreateBackup { label: String },
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub engine: SanitizedEngineConfig,
    pub session: SessionConfig,
    pub stats: StatsConfig,
    pub backup: BackupConfig,
    pub scheduler: SchedulerConfig,
    pub rss: RssConfig,
    pub automation: AutomationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEngineConfig {
    pub backend: String,
    pub call_timeout_secs: u64,
    pub add_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qbittorrent: Option<SanitizedQBittorrentConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub librqbit: Option<LibrqbitConfig>,
}

/// Sanitized qBittorrent config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedQBittorrentConfig {
    pub url: String,
    pub username: String,
    pub password_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            engine: SanitizedEngineConfig {
                backend: config.engine.backend.as_str().to_string(),
                call_timeout_secs: config.engine.call_timeout_secs,
                add_timeout_secs: config.engine.add_timeout_secs,
                qbittorrent: config
                    .engine
                    .qbittorrent
                    .as_ref()
                    .map(|q| SanitizedQBittorrentConfig {
                        url: q.url.clone(),
                        username: q.username.clone(),
                        password_configured: !q.password.is_empty(),
                        timeout_secs: q.timeout_secs,
                    }),
                librqbit: config.engine.librqbit.clone(),
            },
            session: config.session.clone(),
            stats: config.stats.clone(),
            backup: config.backup.clone(),
            scheduler: config.scheduler.clone(),
            rss: config.rss.clone(),
            automation: config.automation.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 7340);
        assert_eq!(config.engine.backend, EngineBackend::Qbittorrent);
        assert_eq!(config.session.max_upload_speed, 500);
        assert_eq!(config.session.max_download_speed, 0);
        assert_eq!(config.session.max_connections, 200);
        assert!(config.session.enable_dht);
        assert!(!config.session.auto_start);
        assert_eq!(config.session.default_priority, 5);
        assert_eq!(config.stats.interval_secs, 60);
        assert_eq!(config.scheduler.fire_window_secs, 60);
        assert_eq!(config.rss.default_poll_interval_secs, 3600);
        assert!(config.rss.accept_when_no_filters);
        assert_eq!(config.backup.dir, PathBuf::from("backups"));
    }

    #[test]
    fn test_deserialize_feeds_and_rules() {
        let toml = r#"
[[rss.feeds]]
feed_id = "distros"
url = "https://example.org/rss"
poll_interval_secs = 600

[[rss.feeds.filters]]
pattern = "Ubuntu"
priority = 6

[[rss.feeds.filters]]
pattern = "beta"
exclude = true

[[automation.rules]]
rule_id = "throttle"
cooldown_secs = 60
condition = { type = "download_rate_above", bytes_per_sec = 1048576 }
action = { type = "pause_all" }
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let feed = &config.rss.feeds[0];
        assert_eq!(feed.poll_interval_secs, Some(600));
        assert_eq!(feed.filters.len(), 2);
        assert_eq!(feed.filters[0].priority, 6);
        assert!(feed.filters[1].exclude);
        assert_eq!(feed.filters[1].priority, 5);

        let rule = &config.automation.rules[0];
        assert_eq!(
            rule.condition,
            ConditionConfig::DownloadRateAbove {
                bytes_per_sec: 1_048_576
            }
        );
        assert_eq!(rule.action, ActionConfig::PauseAll);
        assert!(rule.enabled);
    }

    #[test]
    fn test_sanitized_config_hides_password() {
        let toml = r#"
[engine.qbittorrent]
url = "http://localhost:8080"
username = "admin"
password = "hunter2"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("hunter2"));
        assert_eq!(sanitized.engine.backend, "qbittorrent");
        assert!(sanitized.engine.qbittorrent.unwrap().password_configured);
    }
}
