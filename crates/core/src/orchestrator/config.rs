//! Orchestrator lifecycle options.

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Label used for the automatic backup taken on shutdown.
pub const SHUTDOWN_BACKUP_LABEL: &str = "shutdown";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Restore the latest backup into the empty fleet at startup.
    #[serde(default)]
    pub restore_on_start: bool,

    /// Write a backup before releasing handles on shutdown.
    #[serde(default)]
    pub backup_on_shutdown: bool,
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            restore_on_start: config.backup.restore_on_start,
            backup_on_shutdown: config.backup.on_shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.backup.on_shutdown = true;

        let orchestrator = OrchestratorConfig::from(&config);
        assert!(orchestrator.backup_on_shutdown);
        assert!(!orchestrator.restore_on_start);
    }
}
