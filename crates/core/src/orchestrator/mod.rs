//! Fleet orchestrator.
//!
//! Owns the registry and every background subsystem:
//! - **Stats**: periodic sampling and daily rollups
//! - **Scheduler**: weekday/time-of-day actions
//! - **RSS**: feed polling and acquisition
//! - **Automation**: condition/action rules

mod config;
mod runner;
mod types;

pub use config::{OrchestratorConfig, SHUTDOWN_BACKUP_LABEL};
pub use runner::Orchestrator;
pub use types::{FleetStats, OrchestratorError, OrchestratorStatus, TorrentInfo};
