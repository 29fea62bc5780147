//! Fleet backup and restore.
//!
//! A backup is a JSON snapshot of registry metadata plus the session
//! settings in effect. Restoring replays the sources through the registry
//! and reapplies their attributes.

mod manager;
mod types;

pub use manager::BackupManager;
pub use types::*;
