//! Condition/action automation rules with cooldowns.

mod builtin;
mod engine;
mod types;

pub use builtin::{rule_from_config, FleetAction, FleetCondition};
pub use engine::RuleEngine;
pub use types::*;
