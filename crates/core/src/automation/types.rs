//! Rule, condition and action types.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Rule already exists: {0}")]
    DuplicateRule(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),
}

/// A predicate evaluated on every automation tick.
#[async_trait]
pub trait Condition: Send + Sync {
    async fn evaluate(&self) -> anyhow::Result<bool>;

    fn describe(&self) -> String {
        "custom".to_string()
    }
}

/// Side effect run when a rule's condition holds.
#[async_trait]
pub trait Action: Send + Sync {
    async fn act(&self) -> anyhow::Result<()>;

    fn describe(&self) -> String {
        "custom".to_string()
    }
}

/// Condition backed by an async closure.
pub struct FnCondition<F> {
    f: F,
}

impl<F> FnCondition<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Condition for FnCondition<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send,
{
    async fn evaluate(&self) -> anyhow::Result<bool> {
        (self.f)().await
    }
}

/// Action backed by an async closure.
pub struct FnAction<F> {
    f: F,
}

impl<F> FnAction<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn act(&self) -> anyhow::Result<()> {
        (self.f)().await
    }
}

#[derive(Clone)]
pub struct AutomationRule {
    pub rule_id: String,
    pub condition: Arc<dyn Condition>,
    pub action: Arc<dyn Action>,
    /// Minimum time between two firings.
    pub cooldown: Duration,
    pub enabled: bool,
}

impl AutomationRule {
    pub fn new(
        rule_id: impl Into<String>,
        condition: Arc<dyn Condition>,
        action: Arc<dyn Action>,
        cooldown: Duration,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            condition,
            action,
            cooldown,
            enabled: true,
        }
    }
}

/// Read-only view of a registered rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleView {
    pub rule_id: String,
    pub condition: String,
    pub action: String,
    pub cooldown_secs: u64,
    pub enabled: bool,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub fire_count: u64,
}

/// A rule whose condition held during an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFiring {
    pub rule_id: String,
    pub at: DateTime<Utc>,
    /// Action error or panic message.
    pub error: Option<String>,
}
