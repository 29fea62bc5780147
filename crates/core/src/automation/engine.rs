//! Rule evaluation with cooldowns and failure isolation.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{AutomationError, AutomationRule, RuleFiring, RuleView};
use crate::metrics::{RULE_CONDITION_ERRORS, RULE_FIRES};

struct RuleSlot {
    rule: AutomationRule,
    last_fired_at: Option<DateTime<Utc>>,
    fire_count: u64,
}

impl RuleSlot {
    fn cooled_down(&self, now: DateTime<Utc>) -> bool {
        match self.last_fired_at {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed >= self.rule.cooldown)
                .unwrap_or(false),
        }
    }
}

/// Evaluates condition/action rules on each tick.
///
/// Conditions and actions run outside the rule lock. A condition that
/// errors or panics counts as false; a failing action still starts the
/// cooldown.
pub struct RuleEngine {
    interval: Duration,
    rules: Mutex<BTreeMap<String, RuleSlot>>,
}

impl RuleEngine {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            rules: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn add_rule(&self, rule: AutomationRule) -> Result<(), AutomationError> {
        let mut rules = self.rules.lock().await;
        if rules.contains_key(&rule.rule_id) {
            return Err(AutomationError::DuplicateRule(rule.rule_id));
        }
        info!(
            rule_id = %rule.rule_id,
            condition = %rule.condition.describe(),
            action = %rule.action.describe(),
            cooldown_secs = rule.cooldown.as_secs(),
            "Rule registered"
        );
        rules.insert(
            rule.rule_id.clone(),
            RuleSlot {
                rule,
                last_fired_at: None,
                fire_count: 0,
            },
        );
        Ok(())
    }

    pub async fn remove_rule(&self, rule_id: &str) -> Result<(), AutomationError> {
        if self.rules.lock().await.remove(rule_id).is_none() {
            return Err(AutomationError::RuleNotFound(rule_id.to_string()));
        }
        info!(rule_id = %rule_id, "Rule removed");
        Ok(())
    }

    pub async fn enable_rule(&self, rule_id: &str) -> Result<(), AutomationError> {
        self.set_enabled(rule_id, true).await
    }

    pub async fn disable_rule(&self, rule_id: &str) -> Result<(), AutomationError> {
        self.set_enabled(rule_id, false).await
    }

    async fn set_enabled(&self, rule_id: &str, enabled: bool) -> Result<(), AutomationError> {
        let mut rules = self.rules.lock().await;
        let slot = rules
            .get_mut(rule_id)
            .ok_or_else(|| AutomationError::RuleNotFound(rule_id.to_string()))?;
        slot.rule.enabled = enabled;
        debug!(rule_id = %rule_id, enabled = enabled, "Rule toggled");
        Ok(())
    }

    pub async fn rules(&self) -> Vec<RuleView> {
        self.rules
            .lock()
            .await
            .values()
            .map(|slot| RuleView {
                rule_id: slot.rule.rule_id.clone(),
                condition: slot.rule.condition.describe(),
                action: slot.rule.action.describe(),
                cooldown_secs: slot.rule.cooldown.as_secs(),
                enabled: slot.rule.enabled,
                last_fired_at: slot.last_fired_at,
                fire_count: slot.fire_count,
            })
            .collect()
    }

    pub async fn evaluate(&self) -> Vec<RuleFiring> {
        self.evaluate_at(Utc::now()).await
    }

    /// Evaluate every enabled, cooled-down rule as of `now`.
    pub async fn evaluate_at(&self, now: DateTime<Utc>) -> Vec<RuleFiring> {
        let candidates: Vec<AutomationRule> = self
            .rules
            .lock()
            .await
            .values()
            .filter(|slot| slot.rule.enabled && slot.cooled_down(now))
            .map(|slot| slot.rule.clone())
            .collect();

        let mut firings = Vec::new();
        for rule in candidates {
            let holds = match AssertUnwindSafe(rule.condition.evaluate())
                .catch_unwind()
                .await
            {
                Ok(Ok(holds)) => holds,
                Ok(Err(e)) => {
                    RULE_CONDITION_ERRORS.inc();
                    warn!(rule_id = %rule.rule_id, error = %e, "Rule condition failed");
                    false
                }
                Err(panic) => {
                    RULE_CONDITION_ERRORS.inc();
                    warn!(
                        rule_id = %rule.rule_id,
                        panic = %panic_message(&*panic),
                        "Rule condition panicked"
                    );
                    false
                }
            };
            if !holds {
                continue;
            }

            let error = match AssertUnwindSafe(rule.action.act()).catch_unwind().await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(panic) => Some(format!("panic: {}", panic_message(&*panic))),
            };
            match &error {
                None => {
                    RULE_FIRES.with_label_values(&["success"]).inc();
                    info!(rule_id = %rule.rule_id, "Rule fired");
                }
                Some(e) => {
                    RULE_FIRES.with_label_values(&["action_error"]).inc();
                    warn!(rule_id = %rule.rule_id, error = %e, "Rule action failed");
                }
            }

            if let Some(slot) = self.rules.lock().await.get_mut(&rule.rule_id) {
                slot.last_fired_at = Some(now);
                slot.fire_count += 1;
            }
            firings.push(RuleFiring {
                rule_id: rule.rule_id,
                at: now,
                error,
            });
        }
        firings
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{Action, Condition, FnAction, FnCondition};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter_action(counter: Arc<AtomicUsize>) -> Arc<dyn Action> {
        Arc::new(FnAction::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        }))
    }

    fn always(value: bool) -> Arc<dyn Condition> {
        Arc::new(FnCondition::new(move || async move { Ok::<_, anyhow::Error>(value) }))
    }

    struct PanickingCondition;

    #[async_trait::async_trait]
    impl Condition for PanickingCondition {
        async fn evaluate(&self) -> anyhow::Result<bool> {
            panic!("condition exploded")
        }
    }

    struct PanickingAction;

    #[async_trait::async_trait]
    impl Action for PanickingAction {
        async fn act(&self) -> anyhow::Result<()> {
            panic!("action exploded")
        }
    }

    #[tokio::test]
    async fn test_cooldown_limits_firing() {
        let engine = RuleEngine::new(Duration::from_secs(1));
        let fired = Arc::new(AtomicUsize::new(0));
        engine
            .add_rule(AutomationRule::new(
                "r",
                always(true),
                counter_action(fired.clone()),
                Duration::from_secs(60),
            ))
            .await
            .unwrap();

        let start = Utc::now();
        for second in 0..60 {
            engine
                .evaluate_at(start + chrono::Duration::seconds(second))
                .await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        engine
            .evaluate_at(start + chrono::Duration::seconds(60))
            .await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_false_condition_never_fires() {
        let engine = RuleEngine::new(Duration::from_secs(1));
        let fired = Arc::new(AtomicUsize::new(0));
        engine
            .add_rule(AutomationRule::new(
                "r",
                always(false),
                counter_action(fired.clone()),
                Duration::ZERO,
            ))
            .await
            .unwrap();

        assert!(engine.evaluate().await.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(engine.rules().await[0].last_fired_at.is_none());
    }

    #[tokio::test]
    async fn test_condition_error_and_panic_are_false() {
        let engine = RuleEngine::new(Duration::from_secs(1));
        let fired = Arc::new(AtomicUsize::new(0));
        let erroring: Arc<dyn Condition> =
            Arc::new(FnCondition::new(|| async { Err::<bool, _>(anyhow::anyhow!("boom")) }));
        engine
            .add_rule(AutomationRule::new(
                "err",
                erroring,
                counter_action(fired.clone()),
                Duration::ZERO,
            ))
            .await
            .unwrap();
        engine
            .add_rule(AutomationRule::new(
                "panic",
                Arc::new(PanickingCondition),
                counter_action(fired.clone()),
                Duration::ZERO,
            ))
            .await
            .unwrap();
        engine
            .add_rule(AutomationRule::new(
                "ok",
                always(true),
                counter_action(fired.clone()),
                Duration::ZERO,
            ))
            .await
            .unwrap();

        let firings = engine.evaluate().await;
        assert_eq!(firings.len(), 1);
        assert_eq!(firings[0].rule_id, "ok");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_action_still_starts_cooldown() {
        let engine = RuleEngine::new(Duration::from_secs(1));
        let failing: Arc<dyn Action> =
            Arc::new(FnAction::new(|| async { Err::<(), _>(anyhow::anyhow!("no disk")) }));
        engine
            .add_rule(AutomationRule::new("fail", always(true), failing, Duration::from_secs(30)))
            .await
            .unwrap();
        engine
            .add_rule(AutomationRule::new(
                "panic",
                always(true),
                Arc::new(PanickingAction),
                Duration::from_secs(30),
            ))
            .await
            .unwrap();

        let now = Utc::now();
        let firings = engine.evaluate_at(now).await;
        assert_eq!(firings.len(), 2);
        assert!(firings.iter().all(|f| f.error.is_some()));

        let again = engine.evaluate_at(now + chrono::Duration::seconds(5)).await;
        assert!(again.is_empty());
        let views = engine.rules().await;
        assert!(views.iter().all(|v| v.last_fired_at == Some(now) && v.fire_count == 1));
    }

    #[tokio::test]
    async fn test_disabled_rule_skipped() {
        let engine = RuleEngine::new(Duration::from_secs(1));
        let fired = Arc::new(AtomicUsize::new(0));
        engine
            .add_rule(AutomationRule::new(
                "r",
                always(true),
                counter_action(fired.clone()),
                Duration::ZERO,
            ))
            .await
            .unwrap();

        engine.disable_rule("r").await.unwrap();
        engine.evaluate().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        engine.enable_rule("r").await.unwrap();
        engine.evaluate().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rule_management_errors() {
        let engine = RuleEngine::new(Duration::from_secs(1));
        let fired = Arc::new(AtomicUsize::new(0));
        let rule = AutomationRule::new("r", always(true), counter_action(fired), Duration::ZERO);
        engine.add_rule(rule.clone()).await.unwrap();

        assert!(matches!(
            engine.add_rule(rule).await,
            Err(AutomationError::DuplicateRule(_))
        ));
        assert!(matches!(
            engine.enable_rule("missing").await,
            Err(AutomationError::RuleNotFound(_))
        ));
        engine.remove_rule("r").await.unwrap();
        assert!(matches!(
            engine.remove_rule("r").await,
            Err(AutomationError::RuleNotFound(_))
        ));
    }
}
