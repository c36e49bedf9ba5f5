//! Category-specific action ladder with escalation (spec §4.7, C8b).
//!
//! Grounded on `abathur::services::circuit_breaker`'s "try an action,
//! observe success/fail, escalate policy" control flow, generalized from a
//! single breaker transition into a full ordered action ladder per
//! category.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::models::TaskKind;
use crate::services::failure_detector::{Classification, FailureCategory};

/// A remediation action the healing engine may attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealingAction {
    Restart,
    Reroute,
    ScaleDown,
    RetryWithBackoff,
    SkipDependency,
    Escalate,
}

/// Escalation severity attached to an [`EscalationEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationLevel {
    Warn,
    Alert,
    Block,
}

/// Record of a single healing attempt (spec §4.7).
#[derive(Debug, Clone)]
pub struct HealingRecord {
    pub task_id: String,
    pub action: HealingAction,
    pub succeeded: bool,
    pub timestamp: DateTime<Utc>,
}

/// Emitted whenever healing escalates instead of retrying (spec §4.7).
#[derive(Debug, Clone)]
pub struct EscalationEvent {
    pub task_id: String,
    pub category: FailureCategory,
    pub level: EscalationLevel,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of [`HealingEngine::heal`].
#[derive(Debug, Clone)]
pub struct HealingOutcome {
    pub healed: bool,
    pub successful_action: Option<HealingAction>,
    pub attempts: u32,
}

/// Configuration controlling escalation thresholds (spec §4.7).
#[derive(Debug, Clone)]
pub struct HealingConfig {
    pub critical_kinds: Vec<TaskKind>,
    pub min_confidence: f64,
    pub max_healing_attempts: u32,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self { critical_kinds: vec![TaskKind::Plan, TaskKind::Deploy], min_confidence: 0.5, max_healing_attempts: 3 }
    }
}

fn action_ladder(category: FailureCategory) -> Vec<HealingAction> {
    use HealingAction::*;
    match category {
        FailureCategory::Oom => vec![ScaleDown, Restart, Escalate],
        FailureCategory::Timeout => vec![RetryWithBackoff, Reroute, Escalate],
        FailureCategory::DependencyFailure => vec![SkipDependency, RetryWithBackoff, Escalate],
        FailureCategory::Crash => vec![Restart, Reroute, Escalate],
        FailureCategory::PermissionDenied => vec![Reroute, Escalate],
        FailureCategory::NetworkError => vec![RetryWithBackoff, Reroute, Escalate],
        FailureCategory::Unknown => vec![RetryWithBackoff, Escalate],
    }
}

/// A callback that performs one remediation action, returning whether it
/// succeeded (spec §4.7, `executor(taskId, action, classification) -> bool`).
pub trait HealingExecutor: Send + Sync {
    fn attempt(&self, task_id: &str, action: HealingAction, classification: Classification) -> bool;
}

/// Category-specific remediation ladder plus escalation (spec §4.7).
pub struct HealingEngine {
    config: HealingConfig,
    records: std::sync::Mutex<Vec<HealingRecord>>,
    escalations: std::sync::Mutex<Vec<EscalationEvent>>,
    prior_attempts: std::sync::Mutex<HashMap<String, u32>>,
}

impl HealingEngine {
    pub fn new(config: HealingConfig) -> Self {
        Self {
            config,
            records: std::sync::Mutex::new(Vec::new()),
            escalations: std::sync::Mutex::new(Vec::new()),
            prior_attempts: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(HealingConfig::default())
    }

    pub fn records(&self) -> Vec<HealingRecord> {
        self.records.lock().expect("healing records mutex poisoned").clone()
    }

    pub fn escalations(&self) -> Vec<EscalationEvent> {
        self.escalations.lock().expect("escalations mutex poisoned").clone()
    }

    fn record(&self, task_id: &str, action: HealingAction, succeeded: bool) {
        self.records.lock().expect("healing records mutex poisoned").push(HealingRecord {
            task_id: task_id.to_string(),
            action,
            succeeded,
            timestamp: Utc::now(),
        });
    }

    fn escalate(&self, task_id: &str, category: FailureCategory, level: EscalationLevel, reason: impl Into<String>) {
        self.record(task_id, HealingAction::Escalate, false);
        self.escalations.lock().expect("escalations mutex poisoned").push(EscalationEvent {
            task_id: task_id.to_string(),
            category,
            level,
            reason: reason.into(),
            timestamp: Utc::now(),
        });
    }

    /// Runs the category-specific action ladder for `task_id`, escalating
    /// per spec §4.7's immediate-escalation conditions.
    pub fn heal(
        &self,
        task_id: &str,
        task_kind: TaskKind,
        classification: Classification,
        executor: &dyn HealingExecutor,
    ) -> HealingOutcome {
        let prior = {
            let mut map = self.prior_attempts.lock().expect("prior attempts mutex poisoned");
            *map.entry(task_id.to_string()).or_insert(0)
        };

        if self.config.critical_kinds.contains(&task_kind) {
            self.escalate(task_id, classification.category, EscalationLevel::Block, "critical task kind requires human review");
            return HealingOutcome { healed: false, successful_action: None, attempts: 0 };
        }
        if classification.confidence < self.config.min_confidence {
            self.escalate(
                task_id,
                classification.category,
                EscalationLevel::Alert,
                format!("classification confidence {:.2} below minimum", classification.confidence),
            );
            return HealingOutcome { healed: false, successful_action: None, attempts: 0 };
        }
        if prior >= self.config.max_healing_attempts {
            self.escalate(task_id, classification.category, EscalationLevel::Block, "healing attempts exhausted");
            return HealingOutcome { healed: false, successful_action: None, attempts: 0 };
        }

        let mut attempts = 0u32;
        for action in action_ladder(classification.category) {
            if action == HealingAction::Escalate {
                self.escalate(task_id, classification.category, EscalationLevel::Warn, "all remediation actions failed");
                break;
            }
            attempts += 1;
            let succeeded = executor.attempt(task_id, action, classification);
            self.record(task_id, action, succeeded);
            if succeeded {
                return HealingOutcome { healed: true, successful_action: Some(action), attempts };
            }
        }

        let mut map = self.prior_attempts.lock().expect("prior attempts mutex poisoned");
        *map.entry(task_id.to_string()).or_insert(0) += attempts;

        HealingOutcome { healed: false, successful_action: None, attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;
    impl HealingExecutor for AlwaysFails {
        fn attempt(&self, _task_id: &str, _action: HealingAction, _c: Classification) -> bool {
            false
        }
    }

    struct SucceedsOnSecond;
    impl HealingExecutor for SucceedsOnSecond {
        fn attempt(&self, _task_id: &str, action: HealingAction, _c: Classification) -> bool {
            action != HealingAction::ScaleDown
        }
    }

    #[test]
    fn critical_kind_escalates_immediately() {
        let engine = HealingEngine::with_defaults();
        let c = Classification { category: FailureCategory::Crash, confidence: 0.9 };
        let outcome = engine.heal("t1", TaskKind::Deploy, c, &AlwaysFails);
        assert!(!outcome.healed);
        assert_eq!(engine.escalations().len(), 1);
        assert_eq!(engine.escalations()[0].level, EscalationLevel::Block);
    }

    #[test]
    fn low_confidence_escalates_immediately() {
        let engine = HealingEngine::with_defaults();
        let c = Classification { category: FailureCategory::Unknown, confidence: 0.2 };
        let outcome = engine.heal("t1", TaskKind::Code, c, &AlwaysFails);
        assert!(!outcome.healed);
        assert_eq!(engine.escalations()[0].level, EscalationLevel::Alert);
    }

    #[test]
    fn second_action_in_ladder_succeeds() {
        let engine = HealingEngine::with_defaults();
        let c = Classification { category: FailureCategory::Oom, confidence: 0.9 };
        let outcome = engine.heal("t1", TaskKind::Code, c, &SucceedsOnSecond);
        assert!(outcome.healed);
        assert_eq!(outcome.successful_action, Some(HealingAction::Restart));
        assert_eq!(outcome.attempts, 2);
    }

    #[test]
    fn all_actions_failing_escalates_warn() {
        let engine = HealingEngine::with_defaults();
        let c = Classification { category: FailureCategory::Oom, confidence: 0.9 };
        let outcome = engine.heal("t1", TaskKind::Code, c, &AlwaysFails);
        assert!(!outcome.healed);
        assert_eq!(engine.escalations().last().unwrap().level, EscalationLevel::Warn);
    }
}
