//! Per-task-kind retry budgets, exponential backoff, and the graph-wide
//! circuit breaker (spec §4.1, "Retry policy contract" / C1).
//!
//! Grounded on `abathur::services::circuit_breaker` (`CircuitBreakerConfig`,
//! `CircuitState::{Closed,Open,HalfOpen}`, failure-window bookkeeping),
//! narrowed from the teacher's per-scope breaker to the single
//! graph-wide *consecutive*-failure counter the spec calls for; per-agent
//! scoping remains available one layer up, in `OutcomeTracker`.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng as _;

use crate::domain::models::TaskKind;

/// Per-kind retry budget and backoff parameters.
#[derive(Debug, Clone, Copy)]
pub struct KindRetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl KindRetryConfig {
    pub const fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self { max_retries, base_delay_ms, max_delay_ms }
    }
}

/// Configuration for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyConfig {
    pub per_kind: HashMap<TaskKind, KindRetryConfig>,
    pub circuit_breaker_threshold: u32,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        let mut per_kind = HashMap::new();
        // PLAN defaults to 0 retries (spec §4.1); idempotent kinds may retry.
        per_kind.insert(TaskKind::Plan, KindRetryConfig::new(0, 500, 5_000));
        per_kind.insert(TaskKind::Design, KindRetryConfig::new(1, 500, 5_000));
        per_kind.insert(TaskKind::Code, KindRetryConfig::new(2, 500, 10_000));
        per_kind.insert(TaskKind::Test, KindRetryConfig::new(2, 500, 10_000));
        per_kind.insert(TaskKind::Audit, KindRetryConfig::new(1, 500, 10_000));
        per_kind.insert(TaskKind::Review, KindRetryConfig::new(1, 500, 10_000));
        per_kind.insert(TaskKind::Research, KindRetryConfig::new(2, 500, 10_000));
        per_kind.insert(TaskKind::Deploy, KindRetryConfig::new(0, 1_000, 10_000));
        per_kind.insert(TaskKind::InfraProvision, KindRetryConfig::new(1, 1_000, 15_000));
        per_kind.insert(TaskKind::Shell, KindRetryConfig::new(2, 500, 10_000));
        Self { per_kind, circuit_breaker_threshold: 5 }
    }
}

/// Decision returned by [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    Retry { backoff: Duration },
    Exhausted,
}

/// Tracks retry budgets per kind plus one graph-wide consecutive-failure
/// circuit breaker.
///
/// Reset semantics (spec §9 Open Question, resolved in `DESIGN.md`):
/// a *success* resets the consecutive-failure counter to zero; the breaker
/// is explicitly window-based only in the sense that it counts
/// back-to-back failures, not failures within a time window.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryPolicyConfig,
    consecutive_failures: u32,
    circuit_open: bool,
}

impl RetryPolicy {
    pub fn new(config: RetryPolicyConfig) -> Self {
        Self { config, consecutive_failures: 0, circuit_open: false }
    }

    pub fn with_defaults() -> Self {
        Self::new(RetryPolicyConfig::default())
    }

    pub fn is_circuit_open(&self) -> bool {
        self.circuit_open
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn kind_config(&self, kind: TaskKind) -> KindRetryConfig {
        self.config
            .per_kind
            .get(&kind)
            .copied()
            .unwrap_or(KindRetryConfig::new(0, 500, 5_000))
    }

    /// Whether `kind` may be retried again given its current `retry_count`.
    /// Computes exponential backoff with jitter:
    /// `min(baseDelay * 2^attempt, maxDelay)` plus up to 20% jitter.
    pub fn should_retry(&mut self, kind: TaskKind, retry_count: u32) -> RetryDecision {
        let cfg = self.kind_config(kind);
        if retry_count >= cfg.max_retries {
            return RetryDecision::Exhausted;
        }
        let exp = cfg.base_delay_ms.saturating_mul(1u64 << retry_count.min(20));
        let capped = exp.min(cfg.max_delay_ms);
        let jitter_fraction = rand::thread_rng().gen_range(0.0..0.2);
        let jittered = (capped as f64 * (1.0 + jitter_fraction)) as u64;
        RetryDecision::Retry { backoff: Duration::from_millis(jittered) }
    }

    /// Record a task success: resets the consecutive-failure counter.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a permanent task failure (after retries, if any, are
    /// exhausted). Returns `true` if this failure tripped the circuit
    /// breaker open.
    pub fn record_failure(&mut self) -> bool {
        if self.circuit_open {
            return true;
        }
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.circuit_breaker_threshold {
            self.circuit_open = true;
            return true;
        }
        false
    }
}
