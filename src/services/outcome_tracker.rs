//! Rolling, decay-weighted per-`(agent, taskKind)` outcome statistics
//! (spec §4.8, C9a).
//!
//! Grounded on `abathur::services::guardrails`'s bounded-ring bookkeeping
//! idiom (`VecDeque` capped at a configured size), generalized here to
//! exponential time-decay weighting per spec §4.8.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;

use crate::domain::models::{AgentTaskKey, Outcome, TaskKind};

/// Aggregated statistics for one `(agent, taskKind)` cohort (spec §4.8).
#[derive(Debug, Clone)]
pub struct Stats {
    pub total_outcomes: usize,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub p95_duration_ms: u64,
    pub avg_retry_count: f64,
    pub retry_success_rate: Option<f64>,
    pub top_error_pattern: Option<String>,
    pub top_error_count: usize,
}

/// Per-`(agent, taskKind)` bounded outcome ring plus decay-weighted stats
/// (spec §4.8).
pub struct OutcomeTracker {
    max_outcomes_per_pair: usize,
    half_life_ms: i64,
    rings: std::sync::Mutex<HashMap<AgentTaskKey, VecDeque<Outcome>>>,
}

impl OutcomeTracker {
    pub fn new(max_outcomes_per_pair: usize, half_life_ms: i64) -> Self {
        Self { max_outcomes_per_pair, half_life_ms, rings: std::sync::Mutex::new(HashMap::new()) }
    }

    pub fn with_defaults() -> Self {
        Self::new(200, 3_600_000)
    }

    pub fn record(&self, outcome: Outcome) {
        let key = AgentTaskKey::new(outcome.agent_id.clone(), outcome.task_kind);
        let mut rings = self.rings.lock().expect("outcome rings mutex poisoned");
        let ring = rings.entry(key).or_default();
        ring.push_back(outcome);
        while ring.len() > self.max_outcomes_per_pair {
            ring.pop_front();
        }
    }

    /// Exponential time-decay weighted stats for one cohort (spec §4.8).
    pub fn compute_stats(&self, agent: &str, task_kind: TaskKind) -> Option<Stats> {
        let rings = self.rings.lock().expect("outcome rings mutex poisoned");
        let key = AgentTaskKey::new(agent, task_kind);
        let ring = rings.get(&key)?;
        if ring.is_empty() {
            return None;
        }

        let now = Utc::now();
        let mut weighted_success = 0.0;
        let mut weight_sum = 0.0;
        let mut durations: Vec<u64> = Vec::with_capacity(ring.len());
        let mut retry_total = 0u64;
        let mut retried_count = 0usize;
        let mut retried_success_count = 0usize;
        let mut error_counts: HashMap<String, usize> = HashMap::new();

        for outcome in ring {
            let age_ms = (now - outcome.timestamp).num_milliseconds().max(0) as f64;
            let weight = if self.half_life_ms > 0 {
                0.5_f64.powf(age_ms / self.half_life_ms as f64)
            } else {
                1.0
            };
            weight_sum += weight;
            if outcome.success {
                weighted_success += weight;
            }
            durations.push(outcome.duration_ms);
            retry_total += u64::from(outcome.retry_count);
            if outcome.retry_count > 0 {
                retried_count += 1;
                if outcome.success {
                    retried_success_count += 1;
                }
            }
            if let Some(pattern) = &outcome.error_pattern {
                *error_counts.entry(pattern.clone()).or_insert(0) += 1;
            }
        }

        durations.sort_unstable();
        let p95_index = ((durations.len() as f64) * 0.95).floor() as usize;
        let p95_duration_ms = durations[p95_index.min(durations.len() - 1)];

        let (top_error_pattern, top_error_count) = error_counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map_or((None, 0), |(pattern, count)| (Some(pattern), count));

        Some(Stats {
            total_outcomes: ring.len(),
            success_rate: if weight_sum > 0.0 { weighted_success / weight_sum } else { 0.0 },
            avg_duration_ms: durations.iter().sum::<u64>() as f64 / durations.len() as f64,
            p95_duration_ms,
            avg_retry_count: retry_total as f64 / ring.len() as f64,
            retry_success_rate: if retried_count > 0 {
                Some(retried_success_count as f64 / retried_count as f64)
            } else {
                None
            },
            top_error_pattern,
            top_error_count,
        })
    }

    pub fn total_outcomes(&self, agent: &str, task_kind: TaskKind) -> usize {
        self.rings
            .lock()
            .expect("outcome rings mutex poisoned")
            .get(&AgentTaskKey::new(agent, task_kind))
            .map_or(0, VecDeque::len)
    }
}
