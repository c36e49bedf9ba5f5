//! Turns [`OutcomeTracker`] statistics into retry-tuning, bid-calibration,
//! failure-alert, and task-affinity recommendations (spec §4.8, C9b).
//!
//! Grounded on `abathur::services::guardrails`'s threshold-crossing check
//! idiom (compare a computed metric against a configured bound, emit a
//! recommendation); the four recommendation kinds are new per spec §4.8.

use crate::domain::models::TaskKind;
use crate::services::outcome_tracker::{OutcomeTracker, Stats};

/// One adaptation recommendation (spec §4.8).
#[derive(Debug, Clone)]
pub enum Recommendation {
    RetryTune { agent: String, task_kind: TaskKind, suggested_retries: u32 },
    BidCalibrate { agent: String, task_kind: TaskKind, calibrated_capability: u32, p95_duration_ms: u64 },
    FailureAlert { agent: String, task_kind: TaskKind, error_pattern: String, count: usize },
    TaskAffinity { agent: String, best_kind: TaskKind, success_rate: f64 },
}

/// Thresholds controlling when recommendations fire (spec §4.8).
#[derive(Debug, Clone, Copy)]
pub struct AdaptationConfig {
    pub min_outcomes: usize,
    pub retry_success_threshold: f64,
    pub alert_threshold: usize,
    pub affinity_threshold: f64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self { min_outcomes: 10, retry_success_threshold: 0.3, alert_threshold: 5, affinity_threshold: 0.8 }
    }
}

/// Derives recommendations from [`OutcomeTracker`] cohort stats (spec §4.8).
pub struct AdaptationEngine {
    config: AdaptationConfig,
}

impl AdaptationEngine {
    pub fn new(config: AdaptationConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(AdaptationConfig::default())
    }

    /// 0 if retry-success rate is low, 3 if high (>0.8), else 1; `None`
    /// with insufficient data (spec §4.8, `getSuggestedRetryLimit`).
    pub fn suggested_retry_limit(&self, stats: &Stats) -> Option<u32> {
        if stats.total_outcomes < self.config.min_outcomes {
            return None;
        }
        Some(match stats.retry_success_rate {
            Some(rate) if rate < self.config.retry_success_threshold => 0,
            Some(rate) if rate > 0.8 => 3,
            Some(_) => 1,
            None => 1,
        })
    }

    /// Recommendations for a single `(agent, taskKind)` cohort, gated on
    /// `totalOutcomes >= minOutcomes` (spec §4.8).
    pub fn recommend(&self, agent: &str, task_kind: TaskKind, stats: &Stats) -> Vec<Recommendation> {
        if stats.total_outcomes < self.config.min_outcomes {
            return Vec::new();
        }
        let mut out = Vec::new();

        if let Some(rate) = stats.retry_success_rate {
            if rate < self.config.retry_success_threshold {
                out.push(Recommendation::RetryTune { agent: agent.to_string(), task_kind, suggested_retries: 0 });
            }
        }

        out.push(Recommendation::BidCalibrate {
            agent: agent.to_string(),
            task_kind,
            calibrated_capability: (stats.success_rate * 100.0).round() as u32,
            p95_duration_ms: stats.p95_duration_ms,
        });

        if stats.top_error_count >= self.config.alert_threshold {
            if let Some(pattern) = &stats.top_error_pattern {
                out.push(Recommendation::FailureAlert {
                    agent: agent.to_string(),
                    task_kind,
                    error_pattern: pattern.clone(),
                    count: stats.top_error_count,
                });
            }
        }

        out
    }

    /// Best-kind affinity across every kind a tracker has data for (spec
    /// §4.8, `TASK_AFFINITY`).
    pub fn task_affinity(&self, tracker: &OutcomeTracker, agent: &str, kinds: &[TaskKind]) -> Option<Recommendation> {
        kinds
            .iter()
            .filter_map(|&kind| tracker.compute_stats(agent, kind).map(|s| (kind, s)))
            .filter(|(_, stats)| stats.total_outcomes >= self.config.min_outcomes && stats.success_rate > self.config.affinity_threshold)
            .max_by(|(_, a), (_, b)| a.success_rate.partial_cmp(&b.success_rate).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(kind, stats)| Recommendation::TaskAffinity {
                agent: agent.to_string(),
                best_kind: kind,
                success_rate: stats.success_rate,
            })
    }
}
