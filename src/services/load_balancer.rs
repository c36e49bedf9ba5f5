//! Candidate-worker selection strategies (spec §4.6, C4).
//!
//! Grounded on `abathur::services::dependency_resolver` for the style of a
//! small, pure, synchronously-testable strategy object threaded through the
//! scheduler; the strategies themselves (round-robin / least-loaded /
//! capability-match) are new per spec §4.6.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::models::{TaskKind, WorkerNode};

/// Candidate-selection strategy (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancingStrategy {
    RoundRobin,
    LeastLoaded,
    CapabilityMatch,
}

/// Selects a worker from a candidate set (spec §4.6, `LoadBalancer.select`).
pub struct LoadBalancer {
    strategy: BalancingStrategy,
    cursor: AtomicUsize,
}

impl LoadBalancer {
    pub fn new(strategy: BalancingStrategy) -> Self {
        Self { strategy, cursor: AtomicUsize::new(0) }
    }

    /// `candidates` is assumed already filtered to alive/available workers;
    /// `task_kind` narrows further for `CAPABILITY_MATCH`. Returns `None`
    /// when no candidate qualifies.
    pub fn select<'a>(&self, candidates: &'a [WorkerNode], task_kind: Option<TaskKind>) -> Option<&'a WorkerNode> {
        match self.strategy {
            BalancingStrategy::RoundRobin => self.select_round_robin(candidates),
            BalancingStrategy::LeastLoaded => Self::select_least_loaded(candidates),
            BalancingStrategy::CapabilityMatch => {
                let kind = task_kind?;
                let filtered: Vec<&WorkerNode> = candidates.iter().filter(|w| w.capable_of(kind)).collect();
                Self::select_least_loaded_ref(&filtered)
            }
        }
    }

    fn select_round_robin<'a>(&self, candidates: &'a [WorkerNode]) -> Option<&'a WorkerNode> {
        if candidates.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) % candidates.len();
        candidates.get(idx)
    }

    fn select_least_loaded(candidates: &[WorkerNode]) -> Option<&WorkerNode> {
        Self::select_least_loaded_ref(&candidates.iter().collect::<Vec<_>>())
    }

    /// Least `active_tasks`; ties broken by registration order (spec §4.6).
    fn select_least_loaded_ref<'a>(candidates: &[&'a WorkerNode]) -> Option<&'a WorkerNode> {
        candidates
            .iter()
            .copied()
            .min_by(|a, b| a.active_tasks.cmp(&b.active_tasks).then_with(|| a.registered_at.cmp(&b.registered_at)))
    }
}
