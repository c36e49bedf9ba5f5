//! Worker node domain model (spec §3, "WorkerNode").

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::task::TaskKind;

/// Lifecycle status of a registered worker.
///
/// `IDLE -> BUSY` (first `taskStarted`), `-> IDLE` (`activeTasks == 0`),
/// `-> DRAINING` on drain, `-> IDLE` when fully drained, or `-> DEAD` on a
/// missed-heartbeat timeout. A DEAD worker returns to IDLE on any fresh
/// heartbeat (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Draining,
    Dead,
}

/// A registered worker agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerNode {
    pub id: String,
    pub capabilities: HashSet<TaskKind>,
    pub max_concurrency: u32,
    pub active_tasks: u32,
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, Value>,
}

impl WorkerNode {
    pub fn new(id: impl Into<String>, capabilities: HashSet<TaskKind>, max_concurrency: u32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            capabilities,
            max_concurrency: max_concurrency.max(1),
            active_tasks: 0,
            status: WorkerStatus::Idle,
            last_heartbeat: now,
            registered_at: now,
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status != WorkerStatus::Dead
    }

    pub fn is_available(&self) -> bool {
        self.is_alive() && self.status != WorkerStatus::Draining && self.active_tasks < self.max_concurrency
    }

    pub fn capable_of(&self, kind: TaskKind) -> bool {
        self.capabilities.contains(&kind)
    }

    /// Invariant P5: `0 <= active_tasks <= max_concurrency`;
    /// `status == BUSY <=> active_tasks > 0 && status not in {DRAINING, DEAD}`.
    pub fn check_invariant(&self) -> bool {
        let bounded = self.active_tasks <= self.max_concurrency;
        let busy_iff = (self.status == WorkerStatus::Busy)
            == (self.active_tasks > 0
                && self.status != WorkerStatus::Draining
                && self.status != WorkerStatus::Dead);
        bounded && busy_iff
    }
}
