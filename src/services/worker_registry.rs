//! Worker lifecycle registry: register, heartbeat, drain, death, and the
//! capability index (spec §4.6, C3).
//!
//! Grounded on `abathur::services::guardrails` for the shape of a
//! `RwLock`-guarded registry of named entities with liveness checks, and on
//! `abathur::domain::models::dag` for id-keyed lookups; generalized here to
//! full worker lifecycle transitions per spec §3.

use std::collections::HashSet;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::models::{TaskKind, WorkerNode, WorkerStatus};

/// Configuration for heartbeat liveness checks.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    pub interval_ms: i64,
    pub missed_threshold: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_ms: 5_000, missed_threshold: 3 }
    }
}

impl HeartbeatConfig {
    fn timeout_ms(&self) -> i64 {
        self.interval_ms * i64::from(self.missed_threshold)
    }
}

/// Error returned by registry operations on an unknown worker id.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("no worker registered with id {0}")]
pub struct UnknownWorker(pub String);

/// Distributed worker registry (spec §4.6).
pub struct WorkerRegistry {
    heartbeat: HeartbeatConfig,
    workers: RwLock<Vec<WorkerNode>>,
}

impl WorkerRegistry {
    pub fn new(heartbeat: HeartbeatConfig) -> Self {
        Self { heartbeat, workers: RwLock::new(Vec::new()) }
    }

    pub fn with_defaults() -> Self {
        Self::new(HeartbeatConfig::default())
    }

    pub async fn register(&self, id: impl Into<String>, capabilities: HashSet<TaskKind>, max_concurrency: u32) -> WorkerNode {
        let node = WorkerNode::new(id, capabilities, max_concurrency);
        let mut workers = self.workers.write().await;
        workers.retain(|w| w.id != node.id);
        workers.push(node.clone());
        node
    }

    pub async fn deregister(&self, id: &str) -> Result<(), UnknownWorker> {
        let mut workers = self.workers.write().await;
        let before = workers.len();
        workers.retain(|w| w.id != id);
        if workers.len() == before {
            return Err(UnknownWorker(id.to_string()));
        }
        Ok(())
    }

    async fn mutate<R>(&self, id: &str, f: impl FnOnce(&mut WorkerNode) -> R) -> Result<R, UnknownWorker> {
        let mut workers = self.workers.write().await;
        let worker = workers.iter_mut().find(|w| w.id == id).ok_or_else(|| UnknownWorker(id.to_string()))?;
        Ok(f(worker))
    }

    /// A heartbeat on a DEAD worker revives it to IDLE (spec §3).
    pub async fn heartbeat(&self, id: &str) -> Result<(), UnknownWorker> {
        self.mutate(id, |w| {
            w.last_heartbeat = Utc::now();
            if w.status == WorkerStatus::Dead {
                w.status = WorkerStatus::Idle;
            }
        })
        .await
    }

    pub async fn drain(&self, id: &str) -> Result<(), UnknownWorker> {
        self.mutate(id, |w| {
            if w.active_tasks == 0 {
                w.status = WorkerStatus::Idle;
            } else {
                w.status = WorkerStatus::Draining;
            }
        })
        .await
    }

    pub async fn task_started(&self, id: &str) -> Result<(), UnknownWorker> {
        self.mutate(id, |w| {
            w.active_tasks += 1;
            if w.status != WorkerStatus::Draining && w.status != WorkerStatus::Dead {
                w.status = WorkerStatus::Busy;
            }
        })
        .await
    }

    /// Marks one active task as completed; transitions `BUSY -> IDLE` when
    /// the last in-flight task drains, and fully-drained `DRAINING -> IDLE`.
    pub async fn task_completed(&self, id: &str) -> Result<(), UnknownWorker> {
        self.mutate(id, |w| {
            w.active_tasks = w.active_tasks.saturating_sub(1);
            if w.active_tasks == 0 && w.status != WorkerStatus::Dead {
                w.status = WorkerStatus::Idle;
            }
        })
        .await
    }

    /// Scans for workers newly past the heartbeat timeout and marks them
    /// DEAD. Returns the ids marked dead in this call (spec §4.6).
    pub async fn check_heartbeats(&self) -> Vec<String> {
        let now = Utc::now();
        let timeout = self.heartbeat.timeout_ms();
        let mut dead = Vec::new();
        let mut workers = self.workers.write().await;
        for w in workers.iter_mut() {
            if w.status == WorkerStatus::Dead {
                continue;
            }
            let age_ms = (now - w.last_heartbeat).num_milliseconds();
            if age_ms > timeout {
                w.status = WorkerStatus::Dead;
                dead.push(w.id.clone());
            }
        }
        dead
    }

    pub async fn get(&self, id: &str) -> Option<WorkerNode> {
        self.workers.read().await.iter().find(|w| w.id == id).cloned()
    }

    pub async fn all(&self) -> Vec<WorkerNode> {
        self.workers.read().await.clone()
    }

    /// Alive, not draining, with spare concurrency (spec §4.6).
    pub async fn available_workers(&self) -> Vec<WorkerNode> {
        self.workers
            .read()
            .await
            .iter()
            .filter(|w| w.is_alive() && w.status != WorkerStatus::Draining && w.active_tasks < w.max_concurrency)
            .cloned()
            .collect()
    }

    /// Alive and capable of `kind` (spec §4.6). Availability is applied by
    /// the caller intersecting with [`Self::available_workers`].
    pub async fn capable_workers(&self, kind: TaskKind) -> Vec<WorkerNode> {
        self.workers.read().await.iter().filter(|w| w.is_alive() && w.capable_of(kind)).cloned().collect()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(kinds: &[TaskKind]) -> HashSet<TaskKind> {
        kinds.iter().copied().collect()
    }

    #[tokio::test]
    async fn lifecycle_idle_busy_idle() {
        let reg = WorkerRegistry::with_defaults();
        reg.register("w1", caps(&[TaskKind::Code]), 2).await;
        reg.task_started("w1").await.unwrap();
        assert_eq!(reg.get("w1").await.unwrap().status, WorkerStatus::Busy);
        reg.task_completed("w1").await.unwrap();
        assert_eq!(reg.get("w1").await.unwrap().status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn drain_with_inflight_work_waits_for_completion() {
        let reg = WorkerRegistry::with_defaults();
        reg.register("w1", caps(&[TaskKind::Code]), 2).await;
        reg.task_started("w1").await.unwrap();
        reg.drain("w1").await.unwrap();
        assert_eq!(reg.get("w1").await.unwrap().status, WorkerStatus::Draining);
        reg.task_completed("w1").await.unwrap();
        assert_eq!(reg.get("w1").await.unwrap().status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn missed_heartbeats_mark_dead_and_heartbeat_revives() {
        let reg = WorkerRegistry::new(HeartbeatConfig { interval_ms: 1, missed_threshold: 1 });
        reg.register("w1", caps(&[TaskKind::Code]), 1).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let dead = reg.check_heartbeats().await;
        assert_eq!(dead, vec!["w1".to_string()]);
        assert_eq!(reg.get("w1").await.unwrap().status, WorkerStatus::Dead);

        reg.heartbeat("w1").await.unwrap();
        assert_eq!(reg.get("w1").await.unwrap().status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn available_and_capable_queries() {
        let reg = WorkerRegistry::with_defaults();
        reg.register("w1", caps(&[TaskKind::Code]), 1).await;
        reg.register("w2", caps(&[TaskKind::Test]), 1).await;
        reg.task_started("w1").await.unwrap(); // w1 now at capacity

        let available = reg.available_workers().await;
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, "w2");

        let capable = reg.capable_workers(TaskKind::Code).await;
        assert_eq!(capable.len(), 1);
        assert_eq!(capable[0].id, "w1");
    }

    #[tokio::test]
    async fn unknown_worker_operations_error() {
        let reg = WorkerRegistry::with_defaults();
        assert!(reg.heartbeat("ghost").await.is_err());
        assert!(reg.drain("ghost").await.is_err());
        assert!(reg.task_started("ghost").await.is_err());
    }
}
