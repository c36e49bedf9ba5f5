//! Hash-verified snapshots with partial restore (spec §4.10, C11a).
//!
//! Grounded on `abathur::infrastructure::config::loader`'s idiom of
//! serialise → hash/validate → store, replayed here over
//! [`crate::domain::models::checkpoint`]'s canonical snapshot shapes.

use sha2::{Digest, Sha256};

use crate::domain::error::CheckpointError;
use crate::domain::models::{
    canonical_serialize, Checkpoint, Graph, GraphSnapshot, Message, MessageSnapshot, Outcome, OutcomeSnapshot,
    Snapshot, TaskSnapshot, TaskStatus, SNAPSHOT_VERSION,
};

fn hash_text(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{digest:x}")
}

fn parse_task_kind(s: &str) -> crate::domain::models::TaskKind {
    use crate::domain::models::TaskKind;
    match s {
        "plan" => TaskKind::Plan,
        "audit" => TaskKind::Audit,
        "test" => TaskKind::Test,
        "review" => TaskKind::Review,
        "deploy" => TaskKind::Deploy,
        "research" => TaskKind::Research,
        "design" => TaskKind::Design,
        "infra_provision" => TaskKind::InfraProvision,
        "shell" => TaskKind::Shell,
        _ => TaskKind::Code,
    }
}

/// Outcome of [`CheckpointManager::load`].
#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub graph: Graph,
    pub execution_order: Vec<String>,
    pub total_retries: u64,
    pub total_spawned: u64,
    pub preserved: Vec<String>,
    pub requeued: Vec<String>,
}

/// Configuration for checkpoint retention.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointConfig {
    pub max_checkpoints: usize,
    pub verify_on_load: bool,
    pub auto_checkpoint_interval: u32,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { max_checkpoints: 20, verify_on_load: true, auto_checkpoint_interval: 10 }
    }
}

/// Hash-sealed snapshot store with a bounded, oldest-first retention
/// policy (spec §4.10).
pub struct CheckpointManager {
    config: CheckpointConfig,
    checkpoints: std::sync::Mutex<Vec<(String, Checkpoint)>>,
    next_id: std::sync::atomic::AtomicU64,
    completions_since_checkpoint: std::sync::atomic::AtomicU32,
}

impl CheckpointManager {
    pub fn new(config: CheckpointConfig) -> Self {
        Self {
            config,
            checkpoints: std::sync::Mutex::new(Vec::new()),
            next_id: std::sync::atomic::AtomicU64::new(1),
            completions_since_checkpoint: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CheckpointConfig::default())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn save(
        &self,
        graph: &Graph,
        execution_order: Vec<String>,
        total_retries: u64,
        total_spawned: u64,
        outcomes: &[Outcome],
        messages: &[Message],
        elapsed_ms: u64,
        label: Option<String>,
        on_pruned: Option<&dyn Fn(&str)>,
    ) -> Checkpoint {
        let id = format!("cp-{}", self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst));
        let tasks: Vec<TaskSnapshot> = graph.tasks().map(TaskSnapshot::from).collect();

        let snapshot = Snapshot {
            id: id.clone(),
            version: SNAPSHOT_VERSION,
            graph: GraphSnapshot { tasks },
            execution_order,
            total_retries,
            total_spawned,
            outcomes: outcomes.iter().map(OutcomeSnapshot::from).collect(),
            messages: messages.iter().map(MessageSnapshot::from).collect(),
            created_at: chrono::Utc::now().timestamp_millis(),
            elapsed_ms,
            label,
        };

        let text = canonical_serialize(&snapshot);
        let hash = hash_text(&text);
        let checkpoint = Checkpoint { snapshot, hash, size_bytes: text.len() };

        let mut checkpoints = self.checkpoints.lock().expect("checkpoints mutex poisoned");
        checkpoints.push((id, checkpoint.clone()));
        while checkpoints.len() > self.config.max_checkpoints {
            let (pruned_id, _) = checkpoints.remove(0);
            if let Some(callback) = on_pruned {
                callback(&pruned_id);
            }
        }

        checkpoint
    }

    pub fn load(&self, id: &str) -> Result<RestoreResult, CheckpointError> {
        let checkpoints = self.checkpoints.lock().expect("checkpoints mutex poisoned");
        let (_, checkpoint) = checkpoints
            .iter()
            .find(|(cp_id, _)| cp_id == id)
            .ok_or_else(|| CheckpointError::NotFound(id.to_string()))?;

        if self.config.verify_on_load {
            let text = canonical_serialize(&checkpoint.snapshot);
            let actual = hash_text(&text);
            if actual != checkpoint.hash {
                return Err(CheckpointError::IntegrityViolation {
                    checkpoint_id: id.to_string(),
                    expected: checkpoint.hash.clone(),
                    actual,
                });
            }
        }

        let mut graph = Graph::new();
        let mut preserved = Vec::new();
        let mut requeued = Vec::new();
        for task_snapshot in &checkpoint.snapshot.graph.tasks {
            let mut task = crate::domain::models::Task::new(
                task_snapshot.id.clone(),
                parse_task_kind(&task_snapshot.kind),
                task_snapshot.agent.clone(),
            )
            .with_dependencies(task_snapshot.dependencies.clone())
            .with_payload(task_snapshot.payload.clone());
            task.retry_count = task_snapshot.retry_count;
            task.depth = task_snapshot.depth;
            task.parent_id = task_snapshot.parent_id.clone();

            if task_snapshot.status.is_terminal() {
                task.status = task_snapshot.status;
                task.result = task_snapshot.result.clone();
                preserved.push(task.id.clone());
            } else {
                task.status = TaskStatus::Pending;
                task.result = None;
                requeued.push(task.id.clone());
            }
            let _ = graph.insert(task);
        }

        Ok(RestoreResult {
            graph,
            execution_order: checkpoint.snapshot.execution_order.clone(),
            total_retries: checkpoint.snapshot.total_retries,
            total_spawned: checkpoint.snapshot.total_spawned,
            preserved,
            requeued,
        })
    }

    /// Returns `true` exactly when the running completion count crosses
    /// `autoCheckpointInterval` (spec §4.10).
    pub fn notify_task_completed(&self) -> bool {
        let count = self.completions_since_checkpoint.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        if count >= self.config.auto_checkpoint_interval {
            self.completions_since_checkpoint.store(0, std::sync::atomic::Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: &str) -> Option<Checkpoint> {
        self.checkpoints
            .lock()
            .expect("checkpoints mutex poisoned")
            .iter()
            .find(|(cp_id, _)| cp_id == id)
            .map(|(_, cp)| cp.clone())
    }

    pub fn len(&self) -> usize {
        self.checkpoints.lock().expect("checkpoints mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
