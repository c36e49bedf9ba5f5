//! Outcome record for the learning subsystem (spec §3 / §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskKind;

/// A single recorded dispatch outcome for `(agent, taskKind)` learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub agent_id: String,
    pub role: String,
    pub task_kind: TaskKind,
    pub task_id: String,
    pub success: bool,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub retry_count: u32,
    pub depth: u32,
    pub error_pattern: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Key identifying a learning cohort: a specific agent executing a specific
/// kind of task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentTaskKey {
    pub agent_id: String,
    pub task_kind: TaskKind,
}

impl AgentTaskKey {
    pub fn new(agent_id: impl Into<String>, task_kind: TaskKind) -> Self {
        Self { agent_id: agent_id.into(), task_kind }
    }
}
