//! Task domain model.
//!
//! Tasks are discrete units of work dispatched to worker agents. They form
//! a DAG with dependencies and move through an explicit status state
//! machine (see [`TaskStatus`]).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The class of work a task represents.
///
/// Closed tagged variant; worker capability is a set of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Plan,
    Code,
    Audit,
    Test,
    Review,
    Deploy,
    Research,
    Design,
    InfraProvision,
    Shell,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Code => "code",
            Self::Audit => "audit",
            Self::Test => "test",
            Self::Review => "review",
            Self::Deploy => "deploy",
            Self::Research => "research",
            Self::Design => "design",
            Self::InfraProvision => "infra_provision",
            Self::Shell => "shell",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a task in the execution pipeline.
///
/// `PENDING -> READY -> RUNNING -> (COMPLETED | RETRYING -> RUNNING* | FAILED | SKIPPED)`.
/// `COMPLETED`, `FAILED`, and `SKIPPED` are terminal and never mutate once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Retrying,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Retrying => "RETRYING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single dispatcher invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl TaskResult {
    pub fn success(stdout: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Synthetic result for `maxExecutionTimeMs` timeout cascades (spec §5).
    pub fn synthetic_timeout() -> Self {
        Self {
            exit_code: 124,
            stdout: String::new(),
            stderr: "DAG execution timeout".to_string(),
            duration_ms: 0,
        }
    }
}

/// Reserved payload key under which retry feedback is injected (spec §4.1,
/// "Feedback injection on retry"). Agents may consult it; schedulers must
/// not depend on its contents.
pub const RETRY_FEEDBACK_KEY: &str = "_retry";

/// Reserved payload key carrying parent context for spawned children
/// (spec §4.1, "Dynamic graph mutation").
pub const PARENT_CONTEXT_KEY: &str = "_parentContext";

/// Reserved payload key tagging reactively-synthesised nodes (spec §4.1,
/// "Reactive mutation").
pub const REACTIVE_CONTEXT_KEY: &str = "_reactiveContext";

/// Reserved payload key naming the feature a task belongs to, consulted by
/// [`crate::services::drift_gate::DriftGate`] (spec §4.4). Tasks that don't
/// carry it are not subject to the drift gate.
pub const FEATURE_ID_KEY: &str = "featureId";

/// A task within a [`crate::domain::models::graph::Graph`].
///
/// Invariants (spec §3): `dependencies` is a subset of the owning graph's
/// ids; `depth == 0` for submitted roots, else `parent.depth + 1`; terminal
/// statuses never mutate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub agent_hint: String,
    pub dependencies: Vec<String>,
    pub payload: BTreeMap<String, Value>,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    pub retry_count: u32,
    pub depth: u32,
    pub parent_id: Option<String>,
}

impl Task {
    /// Build a root task (depth 0, no parent).
    pub fn new(id: impl Into<String>, kind: TaskKind, agent_hint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            agent_hint: agent_hint.into(),
            dependencies: Vec::new(),
            payload: BTreeMap::new(),
            status: TaskStatus::Pending,
            result: None,
            retry_count: 0,
            depth: 0,
            parent_id: None,
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: BTreeMap<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Returns `true` if this task's status may never change again.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition to a new status, refusing any mutation once terminal
    /// (spec P1: "a task reaches a terminal status exactly once").
    pub fn set_status(&mut self, status: TaskStatus) -> Result<(), TaskTransitionError> {
        if self.status.is_terminal() {
            return Err(TaskTransitionError::AlreadyTerminal {
                task_id: self.id.clone(),
                from: self.status,
            });
        }
        self.status = status;
        Ok(())
    }
}

/// Error raised when attempting to mutate a task past a terminal status.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TaskTransitionError {
    #[error("task {task_id} is already terminal ({from}); cannot transition further")]
    AlreadyTerminal { task_id: String, from: TaskStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_rejects_further_transition() {
        let mut t = Task::new("a", TaskKind::Code, "builder");
        t.set_status(TaskStatus::Ready).unwrap();
        t.set_status(TaskStatus::Running).unwrap();
        t.set_status(TaskStatus::Completed).unwrap();
        assert!(t.is_terminal());
        let err = t.set_status(TaskStatus::Failed).unwrap_err();
        assert!(matches!(err, TaskTransitionError::AlreadyTerminal { .. }));
        assert_eq!(t.status, TaskStatus::Completed);
    }

    #[test]
    fn task_result_success_and_failure() {
        let ok = TaskResult::success("done", 10);
        assert!(ok.is_success());
        let bad = TaskResult::failure(1, "boom", 5);
        assert!(!bad.is_success());
    }
}
