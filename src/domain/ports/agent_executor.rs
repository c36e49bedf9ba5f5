//! The `AgentExecutor` / dispatcher port (spec §1, §6).
//!
//! This is the single seam where a host plugs in a concrete agent runtime.
//! The core never depends on what's behind it; it only needs the contract.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::models::{Task, TaskResult};

/// A child task requested at runtime by an in-flight task (spec §4.1,
/// "Dynamic graph mutation").
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub id: String,
    pub kind: crate::domain::models::TaskKind,
    pub agent_hint: String,
    /// Defaults to `[parent.id]` when empty.
    pub dependencies: Vec<String>,
    pub payload: std::collections::BTreeMap<String, Value>,
}

/// A bus message a dispatcher asks to have published alongside a result
/// (spec §6, `messages[]` are `{topic, payload}` pairs).
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Value,
}

/// What a single dispatch invocation returns.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub result: TaskResult,
    pub spawn_requests: Vec<SpawnRequest>,
    pub messages: Vec<OutboundMessage>,
}

impl DispatchOutcome {
    pub fn simple(result: TaskResult) -> Self {
        Self { result, spawn_requests: Vec::new(), messages: Vec::new() }
    }
}

/// The callback a host implements to actually run a task on an agent.
///
/// An `Err` return is this trait's equivalent of spec §4.1's "exceptions
/// from the dispatcher": the engine converts it to
/// `TaskResult { exit_code: 1, stderr: <message>, .. }` rather than
/// unwinding (spec §7: no uncaught error may leave the scheduler task).
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<DispatchOutcome, String>;
}
