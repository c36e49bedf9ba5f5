//! Checkpoint snapshot data model (spec §3 / §6).
//!
//! The wire format mirrors the `Snapshot`/`Checkpoint` shapes in spec.md §6
//! verbatim. Serialisation must be deterministic for hash stability: task
//! payloads use `BTreeMap` (stable key order) end to end, and this module
//! never serialises through a `HashMap`.

use serde::{Deserialize, Serialize};

use super::message::Message;
use super::outcome::Outcome;
use super::task::{Task, TaskResult, TaskStatus};

/// Current checkpoint schema version (spec §6: `version: int (1)`).
pub const SNAPSHOT_VERSION: u32 = 1;

/// A serialisable copy of one [`Task`], matching spec §6's `graph.tasks[]`
/// shape exactly (field order fixed for canonical serialisation).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSnapshot {
    pub id: String,
    pub kind: String,
    pub agent: String,
    pub dependencies: Vec<String>,
    pub payload: std::collections::BTreeMap<String, serde_json::Value>,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    pub retry_count: u32,
    pub depth: u32,
    pub parent_id: Option<String>,
}

impl From<&Task> for TaskSnapshot {
    fn from(t: &Task) -> Self {
        Self {
            id: t.id.clone(),
            kind: t.kind.to_string(),
            agent: t.agent_hint.clone(),
            dependencies: t.dependencies.clone(),
            payload: t.payload.clone(),
            status: t.status,
            result: t.result.clone(),
            retry_count: t.retry_count,
            depth: t.depth,
            parent_id: t.parent_id.clone(),
        }
    }
}

/// Serialisable graph snapshot, `graph: { tasks: [...] }` per spec §6.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphSnapshot {
    pub tasks: Vec<TaskSnapshot>,
}

/// Full execution snapshot, matching spec §6's `Snapshot` shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub version: u32,
    pub graph: GraphSnapshot,
    pub execution_order: Vec<String>,
    pub total_retries: u64,
    pub total_spawned: u64,
    pub outcomes: Vec<OutcomeSnapshot>,
    pub messages: Vec<MessageSnapshot>,
    pub created_at: i64,
    pub elapsed_ms: u64,
    pub label: Option<String>,
}

/// Canonical (key-order-stable) copy of [`Outcome`] for hashing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeSnapshot {
    pub agent_id: String,
    pub role: String,
    pub task_kind: String,
    pub task_id: String,
    pub success: bool,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub retry_count: u32,
    pub depth: u32,
    pub error_pattern: Option<String>,
    pub timestamp: i64,
}

impl From<&Outcome> for OutcomeSnapshot {
    fn from(o: &Outcome) -> Self {
        Self {
            agent_id: o.agent_id.clone(),
            role: o.role.clone(),
            task_kind: o.task_kind.to_string(),
            task_id: o.task_id.clone(),
            success: o.success,
            exit_code: o.exit_code,
            duration_ms: o.duration_ms,
            retry_count: o.retry_count,
            depth: o.depth,
            error_pattern: o.error_pattern.clone(),
            timestamp: o.timestamp.timestamp_millis(),
        }
    }
}

/// Canonical copy of [`Message`] for hashing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageSnapshot {
    pub id: String,
    pub topic: String,
    pub sender: String,
    pub sender_role: String,
    pub payload: serde_json::Value,
    pub timestamp: i64,
    pub ttl_ms: u64,
    pub target: Option<String>,
}

impl From<&Message> for MessageSnapshot {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.to_string(),
            topic: m.topic.clone(),
            sender: m.sender.clone(),
            sender_role: m.sender_role.clone(),
            payload: m.payload.clone(),
            timestamp: m.timestamp.timestamp_millis(),
            ttl_ms: m.ttl_ms,
            target: m.target.clone(),
        }
    }
}

/// A hash-sealed, immutable checkpoint (spec §3 / §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub snapshot: Snapshot,
    pub hash: String,
    pub size_bytes: usize,
}

/// Canonical serialisation: `serde_json`'s `to_string` over `BTreeMap`-backed
/// structures is already key-order stable, giving reproducible bytes for
/// hashing across runs and platforms.
pub fn canonical_serialize(snapshot: &Snapshot) -> String {
    serde_json::to_string(snapshot).expect("Snapshot serialisation is infallible")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            id: "cp-1".into(),
            version: SNAPSHOT_VERSION,
            graph: GraphSnapshot { tasks: vec![] },
            execution_order: vec!["a".into(), "b".into()],
            total_retries: 0,
            total_spawned: 0,
            outcomes: vec![],
            messages: vec![],
            created_at: 0,
            elapsed_ms: 0,
            label: None,
        }
    }

    #[test]
    fn canonical_serialization_is_deterministic() {
        let s = sample_snapshot();
        assert_eq!(canonical_serialize(&s), canonical_serialize(&s));
    }
}
