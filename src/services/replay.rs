//! Chronologically indexed event reconstruction from a checkpoint
//! snapshot (spec §4.10, `ExecutionReplay`, C11b).
//!
//! Grounded on the `abathur::services::event_bus`'s sequence-numbered
//! event idiom, applied here to offline replay rather than live delivery.

use crate::domain::models::{Snapshot, TaskResult, TaskStatus};

/// One reconstructed execution event (spec §4.10).
#[derive(Debug, Clone)]
pub enum ReplayEvent {
    Dispatch { index: u64, task_id: String },
    Complete { index: u64, task_id: String, result: TaskResult },
    Fail { index: u64, task_id: String, result: Option<TaskResult> },
    Spawn { index: u64, parent_id: String, child_id: String },
    Message { index: u64, topic: String, sender: String },
    Outcome { index: u64, agent_id: String, task_id: String, success: bool },
}

/// Reconstructs a strictly-sequential event log from a [`Snapshot`]
/// (spec §4.10).
pub struct ExecutionReplay;

impl ExecutionReplay {
    pub fn replay(snapshot: &Snapshot) -> Vec<ReplayEvent> {
        let mut events = Vec::new();
        let mut index = 0u64;

        for task_id in &snapshot.execution_order {
            let Some(task) = snapshot.graph.tasks.iter().find(|t| &t.id == task_id) else {
                continue;
            };

            events.push(ReplayEvent::Dispatch { index, task_id: task_id.clone() });
            index += 1;

            match task.status {
                TaskStatus::Completed => {
                    if let Some(result) = task.result.clone() {
                        events.push(ReplayEvent::Complete { index, task_id: task_id.clone(), result });
                        index += 1;
                    }
                }
                TaskStatus::Failed | TaskStatus::Skipped => {
                    events.push(ReplayEvent::Fail { index, task_id: task_id.clone(), result: task.result.clone() });
                    index += 1;
                }
                _ => {}
            }

            for child in snapshot.graph.tasks.iter().filter(|t| t.parent_id.as_deref() == Some(task_id.as_str())) {
                events.push(ReplayEvent::Spawn { index, parent_id: task_id.clone(), child_id: child.id.clone() });
                index += 1;
            }
        }

        for message in &snapshot.messages {
            events.push(ReplayEvent::Message { index, topic: message.topic.clone(), sender: message.sender.clone() });
            index += 1;
        }

        for outcome in &snapshot.outcomes {
            events.push(ReplayEvent::Outcome {
                index,
                agent_id: outcome.agent_id.clone(),
                task_id: outcome.task_id.clone(),
                success: outcome.success,
            });
            index += 1;
        }

        events
    }
}
