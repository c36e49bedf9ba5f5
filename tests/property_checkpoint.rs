//! Property test for checkpoint round-trip stability (P8): saving and
//! immediately loading a checkpoint reproduces the same terminal/
//! non-terminal split and never trips integrity verification.

use castellan::domain::models::{Graph, Task, TaskKind, TaskStatus};
use castellan::services::{CheckpointConfig, CheckpointManager};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

fn chain_graph(size: usize, completed_through: usize) -> Graph {
    let mut graph = Graph::new();
    for i in 0..size {
        let deps: Vec<String> = if i == 0 { vec![] } else { vec![format!("t{}", i - 1)] };
        graph.insert(Task::new(format!("t{i}"), TaskKind::Code, "builder").with_dependencies(deps)).unwrap();
    }
    for i in 0..completed_through.min(size) {
        let id = format!("t{i}");
        let task = graph.get_mut(&id).unwrap();
        task.set_status(TaskStatus::Ready).unwrap();
        task.set_status(TaskStatus::Running).unwrap();
        task.set_status(TaskStatus::Completed).unwrap();
    }
    graph
}

proptest! {
    /// Property P8: a checkpoint saved from a graph with some prefix of
    /// tasks completed loads back with exactly that prefix preserved
    /// (terminal, unchanged status) and the remainder requeued to
    /// PENDING, under the default `verify_on_load` hash check.
    #[test]
    fn prop_checkpoint_roundtrip_preserves_terminal_split(
        size in 1usize..15,
        completed_through in 0usize..15,
    ) {
        let graph = chain_graph(size, completed_through);
        let manager = CheckpointManager::new(CheckpointConfig::default());
        let checkpoint = manager.save(&graph, vec![], 0, 0, &[], &[], 0, None, None);

        let restored = manager.load(&checkpoint.snapshot.id).map_err(|e| TestCaseError::fail(e.to_string()))?;

        let expected_preserved = completed_through.min(size);
        prop_assert_eq!(restored.preserved.len(), expected_preserved);
        prop_assert_eq!(restored.requeued.len(), size - expected_preserved);

        for id in &restored.preserved {
            prop_assert_eq!(restored.graph.get(id).unwrap().status, TaskStatus::Completed);
        }
        for id in &restored.requeued {
            prop_assert_eq!(restored.graph.get(id).unwrap().status, TaskStatus::Pending);
        }
    }
}
