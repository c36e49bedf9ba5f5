//! Task dependency graph: validation, topological bookkeeping, and the
//! insertion-ordered map that gives deterministic scheduling tie-breaks
//! (spec §3, "Graph").
//!
//! Grounded on `abathur::services::dependency_resolver::DependencyResolver`
//! (Kahn's-algorithm cycle detection and topological sort), generalized to
//! return the residual cycle set per spec §4.1 rather than a bare bool.

use std::collections::{HashMap, HashSet, VecDeque};

use super::task::{Task, TaskStatus};

/// A mapping `id -> Task`, keys unique, preserving insertion order of roots
/// for deterministic scheduling tie-breaks (spec §3).
#[derive(Debug, Clone, Default)]
pub struct Graph {
    tasks: HashMap<String, Task>,
    /// Insertion order of ids, the "graph iteration order" referenced
    /// throughout spec §4.1 and §5.
    order: Vec<String>,
}

/// Structural error raised by [`Graph::validate`] (spec §4.1 / §7).
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("task {task} declares missing dependency {missing}")]
    MissingDependency { task: String, missing: String },

    #[error("graph contains a cycle among: {cycle:?}")]
    Cycle { cycle: Vec<String> },

    #[error("duplicate task id: {0}")]
    DuplicateId(String),
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks(tasks: Vec<Task>) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for task in tasks {
            graph.insert(task)?;
        }
        Ok(graph)
    }

    /// Insert a task, preserving insertion order. Errors on duplicate id.
    pub fn insert(&mut self, task: Task) -> Result<(), GraphError> {
        if self.tasks.contains_key(&task.id) {
            return Err(GraphError::DuplicateId(task.id));
        }
        self.order.push(task.id.clone());
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task ids in deterministic graph iteration (insertion) order.
    pub fn iter_order(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(move |id| self.tasks.get(id))
    }

    pub fn ids(&self) -> HashSet<String> {
        self.tasks.keys().cloned().collect()
    }

    /// Full graph validation (spec §4.1):
    /// 1. every declared dependency must exist;
    /// 2. the graph must be acyclic, verified via Kahn's algorithm.
    pub fn validate(&self) -> Result<(), GraphError> {
        for task in self.tasks.values() {
            for dep in &task.dependencies {
                if !self.tasks.contains_key(dep) {
                    return Err(GraphError::MissingDependency {
                        task: task.id.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }
        if let Some(cycle) = self.find_cycle() {
            return Err(GraphError::Cycle { cycle });
        }
        Ok(())
    }

    /// Kahn's algorithm: returns `None` if the graph is acyclic, otherwise
    /// the residual (non-zero in-degree) node ids forming the cycle set.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for id in self.order.iter() {
            in_degree.entry(id.as_str()).or_insert(0);
        }
        for task in self.tasks.values() {
            for dep in &task.dependencies {
                if self.tasks.contains_key(dep) {
                    *in_degree.entry(task.id.as_str()).or_insert(0) += 1;
                    dependents.entry(dep.as_str()).or_default().push(task.id.as_str());
                }
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut visited = 0usize;

        while let Some(id) = queue.pop_front() {
            visited += 1;
            if let Some(deps) = dependents.get(id) {
                for &dependent in deps {
                    if let Some(deg) = in_degree.get_mut(dependent) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        if visited < in_degree.len() {
            let residual: Vec<String> = in_degree
                .into_iter()
                .filter(|&(_, deg)| deg > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            Some(residual)
        } else {
            None
        }
    }

    /// Promote PENDING tasks whose dependencies are all COMPLETED to READY,
    /// and SKIP (transitively) any task with a FAILED/SKIPPED dependency
    /// (spec §4.1). Returns the ids touched, in graph order, for logging.
    pub fn update_ready_and_skipped(&mut self) -> Vec<String> {
        let mut touched = Vec::new();
        loop {
            let mut changed = false;
            let ids: Vec<String> = self.order.clone();
            for id in ids {
                let (should_skip, should_ready) = {
                    let task = self.tasks.get(&id).unwrap();
                    if task.status != TaskStatus::Pending {
                        (false, false)
                    } else {
                        let mut any_bad = false;
                        let mut all_done = true;
                        for dep in &task.dependencies {
                            match self.tasks.get(dep).map(|t| t.status) {
                                Some(TaskStatus::Completed) => {}
                                Some(TaskStatus::Failed) | Some(TaskStatus::Skipped) => {
                                    any_bad = true;
                                    all_done = false;
                                }
                                _ => all_done = false,
                            }
                        }
                        (any_bad, all_done)
                    }
                };
                if should_skip {
                    let task = self.tasks.get_mut(&id).unwrap();
                    let _ = task.set_status(TaskStatus::Skipped);
                    touched.push(id.clone());
                    changed = true;
                } else if should_ready {
                    let task = self.tasks.get_mut(&id).unwrap();
                    let _ = task.set_status(TaskStatus::Ready);
                    touched.push(id.clone());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        touched
    }

    /// READY tasks in deterministic graph iteration order (spec §4.1,
    /// "dispatch the next READY tasks in order of graph iteration").
    pub fn ready_in_order(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.tasks.get(*id).map(|t| t.status) == Some(TaskStatus::Ready))
            .cloned()
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.tasks.values().all(|t| t.is_terminal())
    }

    pub fn non_terminal_ids(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| !self.tasks.get(*id).map(|t| t.is_terminal()).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Verify acyclicity of a hypothetical addition without mutating self
    /// (used by the mutation controller, spec §4.1).
    pub fn would_remain_acyclic_with(&self, candidate: &Task) -> bool {
        let mut copy = self.clone();
        if copy.insert(candidate.clone()).is_err() {
            return false;
        }
        copy.find_cycle().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::TaskKind;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::new(id, TaskKind::Code, "builder").with_dependencies(deps.iter().copied())
    }

    #[test]
    fn linear_chain_validates() {
        let g = Graph::from_tasks(vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])])
            .unwrap();
        assert!(g.validate().is_ok());
    }

    #[test]
    fn missing_dependency_is_structural_error() {
        let g = Graph::from_tasks(vec![task("a", &["ghost"])]).unwrap();
        assert!(matches!(
            g.validate(),
            Err(GraphError::MissingDependency { .. })
        ));
    }

    #[test]
    fn cycle_is_detected() {
        let g = Graph::from_tasks(vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"])])
            .unwrap();
        let err = g.validate().unwrap_err();
        match err {
            GraphError::Cycle { cycle } => assert_eq!(cycle.len(), 3),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn ready_promotion_and_cascade_skip() {
        let mut g = Graph::from_tasks(vec![
            task("root", &[]),
            task("child1", &["root"]),
            task("child2", &["root"]),
            task("grandchild", &["child1"]),
        ])
        .unwrap();
        g.update_ready_and_skipped();
        assert_eq!(g.get("root").unwrap().status, TaskStatus::Ready);
        g.get_mut("root").unwrap().set_status(TaskStatus::Running).unwrap();
        g.get_mut("root").unwrap().set_status(TaskStatus::Failed).unwrap();
        g.update_ready_and_skipped();
        assert_eq!(g.get("child1").unwrap().status, TaskStatus::Skipped);
        assert_eq!(g.get("child2").unwrap().status, TaskStatus::Skipped);
        assert_eq!(g.get("grandchild").unwrap().status, TaskStatus::Skipped);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut g = Graph::new();
        g.insert(task("a", &[])).unwrap();
        assert!(matches!(g.insert(task("a", &[])), Err(GraphError::DuplicateId(_))));
    }
}
