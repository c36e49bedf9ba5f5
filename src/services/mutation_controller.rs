//! Validates dynamic-graph-mutation `SpawnRequest`s against depth, size,
//! uniqueness, dependency, acyclicity, and RBAC constraints (spec §4.1,
//! "Dynamic graph mutation").
//!
//! Grounded on `abathur::services::dependency_resolver`'s
//! `validate_dependencies` check, extended with the depth/size/acyclicity/
//! RBAC gauntlet spec §4.1 specifies for accepting a spawned child.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::error::SpawnRejectReason;
use crate::domain::models::{required_permission, Graph, RoleTable, Task, TaskKind, PARENT_CONTEXT_KEY};
use crate::domain::ports::SpawnRequest;

/// Limits governing accepted spawn requests (spec §4.1).
#[derive(Debug, Clone, Copy)]
pub struct MutationLimits {
    pub max_depth: u32,
    pub max_graph_size: usize,
    pub enforce_rbac: bool,
}

impl Default for MutationLimits {
    fn default() -> Self {
        Self { max_depth: 8, max_graph_size: 5_000, enforce_rbac: true }
    }
}

/// Validates and materialises spawn requests (spec §4.1).
pub struct MutationController {
    limits: MutationLimits,
}

impl MutationController {
    pub fn new(limits: MutationLimits) -> Self {
        Self { limits }
    }

    pub fn with_defaults() -> Self {
        Self::new(MutationLimits::default())
    }

    /// Validates `request` against `graph` (spawned as a child of
    /// `parent`), returning the ready-to-insert [`Task`] on acceptance.
    pub fn validate(
        &self,
        graph: &Graph,
        parent: &Task,
        request: &SpawnRequest,
        target_role: &str,
        roles: &RoleTable,
    ) -> Result<Task, SpawnRejectReason> {
        let depth = parent.depth + 1;
        if depth > self.limits.max_depth {
            return Err(SpawnRejectReason::DepthExceeded);
        }
        if graph.len() >= self.limits.max_graph_size {
            return Err(SpawnRejectReason::GraphSizeExceeded);
        }
        if graph.contains(&request.id) {
            return Err(SpawnRejectReason::DuplicateId);
        }

        let dependencies = if request.dependencies.is_empty() {
            vec![parent.id.clone()]
        } else {
            request.dependencies.clone()
        };
        for dep in &dependencies {
            if dep != &parent.id && !graph.contains(dep) {
                return Err(SpawnRejectReason::MissingDependency);
            }
        }

        if self.limits.enforce_rbac {
            if !roles.knows_role(target_role) {
                return Err(SpawnRejectReason::RbacUnknownRole);
            }
            let required = required_permission(request.kind);
            if !roles.has_permission(target_role, required) {
                return Err(SpawnRejectReason::RbacDenied);
            }
        }

        let mut payload = request.payload.clone();
        payload.insert(
            PARENT_CONTEXT_KEY.to_string(),
            Value::Object(serde_json::Map::from_iter([
                ("parentId".to_string(), Value::String(parent.id.clone())),
                ("parentStdout".to_string(), Value::String(truncate_stdout(parent))),
            ])),
        );

        let candidate = Task {
            id: request.id.clone(),
            kind: request.kind,
            agent_hint: request.agent_hint.clone(),
            dependencies,
            payload,
            status: crate::domain::models::TaskStatus::Pending,
            result: None,
            retry_count: 0,
            depth,
            parent_id: Some(parent.id.clone()),
        };

        if !graph.would_remain_acyclic_with(&candidate) {
            return Err(SpawnRejectReason::CycleDetected);
        }

        Ok(candidate)
    }

    /// Synthesises the two-task RESEARCH -> PLAN reactive mutation for a
    /// failed AUDIT/REVIEW task (spec §4.1, "Reactive mutation").
    pub fn reactive_children(parent: &Task, rejection_reason: &str) -> (Task, Task) {
        let research_id = format!("{}-reactive-research", parent.id);
        let plan_id = format!("{}-reactive-plan", parent.id);

        let mut research_payload: BTreeMap<String, Value> = BTreeMap::new();
        research_payload.insert("rejectionReason".to_string(), Value::String(rejection_reason.to_string()));
        research_payload.insert(crate::domain::models::REACTIVE_CONTEXT_KEY.to_string(), Value::Bool(true));

        let research = Task {
            id: research_id.clone(),
            kind: TaskKind::Research,
            agent_hint: parent.agent_hint.clone(),
            dependencies: vec![parent.id.clone()],
            payload: research_payload,
            status: crate::domain::models::TaskStatus::Pending,
            result: None,
            retry_count: 0,
            depth: parent.depth + 1,
            parent_id: Some(parent.id.clone()),
        };

        let mut plan_payload: BTreeMap<String, Value> = BTreeMap::new();
        plan_payload.insert("rejectionReason".to_string(), Value::String(rejection_reason.to_string()));
        plan_payload.insert(crate::domain::models::REACTIVE_CONTEXT_KEY.to_string(), Value::Bool(true));

        let plan = Task {
            id: plan_id,
            kind: TaskKind::Plan,
            agent_hint: parent.agent_hint.clone(),
            dependencies: vec![research_id],
            payload: plan_payload,
            status: crate::domain::models::TaskStatus::Pending,
            result: None,
            retry_count: 0,
            depth: parent.depth + 1,
            parent_id: Some(parent.id.clone()),
        };

        (research, plan)
    }
}

fn truncate_stdout(parent: &Task) -> String {
    const MAX_LEN: usize = 500;
    let stdout = parent.result.as_ref().map(|r| r.stdout.as_str()).unwrap_or("");
    if stdout.len() <= MAX_LEN {
        return stdout.to_string();
    }
    let cut = stdout
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= MAX_LEN)
        .last()
        .unwrap_or(0);
    format!("{}...", &stdout[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RoleTable;

    fn graph_with_root() -> (Graph, Task) {
        let mut g = Graph::new();
        let root = Task::new("root", TaskKind::Plan, "architect");
        g.insert(root.clone()).unwrap();
        (g, root)
    }

    fn request(id: &str, kind: TaskKind) -> SpawnRequest {
        SpawnRequest { id: id.to_string(), kind, agent_hint: "builder".to_string(), dependencies: Vec::new(), payload: BTreeMap::new() }
    }

    #[test]
    fn accepted_request_defaults_dependency_to_parent() {
        let (graph, parent) = graph_with_root();
        let controller = MutationController::with_defaults();
        let roles = RoleTable::default_roles();
        let task = controller.validate(&graph, &parent, &request("child", TaskKind::Code), "builder", &roles).unwrap();
        assert_eq!(task.dependencies, vec!["root".to_string()]);
        assert_eq!(task.depth, 1);
        assert!(task.payload.contains_key(PARENT_CONTEXT_KEY));
    }

    #[test]
    fn depth_exceeded_is_rejected() {
        let (graph, mut parent) = graph_with_root();
        parent.depth = 10;
        let controller = MutationController::new(MutationLimits { max_depth: 8, ..MutationLimits::default() });
        let roles = RoleTable::default_roles();
        let err = controller.validate(&graph, &parent, &request("child", TaskKind::Code), "builder", &roles).unwrap_err();
        assert_eq!(err, SpawnRejectReason::DepthExceeded);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let (graph, parent) = graph_with_root();
        let controller = MutationController::with_defaults();
        let roles = RoleTable::default_roles();
        let err = controller.validate(&graph, &parent, &request("root", TaskKind::Code), "builder", &roles).unwrap_err();
        assert_eq!(err, SpawnRejectReason::DuplicateId);
    }

    #[test]
    fn missing_dependency_is_rejected() {
        let (graph, parent) = graph_with_root();
        let controller = MutationController::with_defaults();
        let roles = RoleTable::default_roles();
        let mut req = request("child", TaskKind::Code);
        req.dependencies = vec!["ghost".to_string()];
        let err = controller.validate(&graph, &parent, &req, "builder", &roles).unwrap_err();
        assert_eq!(err, SpawnRejectReason::MissingDependency);
    }

    #[test]
    fn rbac_denied_when_target_role_lacks_permission() {
        let (graph, parent) = graph_with_root();
        let controller = MutationController::with_defaults();
        let roles = RoleTable::default_roles();
        let err = controller.validate(&graph, &parent, &request("child", TaskKind::Deploy), "tester", &roles).unwrap_err();
        assert_eq!(err, SpawnRejectReason::RbacDenied);
    }

    #[test]
    fn unknown_target_role_is_rejected() {
        let (graph, parent) = graph_with_root();
        let controller = MutationController::with_defaults();
        let roles = RoleTable::default_roles();
        let err = controller.validate(&graph, &parent, &request("child", TaskKind::Code), "ghost-role", &roles).unwrap_err();
        assert_eq!(err, SpawnRejectReason::RbacUnknownRole);
    }

    #[test]
    fn truncation_does_not_split_a_multibyte_char() {
        let (graph, mut parent) = graph_with_root();
        let mut stdout = "a".repeat(499);
        stdout.push('€'); // 3-byte char straddling the 500-byte cut point
        stdout.push_str(&"b".repeat(50));
        parent.result = Some(crate::domain::models::TaskResult::success(stdout, 0));
        let controller = MutationController::with_defaults();
        let roles = RoleTable::default_roles();
        let task = controller.validate(&graph, &parent, &request("child", TaskKind::Code), "builder", &roles).unwrap();
        let Value::Object(ctx) = &task.payload[PARENT_CONTEXT_KEY] else { panic!("expected object") };
        let Value::String(truncated) = &ctx["parentStdout"] else { panic!("expected string") };
        assert!(truncated.ends_with("..."));
        assert!(truncated.is_char_boundary(truncated.len()));
    }

    #[test]
    fn reactive_children_form_research_then_plan_chain() {
        let (_graph, parent) = graph_with_root();
        let (research, plan) = MutationController::reactive_children(&parent, "quality gate RED");
        assert_eq!(research.kind, TaskKind::Research);
        assert_eq!(plan.kind, TaskKind::Plan);
        assert_eq!(plan.dependencies, vec![research.id.clone()]);
    }
}
