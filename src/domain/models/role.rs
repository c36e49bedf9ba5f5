//! Roles, permissions, and RBAC tables shared by the SecurityGate, the
//! mutation controller, and the negotiation engine (spec §4.1 / §4.2 / §4.9).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::task::TaskKind;

/// A capability an actor's role may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    FileWrite,
    FileRead,
    ShellExec,
    Deploy,
    Audit,
    Research,
    Design,
    InfraProvision,
    Review,
    Broadcast,
}

/// The permission a given [`TaskKind`] requires to be dispatched (spec
/// §4.1's `CODE -> FILE_WRITE` example, generalized to every kind).
pub fn required_permission(kind: TaskKind) -> Permission {
    match kind {
        TaskKind::Plan | TaskKind::Design => Permission::Design,
        TaskKind::Code => Permission::FileWrite,
        TaskKind::Audit => Permission::Audit,
        TaskKind::Test => Permission::FileRead,
        TaskKind::Review => Permission::Review,
        TaskKind::Deploy => Permission::Deploy,
        TaskKind::Research => Permission::Research,
        TaskKind::InfraProvision => Permission::InfraProvision,
        TaskKind::Shell => Permission::ShellExec,
    }
}

/// Roles authorised to cast a `VETO` vote in the negotiation engine
/// (spec §4.9).
pub const VETO_ROLES: &[&str] = &["guardian", "strategist"];

pub fn is_veto_role(role: &str) -> bool {
    VETO_ROLES.contains(&role)
}

/// A role-to-permissions RBAC table. Unknown roles hold no permissions.
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    permissions: HashMap<String, HashSet<Permission>>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>, perms: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions.insert(role.into(), perms.into_iter().collect());
        self
    }

    pub fn has_permission(&self, role: &str, permission: Permission) -> bool {
        self.permissions
            .get(role)
            .map(|set| set.contains(&permission))
            .unwrap_or(false)
    }

    pub fn knows_role(&self, role: &str) -> bool {
        self.permissions.contains_key(role)
    }

    /// A small default table covering the task kinds in spec §3, useful for
    /// tests and the demo binary.
    pub fn default_roles() -> Self {
        use Permission::*;
        Self::new()
            .with_role("architect", [Design, FileRead, Review, Research])
            .with_role(
                "builder",
                [FileWrite, FileRead, ShellExec, Research, Design],
            )
            .with_role("auditor", [Audit, FileRead, Review])
            .with_role("tester", [FileRead, ShellExec])
            .with_role("releaser", [Deploy, FileRead, InfraProvision])
            .with_role("guardian", [Review, Audit, FileRead])
            .with_role("strategist", [Design, Research, Review])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_has_no_permissions() {
        let table = RoleTable::default_roles();
        assert!(!table.has_permission("ghost", Permission::Deploy));
        assert!(!table.knows_role("ghost"));
    }

    #[test]
    fn required_permission_maps_code_to_file_write() {
        assert_eq!(required_permission(TaskKind::Code), Permission::FileWrite);
        assert_eq!(required_permission(TaskKind::Shell), Permission::ShellExec);
    }
}
