//! Spec ↔ plan version tracking; blocks implementation tasks when the
//! spec has moved ahead of the plan (spec §4.4, C7).
//!
//! Grounded on `abathur::services::guardrails`'s style of a small
//! `HashMap`-keyed state tracker with content-hash-gated appends; the
//! version-series and drift classification are new per spec §4.4.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::domain::models::TaskKind;

/// One recorded version of a spec or plan document.
#[derive(Debug, Clone)]
pub struct DocumentVersion {
    pub path: String,
    pub content_hash: String,
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub size_bytes: usize,
}

fn hash_content(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}")
}

#[derive(Debug, Clone, Default)]
struct FeatureHistory {
    spec: Vec<DocumentVersion>,
    plan: Vec<DocumentVersion>,
    /// Snapshot taken by `markAligned`: (latestSpecVersion, latestPlanVersion).
    aligned_at: Option<(u32, u32)>,
}

/// Drift classification returned by [`DriftGate::check_drift`] (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftStatus {
    None,
    MissingSpec,
    MissingPlan,
    SpecAhead,
    PlanAhead,
}

/// Verdict from [`DriftGate::check_task_gate`].
#[derive(Debug, Clone)]
pub struct TaskGateVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
}

/// Tracks spec/plan version history per feature and gates tasks on drift
/// (spec §4.4).
pub struct DriftGate {
    enforce: bool,
    features: std::sync::Mutex<HashMap<String, FeatureHistory>>,
}

impl DriftGate {
    pub fn new(enforce: bool) -> Self {
        Self { enforce, features: std::sync::Mutex::new(HashMap::new()) }
    }

    fn push_if_changed(series: &mut Vec<DocumentVersion>, path: &str, content: &str) -> Option<DocumentVersion> {
        let hash = hash_content(content);
        if series.last().is_some_and(|last| last.content_hash == hash) {
            return None;
        }
        let version = DocumentVersion {
            path: path.to_string(),
            content_hash: hash,
            version: series.len() as u32 + 1,
            updated_at: Utc::now(),
            size_bytes: content.len(),
        };
        series.push(version.clone());
        Some(version)
    }

    pub fn update_spec(&self, feature_id: &str, path: &str, content: &str) -> Option<DocumentVersion> {
        let mut features = self.features.lock().expect("drift gate mutex poisoned");
        let entry = features.entry(feature_id.to_string()).or_default();
        Self::push_if_changed(&mut entry.spec, path, content)
    }

    pub fn update_plan(&self, feature_id: &str, path: &str, content: &str) -> Option<DocumentVersion> {
        let mut features = self.features.lock().expect("drift gate mutex poisoned");
        let entry = features.entry(feature_id.to_string()).or_default();
        Self::push_if_changed(&mut entry.plan, path, content)
    }

    pub fn mark_aligned(&self, feature_id: &str) {
        let mut features = self.features.lock().expect("drift gate mutex poisoned");
        let entry = features.entry(feature_id.to_string()).or_default();
        let spec_v = entry.spec.last().map(|d| d.version).unwrap_or(0);
        let plan_v = entry.plan.last().map(|d| d.version).unwrap_or(0);
        entry.aligned_at = Some((spec_v, plan_v));
    }

    pub fn check_drift(&self, feature_id: &str) -> DriftStatus {
        let features = self.features.lock().expect("drift gate mutex poisoned");
        let Some(entry) = features.get(feature_id) else {
            return DriftStatus::None;
        };
        let spec_v = entry.spec.last().map(|d| d.version);
        let plan_v = entry.plan.last().map(|d| d.version);

        match (spec_v, plan_v) {
            (None, None) => DriftStatus::None,
            (Some(_), None) => DriftStatus::MissingPlan,
            (None, Some(_)) => DriftStatus::MissingSpec,
            (Some(spec_v), Some(plan_v)) => match entry.aligned_at {
                None => {
                    if spec_v > plan_v {
                        DriftStatus::SpecAhead
                    } else if plan_v > spec_v {
                        DriftStatus::PlanAhead
                    } else {
                        DriftStatus::None
                    }
                }
                Some((aligned_spec, aligned_plan)) => {
                    let spec_changed = spec_v > aligned_spec;
                    let plan_changed = plan_v > aligned_plan;
                    if spec_changed == plan_changed {
                        DriftStatus::None
                    } else if spec_changed {
                        DriftStatus::SpecAhead
                    } else {
                        DriftStatus::PlanAhead
                    }
                }
            },
        }
    }

    /// Gates a dispatch decision on drift status (spec §4.4).
    pub fn check_task_gate(&self, feature_id: &str, kind: TaskKind) -> TaskGateVerdict {
        if !self.enforce {
            return TaskGateVerdict { allowed: true, reason: None };
        }
        let status = self.check_drift(feature_id);
        if status == DriftStatus::None {
            return TaskGateVerdict { allowed: true, reason: None };
        }
        match status {
            DriftStatus::MissingPlan
                if matches!(kind, TaskKind::Code | TaskKind::Test | TaskKind::Deploy) =>
            {
                TaskGateVerdict { allowed: false, reason: Some("run plan first".to_string()) }
            }
            DriftStatus::SpecAhead if matches!(kind, TaskKind::Code | TaskKind::Deploy) => TaskGateVerdict {
                allowed: false,
                reason: Some(format!("spec is ahead of plan for feature {feature_id}")),
            },
            _ => TaskGateVerdict { allowed: true, reason: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_does_not_bump_version() {
        let gate = DriftGate::new(true);
        assert!(gate.update_spec("f1", "spec.md", "hello").is_some());
        assert!(gate.update_spec("f1", "spec.md", "hello").is_none());
    }

    #[test]
    fn missing_plan_blocks_code_task() {
        let gate = DriftGate::new(true);
        gate.update_spec("f1", "spec.md", "v1");
        assert_eq!(gate.check_drift("f1"), DriftStatus::MissingPlan);
        let verdict = gate.check_task_gate("f1", TaskKind::Code);
        assert!(!verdict.allowed);
    }

    #[test]
    fn spec_ahead_blocks_deploy_but_allows_research() {
        let gate = DriftGate::new(true);
        gate.update_spec("f1", "spec.md", "v1");
        gate.update_plan("f1", "plan.md", "v1");
        gate.mark_aligned("f1");
        gate.update_spec("f1", "spec.md", "v2");
        assert_eq!(gate.check_drift("f1"), DriftStatus::SpecAhead);
        assert!(!gate.check_task_gate("f1", TaskKind::Deploy).allowed);
        assert!(gate.check_task_gate("f1", TaskKind::Research).allowed);
    }

    #[test]
    fn both_bumped_after_alignment_is_none() {
        let gate = DriftGate::new(true);
        gate.update_spec("f1", "spec.md", "v1");
        gate.update_plan("f1", "plan.md", "v1");
        gate.mark_aligned("f1");
        gate.update_spec("f1", "spec.md", "v2");
        gate.update_plan("f1", "plan.md", "v2");
        assert_eq!(gate.check_drift("f1"), DriftStatus::None);
    }

    #[test]
    fn disabled_enforcement_always_allows() {
        let gate = DriftGate::new(false);
        gate.update_spec("f1", "spec.md", "v1");
        assert!(gate.check_task_gate("f1", TaskKind::Deploy).allowed);
    }
}
