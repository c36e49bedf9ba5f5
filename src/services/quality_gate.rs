//! Architecture Technical Debt Index: dependency-graph + per-file metric
//! smells rolled up into a GREEN/AMBER/RED deploy gate (spec §4.3, C6).
//!
//! Grounded on `abathur::services::dependency_resolver::detect_cycle_util`
//! for the recursive-DFS cycle-finding idiom, rewritten here as an
//! **iterative** DFS with an explicit frame stack per spec §4.3's closing
//! paragraph ("avoids recursion limits on large graphs").

use std::collections::{BTreeMap, HashMap};

/// Per-file raw metrics feeding the per-file-excess smells.
#[derive(Debug, Clone, Copy)]
pub struct FileMetrics {
    pub loc: u32,
    pub cyclomatic_complexity: u32,
    pub imports_count: u32,
}

/// Thresholds and weights for the ATDI scoring function.
#[derive(Debug, Clone, Copy)]
pub struct AtdiConfig {
    pub cycle_weight: i64,
    pub god_weight: i64,
    pub dependency_limit: u32,
    pub loc_threshold: u32,
    pub complexity_threshold: u32,
    pub dependency_count_threshold: u32,
    pub per_unit_weight: i64,
    pub green_max: i64,
    pub amber_max: i64,
}

impl Default for AtdiConfig {
    fn default() -> Self {
        Self {
            cycle_weight: 50,
            god_weight: 80,
            dependency_limit: 10,
            loc_threshold: 400,
            complexity_threshold: 20,
            dependency_count_threshold: 15,
            per_unit_weight: 2,
            green_max: 100,
            amber_max: 300,
        }
    }
}

/// Traffic-light classification of an ATDI report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficLight {
    Green,
    Amber,
    Red,
}

/// A single smell contributing to the aggregate score.
#[derive(Debug, Clone)]
pub enum Smell {
    Cycle { path: Vec<String>, penalty: i64 },
    GodComponent { file: String, edge_count: u32, penalty: i64 },
    FileExcess { file: String, metric: &'static str, value: u32, threshold: u32, penalty: i64 },
}

impl Smell {
    fn penalty(&self) -> i64 {
        match self {
            Self::Cycle { penalty, .. } | Self::GodComponent { penalty, .. } | Self::FileExcess { penalty, .. } => *penalty,
        }
    }
}

/// The output of [`QualityGate::analyze`].
#[derive(Debug, Clone)]
pub struct Report {
    pub smells: Vec<Smell>,
    pub score: i64,
    pub traffic_light: TrafficLight,
    pub blocked: bool,
}

/// Verdict from [`QualityGate::check_deploy_gate`].
#[derive(Debug, Clone)]
pub struct DeployGateVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
    pub traffic_light: Option<TrafficLight>,
    pub score: Option<i64>,
}

/// Dependency-graph + per-file metrics quality gate (spec §4.3).
pub struct QualityGate {
    config: AtdiConfig,
    last_report: std::sync::Mutex<Option<Report>>,
}

impl QualityGate {
    pub fn new(config: AtdiConfig) -> Self {
        Self { config, last_report: std::sync::Mutex::new(None) }
    }

    pub fn with_defaults() -> Self {
        Self::new(AtdiConfig::default())
    }

    /// `graph` maps file -> imported files; `metrics` maps file -> raw
    /// metrics. Produces and stores a [`Report`] (spec §4.3).
    pub fn analyze(&self, graph: &HashMap<String, Vec<String>>, metrics: &BTreeMap<String, FileMetrics>) -> Report {
        let mut smells = Vec::new();

        for cycle in Self::find_all_cycles(graph) {
            let penalty = self.config.cycle_weight * cycle.len() as i64;
            smells.push(Smell::Cycle { path: cycle, penalty });
        }

        let mut in_edges: HashMap<&str, u32> = HashMap::new();
        for targets in graph.values() {
            for t in targets {
                *in_edges.entry(t.as_str()).or_insert(0) += 1;
            }
        }
        for (file, targets) in graph {
            let out = targets.len() as u32;
            let incoming = in_edges.get(file.as_str()).copied().unwrap_or(0);
            let total = out + incoming;
            if total > 2 * self.config.dependency_limit {
                smells.push(Smell::GodComponent { file: file.clone(), edge_count: total, penalty: self.config.god_weight });
            }
        }

        for (file, m) in metrics {
            if m.loc > self.config.loc_threshold {
                smells.push(Smell::FileExcess {
                    file: file.clone(),
                    metric: "LOC",
                    value: m.loc,
                    threshold: self.config.loc_threshold,
                    penalty: (i64::from(m.loc) - i64::from(self.config.loc_threshold)) * self.config.per_unit_weight,
                });
            }
            if m.cyclomatic_complexity > self.config.complexity_threshold {
                smells.push(Smell::FileExcess {
                    file: file.clone(),
                    metric: "COMPLEXITY",
                    value: m.cyclomatic_complexity,
                    threshold: self.config.complexity_threshold,
                    penalty: (i64::from(m.cyclomatic_complexity) - i64::from(self.config.complexity_threshold))
                        * self.config.per_unit_weight,
                });
            }
            if m.imports_count > self.config.dependency_count_threshold {
                smells.push(Smell::FileExcess {
                    file: file.clone(),
                    metric: "DEPENDENCY_COUNT",
                    value: m.imports_count,
                    threshold: self.config.dependency_count_threshold,
                    penalty: (i64::from(m.imports_count) - i64::from(self.config.dependency_count_threshold))
                        * self.config.per_unit_weight,
                });
            }
        }

        let score: i64 = smells.iter().map(Smell::penalty).sum();
        let traffic_light = if score < self.config.green_max {
            TrafficLight::Green
        } else if score < self.config.amber_max {
            TrafficLight::Amber
        } else {
            TrafficLight::Red
        };
        let blocked = traffic_light == TrafficLight::Red;

        let report = Report { smells, score, traffic_light, blocked };
        *self.last_report.lock().expect("report mutex poisoned") = Some(report.clone());
        report
    }

    /// GREEN allows, AMBER allows with a warning, RED blocks. Fail-open if
    /// no report has been produced yet (spec §4.3).
    pub fn check_deploy_gate(&self) -> DeployGateVerdict {
        let guard = self.last_report.lock().expect("report mutex poisoned");
        match guard.as_ref() {
            None => DeployGateVerdict { allowed: true, reason: None, traffic_light: None, score: None },
            Some(report) => match report.traffic_light {
                TrafficLight::Green => DeployGateVerdict {
                    allowed: true,
                    reason: None,
                    traffic_light: Some(TrafficLight::Green),
                    score: Some(report.score),
                },
                TrafficLight::Amber => DeployGateVerdict {
                    allowed: true,
                    reason: Some(format!("ATDI score {} is AMBER; proceeding with warning", report.score)),
                    traffic_light: Some(TrafficLight::Amber),
                    score: Some(report.score),
                },
                TrafficLight::Red => DeployGateVerdict {
                    allowed: false,
                    reason: Some(format!("ATDI score {} is RED; deploy blocked", report.score)),
                    traffic_light: Some(TrafficLight::Red),
                    score: Some(report.score),
                },
            },
        }
    }

    /// Iterative DFS with an explicit frame stack and path array, so large
    /// graphs don't exhaust the call stack (spec §4.3).
    fn find_all_cycles(graph: &HashMap<String, Vec<String>>) -> Vec<Vec<String>> {
        struct Frame<'a> {
            node: &'a str,
            children: std::slice::Iter<'a, String>,
        }

        let mut cycles = Vec::new();
        let mut visited: std::collections::HashSet<&str> = std::collections::HashSet::new();
        let empty: Vec<String> = Vec::new();

        let mut roots: Vec<&str> = graph.keys().map(String::as_str).collect();
        roots.sort_unstable();

        for root in roots {
            if visited.contains(root) {
                continue;
            }
            let mut path: Vec<&str> = Vec::new();
            let mut on_path: std::collections::HashSet<&str> = std::collections::HashSet::new();
            let mut stack: Vec<Frame> = vec![Frame {
                node: root,
                children: graph.get(root).unwrap_or(&empty).iter(),
            }];
            path.push(root);
            on_path.insert(root);
            visited.insert(root);

            while let Some(frame) = stack.last_mut() {
                if let Some(child) = frame.children.next() {
                    let child = child.as_str();
                    if on_path.contains(child) {
                        let start = path.iter().position(|n| *n == child).expect("child is on current path");
                        let cycle: Vec<String> = path[start..].iter().map(|s| (*s).to_string()).collect();
                        cycles.push(cycle);
                    } else if !visited.contains(child) {
                        visited.insert(child);
                        path.push(child);
                        on_path.insert(child);
                        stack.push(Frame { node: child, children: graph.get(child).unwrap_or(&empty).iter() });
                    }
                } else {
                    on_path.remove(frame.node);
                    path.pop();
                    stack.pop();
                }
            }
        }
        cycles
    }
}
