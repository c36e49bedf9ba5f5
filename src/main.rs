//! Castellan CLI entry point: loads a task graph from a JSON/YAML file and
//! runs it to completion against a small local worker pool.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use castellan::domain::models::{Graph, RoleTable, Task, TaskKind};
use castellan::infrastructure::{ConfigLoader, ShellAgentExecutor};
use castellan::services::{
    CheckpointManager, Dispatcher, DriftGate, Engine, FailureDetector, HealingEngine, LoadBalancer,
    MessageBus, MutationController, OutcomeTracker, QualityGate, SecurityGate, WorkerRegistry,
};
use castellan::services::dag_engine::ExecutionOutcome;
use castellan::services::load_balancer::BalancingStrategy;
use clap::Parser;
use comfy_table::{presets, Attribute, Cell, ContentArrangement, Table};
use regex::Regex;
use serde::Deserialize;

/// A task as it appears in an input graph file, before it's promoted to a
/// [`Task`] with full scheduler bookkeeping.
#[derive(Debug, Deserialize)]
struct TaskSpec {
    id: String,
    kind: TaskKind,
    agent_hint: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    payload: BTreeMap<String, serde_json::Value>,
}

#[derive(Parser, Debug)]
#[command(name = "castellan", about = "Run a task graph through the governed DAG orchestrator")]
struct Cli {
    /// Path to a JSON or YAML task graph (a list of task specs).
    graph: PathBuf,

    /// Number of local shell-capable workers to register.
    #[arg(long, default_value_t = 4)]
    workers: u32,
}

fn load_graph(path: &PathBuf) -> Result<Graph> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let specs: Vec<TaskSpec> = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&text).context("parsing YAML task graph")?,
        _ => serde_json::from_str(&text).context("parsing JSON task graph")?,
    };
    if specs.is_empty() {
        bail!("task graph {} is empty", path.display());
    }

    let mut graph = Graph::new();
    for spec in specs {
        let task = Task::new(spec.id, spec.kind, spec.agent_hint)
            .with_dependencies(spec.dependencies)
            .with_payload(spec.payload);
        graph.insert(task).with_context(|| "duplicate task id in input graph".to_string())?;
    }
    Ok(graph)
}

fn print_results(graph: &Graph, execution_order: &[String], outcome: ExecutionOutcome, elapsed_ms: u64) {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL).set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").add_attribute(Attribute::Bold),
        Cell::new("Kind").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Exit").add_attribute(Attribute::Bold),
        Cell::new("Duration (ms)").add_attribute(Attribute::Bold),
    ]);

    for id in graph.iter_order() {
        let Some(task) = graph.get(id) else { continue };
        let (exit, duration) = task
            .result
            .as_ref()
            .map(|r| (r.exit_code.to_string(), r.duration_ms.to_string()))
            .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
        table.add_row(vec![task.id.clone(), task.kind.to_string(), task.status.to_string(), exit, duration]);
    }

    println!("{table}");
    println!("execution order: {}", execution_order.join(" -> "));
    println!("outcome: {outcome:?} ({elapsed_ms}ms elapsed)");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = ConfigLoader::load().unwrap_or_default();
    ConfigLoader::validate(&settings).context("invalid configuration")?;
    let _logger_guard = castellan::infrastructure::logging::init(&settings.logging)
        .map_err(anyhow::Error::msg)
        .context("failed to initialise logging")?;

    let graph = load_graph(&cli.graph)?;

    let registry = Arc::new(WorkerRegistry::with_defaults());
    let all_kinds = HashSet::from([
        TaskKind::Plan,
        TaskKind::Code,
        TaskKind::Audit,
        TaskKind::Test,
        TaskKind::Review,
        TaskKind::Deploy,
        TaskKind::Research,
        TaskKind::Design,
        TaskKind::InfraProvision,
        TaskKind::Shell,
    ]);
    for i in 0..cli.workers {
        registry.register(format!("worker-{i}"), all_kinds.clone(), 4).await;
    }

    let balancer = Arc::new(LoadBalancer::new(BalancingStrategy::LeastLoaded));
    let dispatcher = Arc::new(Dispatcher::new(Default::default(), registry, balancer, Arc::new(ShellAgentExecutor)));

    let roles = RoleTable::default_roles();
    let command_whitelist = vec![Regex::new(r"^(echo|ls|cat|pwd)\b").expect("static whitelist pattern is valid")];
    let security_gate =
        if settings.enforce_security_gate { Some(Arc::new(SecurityGate::new(roles.clone(), command_whitelist))) } else { None };
    let drift_gate = if settings.enforce_drift_gate { Some(Arc::new(DriftGate::new(true))) } else { None };
    let quality_gate = if settings.enforce_quality_gate { Some(Arc::new(QualityGate::with_defaults())) } else { None };
    let (failure_detector, healing_engine) = if settings.enable_self_healing {
        (Some(Arc::new(FailureDetector::default())), Some(Arc::new(HealingEngine::with_defaults())))
    } else {
        (None, None)
    };
    let outcome_tracker = Some(Arc::new(OutcomeTracker::with_defaults()));

    let bus = Arc::new(MessageBus::new(Default::default()));
    let checkpoint_manager = Arc::new(CheckpointManager::new(settings.checkpoint_config()));
    let mutation_controller = MutationController::new(settings.mutation_limits());

    let engine = Engine::new(
        settings.execution_config(),
        dispatcher,
        castellan::services::RetryPolicy::with_defaults(),
        security_gate,
        drift_gate,
        quality_gate,
        failure_detector,
        healing_engine,
        outcome_tracker,
        bus,
        Some(checkpoint_manager),
        mutation_controller,
        roles,
    );

    let result = engine.execute(graph).await.context("graph failed structural validation")?;
    print_results(&result.graph, &result.execution_order, result.outcome, result.elapsed_ms);

    if result.graph.tasks().any(|t| t.status == castellan::domain::models::TaskStatus::Failed) {
        std::process::exit(1);
    }
    Ok(())
}
