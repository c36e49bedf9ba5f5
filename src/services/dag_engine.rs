//! The scheduler proper: ties every other service into the tick-based
//! execution loop that drives a task graph from submission to all-terminal
//! (spec §4.1, "DAG Scheduler & Task State Machine", C12).
//!
//! Grounded on `abathur::services::orchestrator`'s tick/poll-loop shape
//! (validate once, then loop: advance readiness, dispatch available slots,
//! await completions, check termination), replacing its fixed pipeline
//! stages with the spec's generic DAG walk plus dynamic mutation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::domain::error::{PolicyDenialError, StructuralError};
use crate::domain::models::{
    Graph, Outcome, RoleTable, FEATURE_ID_KEY, RETRY_FEEDBACK_KEY, Task, TaskKind, TaskResult, TaskStatus,
};
use crate::domain::ports::{AgentExecutor, OutboundMessage, SpawnRequest};
use crate::services::checkpoint_manager::CheckpointManager;
use crate::services::dispatcher::Dispatcher;
use crate::services::drift_gate::DriftGate;
use crate::services::failure_detector::{Classification, FailureDetector};
use crate::services::healing_engine::{HealingEngine, HealingExecutor};
use crate::services::message_bus::MessageBus;
use crate::services::mutation_controller::MutationController;
use crate::services::outcome_tracker::OutcomeTracker;
use crate::services::quality_gate::QualityGate;
use crate::services::retry_policy::{RetryDecision, RetryPolicy};
use crate::services::security_gate::SecurityGate;

/// [`HealingExecutor`] backed by the capabilities [`Engine::run_task`]
/// actually has: a redispatch through the normal retry path. Only the
/// ladder actions that map onto a plain redispatch ever report success;
/// REROUTE/SCALE_DOWN/SKIP_DEPENDENCY have no concrete implementation here
/// and fall through to the next ladder entry or escalation (spec §4.7).
struct RedispatchExecutor;

impl HealingExecutor for RedispatchExecutor {
    fn attempt(&self, _task_id: &str, action: crate::services::healing_engine::HealingAction, _classification: Classification) -> bool {
        use crate::services::healing_engine::HealingAction::*;
        matches!(action, Restart | RetryWithBackoff)
    }
}

/// Reserved message-payload key stamping the task that emitted a bus
/// message (spec §4.1, "publish messages stamped with the source task").
pub const SOURCE_TASK_ID_KEY: &str = "_sourceTaskId";

/// Tunables for one [`Engine::execute`] run (spec §4.1 / §5).
#[derive(Debug, Clone, Copy)]
pub struct ExecutionConfig {
    pub max_concurrency: usize,
    pub tick_interval_ms: u64,
    pub max_execution_time_ms: u64,
    pub enforce_security_gate: bool,
    pub allow_reactive_mutation: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            tick_interval_ms: 200,
            max_execution_time_ms: 30 * 60 * 1_000,
            enforce_security_gate: true,
            allow_reactive_mutation: true,
        }
    }
}

/// Why [`Engine::execute`] stopped looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Every task reached a terminal status.
    AllTerminal,
    /// `maxExecutionTimeMs` was exceeded; non-terminal tasks were failed
    /// with a synthetic timeout result (spec §5).
    TimedOut,
    /// The graph-wide circuit breaker tripped; non-terminal tasks were
    /// skipped (spec §4.1, "circuit breaker opens").
    CircuitBroken,
    /// Nothing was READY and nothing was RUNNING, yet the graph was not
    /// all-terminal — a scheduling deadlock that should be unreachable for
    /// a graph that passed [`Graph::validate`].
    Stalled,
}

/// What a completed [`Engine::execute`] run produced.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub graph: Graph,
    pub execution_order: Vec<String>,
    pub total_retries: u64,
    pub total_spawned: u64,
    pub outcome: ExecutionOutcome,
    pub elapsed_ms: u64,
    pub last_checkpoint_id: Option<String>,
}

/// Result of driving one task to a terminal status, including whatever
/// retries happened along the way (spec §4.1, "Per-task execution
/// protocol").
struct TaskRun {
    task_id: String,
    final_status: TaskStatus,
    result: TaskResult,
    retry_count: u32,
    spawn_requests: Vec<SpawnRequest>,
    messages: Vec<OutboundMessage>,
    circuit_tripped: bool,
}

/// Orchestrates C1-C11 into the scheduler loop described by spec §4.1.
pub struct Engine {
    config: ExecutionConfig,
    dispatcher: Arc<Dispatcher>,
    retry_policy: Arc<AsyncMutex<RetryPolicy>>,
    security_gate: Option<Arc<SecurityGate>>,
    drift_gate: Option<Arc<DriftGate>>,
    quality_gate: Option<Arc<QualityGate>>,
    failure_detector: Option<Arc<FailureDetector>>,
    healing_engine: Option<Arc<HealingEngine>>,
    outcome_tracker: Option<Arc<OutcomeTracker>>,
    bus: Arc<MessageBus>,
    checkpoint_manager: Option<Arc<CheckpointManager>>,
    mutation_controller: MutationController,
    roles: RoleTable,
}

impl Engine {
    /// `drift_gate`/`quality_gate` are the pre-dispatch gates from spec
    /// §4.3/§4.4 (quality is only consulted for DEPLOY tasks);
    /// `failure_detector`/`healing_engine` are the post-failure
    /// classify-then-heal pair from spec §4.7; `outcome_tracker` records
    /// every terminal run for the learning subsystem (spec §4.8). All five
    /// are optional and a `None` reproduces the old unwired behaviour.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ExecutionConfig,
        dispatcher: Arc<Dispatcher>,
        retry_policy: RetryPolicy,
        security_gate: Option<Arc<SecurityGate>>,
        drift_gate: Option<Arc<DriftGate>>,
        quality_gate: Option<Arc<QualityGate>>,
        failure_detector: Option<Arc<FailureDetector>>,
        healing_engine: Option<Arc<HealingEngine>>,
        outcome_tracker: Option<Arc<OutcomeTracker>>,
        bus: Arc<MessageBus>,
        checkpoint_manager: Option<Arc<CheckpointManager>>,
        mutation_controller: MutationController,
        roles: RoleTable,
    ) -> Self {
        Self {
            config,
            dispatcher,
            retry_policy: Arc::new(AsyncMutex::new(retry_policy)),
            security_gate,
            drift_gate,
            quality_gate,
            failure_detector,
            healing_engine,
            outcome_tracker,
            bus,
            checkpoint_manager,
            mutation_controller,
            roles,
        }
    }

    /// Runs `graph` to completion (spec §4.1).
    ///
    /// Graph validation happens once, up front: a structurally invalid
    /// graph is a hard failure with no retries and no partial run (spec
    /// §4.1, "Graph validation").
    pub async fn execute(&self, mut graph: Graph) -> Result<ExecutionResult, StructuralError> {
        graph.validate()?;

        let started = std::time::Instant::now();
        let mut execution_order = Vec::new();
        let mut total_retries = 0u64;
        let mut total_spawned = 0u64;
        let mut last_checkpoint_id = None;
        let mut running: HashSet<String> = HashSet::new();
        let mut join_set: JoinSet<TaskRun> = JoinSet::new();

        let outcome = loop {
            if graph.all_terminal() {
                break ExecutionOutcome::AllTerminal;
            }
            if started.elapsed().as_millis() as u64 >= self.config.max_execution_time_ms {
                self.fail_non_terminal_with_timeout(&mut graph);
                break ExecutionOutcome::TimedOut;
            }
            if self.retry_policy.lock().await.is_circuit_open() {
                self.skip_non_terminal(&mut graph);
                break ExecutionOutcome::CircuitBroken;
            }

            graph.update_ready_and_skipped();

            let ready: Vec<String> =
                graph.ready_in_order().into_iter().filter(|id| !running.contains(id)).collect();
            let available_slots = self.config.max_concurrency.saturating_sub(running.len());

            for id in ready.into_iter().take(available_slots) {
                let task = graph.get(&id).expect("ready id exists in graph").clone();
                graph.get_mut(&id).expect("ready id exists in graph").set_status(TaskStatus::Running).ok();
                running.insert(id.clone());

                let dispatcher = self.dispatcher.clone();
                let retry_policy = self.retry_policy.clone();
                let security_gate = self.security_gate.clone();
                let drift_gate = self.drift_gate.clone();
                let quality_gate = self.quality_gate.clone();
                let failure_detector = self.failure_detector.clone();
                let healing_engine = self.healing_engine.clone();
                join_set.spawn(Self::run_task(
                    task,
                    dispatcher,
                    retry_policy,
                    security_gate,
                    drift_gate,
                    quality_gate,
                    failure_detector,
                    healing_engine,
                ));
            }

            if running.is_empty() {
                if graph.all_terminal() {
                    break ExecutionOutcome::AllTerminal;
                }
                break ExecutionOutcome::Stalled;
            }

            tokio::select! {
                Some(joined) = join_set.join_next() => {
                    match joined {
                        Ok(run) => {
                            running.remove(&run.task_id);
                            total_retries += run.retry_count as u64;
                            let spawned = self
                                .apply_task_run(&mut graph, run, &mut execution_order)
                                .await;
                            total_spawned += spawned;
                        }
                        Err(join_error) => {
                            warn!(%join_error, "task run panicked");
                        }
                    }
                    if let Some(manager) = &self.checkpoint_manager {
                        if manager.notify_task_completed() {
                            let checkpoint = manager.save(
                                &graph,
                                execution_order.clone(),
                                total_retries,
                                total_spawned,
                                &[],
                                &[],
                                started.elapsed().as_millis() as u64,
                                None,
                                None,
                            );
                            last_checkpoint_id = Some(checkpoint.snapshot.id);
                        }
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(self.config.tick_interval_ms)) => {}
            }
        };

        // Graceful drain: let whatever was already in flight finish rather
        // than abandoning it mid-call (spec §4.1, "graceful drain").
        while let Some(joined) = join_set.join_next().await {
            if let Ok(run) = joined {
                running.remove(&run.task_id);
                total_retries += run.retry_count as u64;
                total_spawned += self.apply_task_run(&mut graph, run, &mut execution_order).await;
            }
        }

        Ok(ExecutionResult {
            graph,
            execution_order,
            total_retries,
            total_spawned,
            outcome,
            elapsed_ms: started.elapsed().as_millis() as u64,
            last_checkpoint_id,
        })
    }

    fn fail_non_terminal_with_timeout(&self, graph: &mut Graph) {
        for id in graph.non_terminal_ids() {
            if let Some(task) = graph.get_mut(&id) {
                task.result = Some(TaskResult::synthetic_timeout());
                let _ = task.set_status(TaskStatus::Failed);
            }
        }
    }

    fn skip_non_terminal(&self, graph: &mut Graph) {
        for id in graph.non_terminal_ids() {
            if let Some(task) = graph.get_mut(&id) {
                let _ = task.set_status(TaskStatus::Skipped);
            }
        }
    }

    /// Runs the gate chain (security, drift, quality-for-deploys), then the
    /// dispatcher, classifying and healing each failure before consulting
    /// [`RetryPolicy`], until the task reaches COMPLETED or exhausts its
    /// retry budget (spec §4.1, "Per-task execution protocol"; §4.3/§4.4;
    /// §4.7).
    #[allow(clippy::too_many_arguments)]
    async fn run_task(
        mut task: Task,
        dispatcher: Arc<Dispatcher>,
        retry_policy: Arc<AsyncMutex<RetryPolicy>>,
        security_gate: Option<Arc<SecurityGate>>,
        drift_gate: Option<Arc<DriftGate>>,
        quality_gate: Option<Arc<QualityGate>>,
        failure_detector: Option<Arc<FailureDetector>>,
        healing_engine: Option<Arc<HealingEngine>>,
    ) -> TaskRun {
        loop {
            if let Some(gate) = &security_gate {
                let command = task.payload.get("command").and_then(Value::as_str);
                let verdict = gate.check(&task.agent_hint, task.kind, &task.payload, command);
                if !verdict.allowed {
                    let denial = PolicyDenialError::RbacDenied {
                        role: task.agent_hint.clone(),
                        task_kind: task.kind.to_string(),
                    };
                    let result = TaskResult::failure(1, verdict.reason.unwrap_or_else(|| denial.to_string()), 0);
                    let tripped = retry_policy.lock().await.record_failure();
                    return TaskRun {
                        task_id: task.id,
                        final_status: TaskStatus::Failed,
                        result,
                        retry_count: task.retry_count,
                        spawn_requests: Vec::new(),
                        messages: Vec::new(),
                        circuit_tripped: tripped,
                    };
                }
            }

            if let Some(gate) = &drift_gate {
                if let Some(feature_id) = task.payload.get(FEATURE_ID_KEY).and_then(Value::as_str) {
                    let feature_id = feature_id.to_string();
                    let verdict = gate.check_task_gate(&feature_id, task.kind);
                    if !verdict.allowed {
                        let denial = PolicyDenialError::SpecDrift {
                            feature_id: feature_id.clone(),
                            reason: verdict.reason.clone().unwrap_or_default(),
                        };
                        let result = TaskResult::failure(1, verdict.reason.unwrap_or_else(|| denial.to_string()), 0);
                        let tripped = retry_policy.lock().await.record_failure();
                        return TaskRun {
                            task_id: task.id,
                            final_status: TaskStatus::Failed,
                            result,
                            retry_count: task.retry_count,
                            spawn_requests: Vec::new(),
                            messages: Vec::new(),
                            circuit_tripped: tripped,
                        };
                    }
                }
            }

            if task.kind == TaskKind::Deploy {
                if let Some(gate) = &quality_gate {
                    let verdict = gate.check_deploy_gate();
                    if !verdict.allowed {
                        let denial = PolicyDenialError::QualityRed { score: verdict.score.unwrap_or_default() };
                        let result = TaskResult::failure(1, verdict.reason.unwrap_or_else(|| denial.to_string()), 0);
                        let tripped = retry_policy.lock().await.record_failure();
                        return TaskRun {
                            task_id: task.id,
                            final_status: TaskStatus::Failed,
                            result,
                            retry_count: task.retry_count,
                            spawn_requests: Vec::new(),
                            messages: Vec::new(),
                            circuit_tripped: tripped,
                        };
                    }
                }
            }

            let report = dispatcher.dispatch(&task).await;
            match report.outcome {
                Ok(outcome) if outcome.result.is_success() => {
                    retry_policy.lock().await.record_success();
                    return TaskRun {
                        task_id: task.id,
                        final_status: TaskStatus::Completed,
                        result: outcome.result,
                        retry_count: task.retry_count,
                        spawn_requests: outcome.spawn_requests,
                        messages: outcome.messages,
                        circuit_tripped: false,
                    };
                }
                Ok(outcome) => {
                    let stderr = outcome.result.stderr.clone();
                    let may_retry = Self::classify_and_heal(&task, &outcome.result, &failure_detector, &healing_engine);
                    if may_retry && Self::retry_or_fail(&mut task, &retry_policy, stderr).await {
                        continue;
                    }
                    let tripped = retry_policy.lock().await.record_failure();
                    return TaskRun {
                        task_id: task.id,
                        final_status: TaskStatus::Failed,
                        result: outcome.result,
                        retry_count: task.retry_count,
                        spawn_requests: Vec::new(),
                        messages: Vec::new(),
                        circuit_tripped: tripped,
                    };
                }
                Err(dispatch_error) => {
                    let message = dispatch_error.to_string();
                    let synthetic = TaskResult::failure(1, message.clone(), 0);
                    let may_retry = Self::classify_and_heal(&task, &synthetic, &failure_detector, &healing_engine);
                    if may_retry && Self::retry_or_fail(&mut task, &retry_policy, message).await {
                        continue;
                    }
                    let tripped = retry_policy.lock().await.record_failure();
                    return TaskRun {
                        task_id: task.id,
                        final_status: TaskStatus::Failed,
                        result: synthetic,
                        retry_count: task.retry_count,
                        spawn_requests: Vec::new(),
                        messages: Vec::new(),
                        circuit_tripped: tripped,
                    };
                }
            }
        }
    }

    /// Classifies a failure and runs it through the healing ladder; returns
    /// `false` only when healing actively escalated (critical kind, low
    /// confidence, or attempts exhausted) — the caller must fail the task
    /// without consulting [`RetryPolicy`]. Unconfigured (`None`) always
    /// returns `true`, preserving the plain-retry behaviour (spec §4.7).
    fn classify_and_heal(
        task: &Task,
        result: &TaskResult,
        failure_detector: &Option<Arc<FailureDetector>>,
        healing_engine: &Option<Arc<HealingEngine>>,
    ) -> bool {
        let (Some(detector), Some(engine)) = (failure_detector, healing_engine) else {
            return true;
        };
        let classification = detector.classify(result, Some(result.duration_ms));
        engine.heal(&task.id, task.kind, classification, &RedispatchExecutor).healed
    }

    /// Consults [`RetryPolicy`], injects feedback, and sleeps the backoff
    /// when a retry is due; returns `true` if `task` should be redispatched
    /// (spec §4.1, "Feedback injection on retry").
    async fn retry_or_fail(task: &mut Task, retry_policy: &Arc<AsyncMutex<RetryPolicy>>, stderr: String) -> bool {
        let decision = retry_policy.lock().await.should_retry(task.kind, task.retry_count);
        match decision {
            RetryDecision::Retry { backoff } => {
                let feedback = serde_json::json!({
                    "attempt": task.retry_count + 1,
                    "previousStderr": stderr,
                });
                task.payload.insert(RETRY_FEEDBACK_KEY.to_string(), feedback);
                task.retry_count += 1;
                tokio::time::sleep(backoff).await;
                true
            }
            RetryDecision::Exhausted => false,
        }
    }

    /// Applies a finished [`TaskRun`] to the live graph: records the
    /// terminal status, publishes outbound messages, validates and
    /// materialises spawn requests, and synthesises reactive children on
    /// AUDIT/REVIEW failure (spec §4.1).
    async fn apply_task_run(&self, graph: &mut Graph, run: TaskRun, execution_order: &mut Vec<String>) -> u64 {
        let TaskRun { task_id, final_status, result, retry_count, spawn_requests, messages, circuit_tripped } = run;
        if circuit_tripped {
            warn!(%task_id, "circuit breaker tripped by this task's failure");
        }

        let parent = {
            let Some(task) = graph.get_mut(&task_id) else { return 0 };
            task.retry_count = retry_count;
            task.result = Some(result.clone());
            if task.set_status(final_status).is_err() {
                warn!(%task_id, "attempted to re-terminate an already-terminal task");
            }
            task.clone()
        };

        if let Some(tracker) = &self.outcome_tracker {
            let error_pattern = (final_status == TaskStatus::Failed)
                .then(|| self.failure_detector.as_ref().map(|d| d.classify(&result, Some(result.duration_ms)).category.as_str().to_string()))
                .flatten();
            tracker.record(Outcome {
                agent_id: parent.agent_hint.clone(),
                role: parent.agent_hint.clone(),
                task_kind: parent.kind,
                task_id: task_id.clone(),
                success: final_status == TaskStatus::Completed,
                exit_code: result.exit_code,
                duration_ms: result.duration_ms,
                retry_count,
                depth: parent.depth,
                error_pattern,
                timestamp: chrono::Utc::now(),
            });
        }

        if final_status != TaskStatus::Completed {
            if final_status == TaskStatus::Failed
                && self.config.allow_reactive_mutation
                && matches!(parent.kind, TaskKind::Audit | TaskKind::Review)
            {
                return self.spawn_reactive_children(graph, &parent, &result.stderr);
            }
            return 0;
        }

        info!(task_id = %task_id, "task completed");
        execution_order.push(task_id.clone());

        for message in messages {
            let mut payload = message.payload;
            if let Value::Object(map) = &mut payload {
                map.insert(SOURCE_TASK_ID_KEY.to_string(), Value::String(task_id.clone()));
            }
            self.bus.publish(message.topic, task_id.clone(), parent.agent_hint.clone(), payload, None).await;
        }

        let mut spawned = 0u64;
        for request in spawn_requests {
            match self
                .mutation_controller
                .validate(graph, &parent, &request, &request.agent_hint, &self.roles)
            {
                Ok(child) => {
                    if graph.insert(child).is_ok() {
                        spawned += 1;
                    }
                }
                Err(reason) => {
                    warn!(task_id = %request.id, ?reason, "spawn request rejected");
                }
            }
        }
        spawned
    }

    fn spawn_reactive_children(&self, graph: &mut Graph, parent: &Task, rejection_reason: &str) -> u64 {
        let (research, plan) = MutationController::reactive_children(parent, rejection_reason);
        let mut spawned = 0u64;
        if graph.would_remain_acyclic_with(&research) && graph.insert(research.clone()).is_ok() {
            spawned += 1;
        }
        if graph.contains(&research.id) && graph.would_remain_acyclic_with(&plan) && graph.insert(plan).is_ok() {
            spawned += 1;
        }
        spawned
    }
}
