//! Distributed dispatch: resolve a capable worker, race the executor call
//! against a timeout, and fail over to another worker on exception or
//! timeout (spec §4.6, `DistributedDispatcher`).
//!
//! Grounded on `abathur::services::circuit_breaker`'s call-guarding idiom
//! (wrap an external call, observe outcome, mutate local state) and on the
//! teacher's `application::agent_executor` dispatch boundary; the failover
//! loop with worker exclusion is new per spec §4.6 step 5.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::domain::models::Task;
use crate::domain::ports::AgentExecutor;
use crate::services::load_balancer::LoadBalancer;
use crate::services::worker_registry::WorkerRegistry;

/// A single failover within one [`Dispatcher::dispatch`] call.
#[derive(Debug, Clone)]
pub struct FailoverEvent {
    pub from_worker_id: String,
    pub reason: String,
}

/// Result of a dispatch attempt (spec §4.6 step 6).
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub task_id: String,
    pub worker_id: Option<String>,
    pub outcome: Result<crate::domain::ports::DispatchOutcome, crate::domain::error::DispatchError>,
    pub failover: Vec<FailoverEvent>,
    pub failover_attempts: u32,
}

/// Configuration for the dispatch loop.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub default_dispatch_timeout_ms: u64,
    pub max_failover_attempts: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { default_dispatch_timeout_ms: 30_000, max_failover_attempts: 2 }
    }
}

/// Resolves, dispatches, and fails over across the worker pool (spec §4.6).
pub struct Dispatcher {
    config: DispatcherConfig,
    registry: Arc<WorkerRegistry>,
    balancer: Arc<LoadBalancer>,
    executor: Arc<dyn AgentExecutor>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        registry: Arc<WorkerRegistry>,
        balancer: Arc<LoadBalancer>,
        executor: Arc<dyn AgentExecutor>,
    ) -> Self {
        Self { config, registry, balancer, executor }
    }

    pub async fn dispatch(&self, task: &Task) -> DispatchReport {
        let mut excluded: HashSet<String> = HashSet::new();
        let mut failover_events = Vec::new();
        let mut failover_attempts = 0u32;

        loop {
            let available = self.registry.available_workers().await;
            let capable_ids: HashSet<String> =
                self.registry.capable_workers(task.kind).await.into_iter().map(|w| w.id).collect();
            let candidates: Vec<_> = available
                .into_iter()
                .filter(|w| capable_ids.contains(&w.id) && !excluded.contains(&w.id))
                .collect();

            let Some(worker) = self.balancer.select(&candidates, Some(task.kind)).cloned() else {
                let outcome = Err(crate::domain::error::DispatchError::NoAvailableWorker {
                    task_id: task.id.clone(),
                    task_kind: task.kind.to_string(),
                });
                return DispatchReport {
                    task_id: task.id.clone(),
                    worker_id: None,
                    outcome,
                    failover: failover_events,
                    failover_attempts,
                };
            };

            if self.registry.task_started(&worker.id).await.is_err() {
                excluded.insert(worker.id.clone());
                continue;
            }

            let call = self.executor.execute(task);
            let timed = tokio::time::timeout(Duration::from_millis(self.config.default_dispatch_timeout_ms), call).await;

            match timed {
                Ok(Ok(dispatch_outcome)) => {
                    let _ = self.registry.task_completed(&worker.id).await;
                    return DispatchReport {
                        task_id: task.id.clone(),
                        worker_id: Some(worker.id),
                        outcome: Ok(dispatch_outcome),
                        failover: failover_events,
                        failover_attempts,
                    };
                }
                Ok(Err(message)) => {
                    let _ = self.registry.task_completed(&worker.id).await;
                    warn!(task_id = %task.id, worker_id = %worker.id, %message, "dispatch raised, considering failover");
                    if failover_attempts >= self.config.max_failover_attempts {
                        let outcome = Err(crate::domain::error::DispatchError::ExecutorException {
                            task_id: task.id.clone(),
                            message,
                        });
                        return DispatchReport {
                            task_id: task.id.clone(),
                            worker_id: Some(worker.id),
                            outcome,
                            failover: failover_events,
                            failover_attempts,
                        };
                    }
                    failover_events.push(FailoverEvent { from_worker_id: worker.id.clone(), reason: message });
                    failover_attempts += 1;
                    excluded.insert(worker.id);
                }
                Err(_elapsed) => {
                    let _ = self.registry.task_completed(&worker.id).await;
                    warn!(task_id = %task.id, worker_id = %worker.id, "dispatch timed out, considering failover");
                    if failover_attempts >= self.config.max_failover_attempts {
                        let outcome = Err(crate::domain::error::DispatchError::Timeout {
                            task_id: task.id.clone(),
                            worker_id: worker.id.clone(),
                        });
                        return DispatchReport {
                            task_id: task.id.clone(),
                            worker_id: Some(worker.id),
                            outcome,
                            failover: failover_events,
                            failover_attempts,
                        };
                    }
                    failover_events.push(FailoverEvent { from_worker_id: worker.id.clone(), reason: "timeout".to_string() });
                    failover_attempts += 1;
                    excluded.insert(worker.id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{TaskKind, TaskResult};
    use crate::domain::ports::DispatchOutcome;
    use async_trait::async_trait;
    use std::collections::HashSet as StdHashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyThenOk {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AgentExecutor for FlakyThenOk {
        async fn execute(&self, task: &Task) -> Result<DispatchOutcome, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err("simulated crash".to_string())
            } else {
                Ok(DispatchOutcome::simple(TaskResult::success("ok", 1)))
            }
        }
    }

    #[tokio::test]
    async fn fails_over_to_second_worker_after_exception() {
        let registry = Arc::new(WorkerRegistry::with_defaults());
        registry.register("w1", StdHashSet::from([TaskKind::Code]), 1).await;
        registry.register("w2", StdHashSet::from([TaskKind::Code]), 1).await;
        let balancer = Arc::new(LoadBalancer::new(crate::services::load_balancer::BalancingStrategy::LeastLoaded));
        let executor = Arc::new(FlakyThenOk { calls: AtomicUsize::new(0) });
        let dispatcher = Dispatcher::new(DispatcherConfig::default(), registry, balancer, executor);

        let task = Task::new("t1", TaskKind::Code, "builder");
        let report = dispatcher.dispatch(&task).await;
        assert!(report.outcome.is_ok());
        assert_eq!(report.failover_attempts, 1);
        assert_eq!(report.failover.len(), 1);
    }

    struct NeverAvailable;

    #[async_trait]
    impl AgentExecutor for NeverAvailable {
        async fn execute(&self, _task: &Task) -> Result<DispatchOutcome, String> {
            unreachable!("no worker should ever be selected")
        }
    }

    #[tokio::test]
    async fn no_capable_worker_yields_no_available_worker_error() {
        let registry = Arc::new(WorkerRegistry::with_defaults());
        let balancer = Arc::new(LoadBalancer::new(crate::services::load_balancer::BalancingStrategy::LeastLoaded));
        let executor = Arc::new(NeverAvailable);
        let dispatcher = Dispatcher::new(DispatcherConfig::default(), registry, balancer, executor);

        let task = Task::new("t1", TaskKind::Code, "builder");
        let report = dispatcher.dispatch(&task).await;
        assert!(matches!(
            report.outcome,
            Err(crate::domain::error::DispatchError::NoAvailableWorker { .. })
        ));
    }
}
