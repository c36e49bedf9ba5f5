//! Property test for the scheduler's concurrency bound (P4): the number
//! of tasks RUNNING at any instant never exceeds `maxConcurrency`.

use std::collections::HashSet as StdHashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use castellan::domain::models::{Graph, RoleTable, Task, TaskKind, TaskResult};
use castellan::domain::ports::{AgentExecutor, DispatchOutcome};
use castellan::services::dag_engine::ExecutionConfig;
use castellan::services::load_balancer::BalancingStrategy;
use castellan::services::{Dispatcher, Engine, LoadBalancer, MessageBus, MutationController, RetryPolicy, WorkerRegistry};
use proptest::prelude::*;

struct ConcurrencyTrackingExecutor {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl AgentExecutor for ConcurrencyTrackingExecutor {
    async fn execute(&self, _task: &Task) -> Result<DispatchOutcome, String> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(3)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(DispatchOutcome::simple(TaskResult::success("ok", 1)))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Property P4: with `task_count` independent, simultaneously-ready
    /// tasks and unlimited per-worker capacity, the observed peak number
    /// of concurrently-executing tasks never exceeds `max_concurrency`.
    #[test]
    fn prop_running_set_bounded_by_max_concurrency(
        task_count in 1usize..20,
        max_concurrency in 1usize..6,
    ) {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let executor: Arc<dyn AgentExecutor> =
            Arc::new(ConcurrencyTrackingExecutor { current: current.clone(), peak: peak.clone() });

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let registry = Arc::new(WorkerRegistry::with_defaults());
            // Ample worker-side capacity: any throttling observed below is
            // coming from the engine's maxConcurrency, not the worker.
            registry.register("w1", StdHashSet::from([TaskKind::Code]), task_count as u32).await;
            let balancer = Arc::new(LoadBalancer::new(BalancingStrategy::LeastLoaded));
            let dispatcher = Arc::new(Dispatcher::new(Default::default(), registry, balancer, executor));
            let bus = Arc::new(MessageBus::new(Default::default()));
            let engine = Engine::new(
                ExecutionConfig { enforce_security_gate: false, tick_interval_ms: 2, max_concurrency, ..ExecutionConfig::default() },
                dispatcher,
                RetryPolicy::with_defaults(),
                None,
                None,
                None,
                None,
                None,
                None,
                bus,
                None,
                MutationController::with_defaults(),
                RoleTable::default_roles(),
            );

            let mut graph = Graph::new();
            for i in 0..task_count {
                graph.insert(Task::new(format!("t{i}"), TaskKind::Code, "builder")).unwrap();
            }
            engine.execute(graph).await.unwrap();
        });

        prop_assert!(peak.load(Ordering::SeqCst) <= max_concurrency);
    }
}
