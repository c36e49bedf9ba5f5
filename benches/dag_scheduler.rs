//! Scheduler benchmarks: graph-structural checks at increasing scale, and
//! end-to-end `Engine::execute` throughput under a no-op executor.
//!
//! Grounded on the benchmark-group/`BenchmarkId`/`Throughput` conventions in
//! `seanchatmangpt-knhk`'s `benches/compilation_benchmarks.rs`; the
//! scheduler/engine plumbing under test is `castellan::services::dag_engine`
//! and `castellan::domain::models::graph`.

use std::collections::HashSet as StdHashSet;
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use castellan::domain::models::{Graph, RoleTable, Task, TaskKind, TaskResult};
use castellan::domain::ports::{AgentExecutor, DispatchOutcome};
use castellan::services::dag_engine::ExecutionConfig;
use castellan::services::load_balancer::BalancingStrategy;
use castellan::services::{
    Dispatcher, Engine, LoadBalancer, MessageBus, MutationController, RetryPolicy, WorkerRegistry,
};

fn chain_graph(size: usize) -> Graph {
    let mut graph = Graph::new();
    for i in 0..size {
        let deps: Vec<String> = if i == 0 { vec![] } else { vec![format!("t{}", i - 1)] };
        graph
            .insert(Task::new(format!("t{i}"), TaskKind::Code, "builder").with_dependencies(deps))
            .unwrap();
    }
    graph
}

fn wide_graph(size: usize) -> Graph {
    let mut graph = Graph::new();
    graph.insert(Task::new("root", TaskKind::Code, "builder")).unwrap();
    for i in 0..size {
        graph
            .insert(Task::new(format!("t{i}"), TaskKind::Code, "builder").with_dependencies(["root"]))
            .unwrap();
    }
    graph
}

fn bench_graph_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_validate");
    for size in [10, 100, 1000].iter() {
        let chain = chain_graph(*size);
        let wide = wide_graph(*size);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("chain", size), &chain, |b, g| {
            b.iter(|| black_box(g.validate()).is_ok());
        });
        group.bench_with_input(BenchmarkId::new("wide", size), &wide, |b, g| {
            b.iter(|| black_box(g.validate()).is_ok());
        });
    }
    group.finish();
}

fn bench_find_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_find_cycle");
    for size in [10, 100, 1000].iter() {
        let chain = chain_graph(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &chain, |b, g| {
            b.iter(|| black_box(g.find_cycle()));
        });
    }
    group.finish();
}

fn bench_ready_and_skipped_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_ready_and_skipped_cascade");
    for size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_batched(
                || chain_graph(size),
                |mut g| {
                    black_box(g.update_ready_and_skipped());
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

struct NoOpExecutor;

#[async_trait]
impl AgentExecutor for NoOpExecutor {
    async fn execute(&self, _task: &Task) -> Result<DispatchOutcome, String> {
        Ok(DispatchOutcome::simple(TaskResult::success("ok", 0)))
    }
}

fn bench_engine_execute(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("engine_execute");

    for size in [10, 50, 200].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.to_async(&rt).iter_batched(
                || wide_graph(size),
                |graph| async {
                    let registry = Arc::new(WorkerRegistry::with_defaults());
                    registry
                        .register("w1", StdHashSet::from([TaskKind::Code]), size as u32 + 1)
                        .await;
                    let balancer = Arc::new(LoadBalancer::new(BalancingStrategy::LeastLoaded));
                    let executor: Arc<dyn AgentExecutor> = Arc::new(NoOpExecutor);
                    let dispatcher = Arc::new(Dispatcher::new(Default::default(), registry, balancer, executor));
                    let bus = Arc::new(MessageBus::new(Default::default()));
                    let engine = Engine::new(
                        ExecutionConfig {
                            enforce_security_gate: false,
                            tick_interval_ms: 1,
                            max_concurrency: size + 1,
                            ..ExecutionConfig::default()
                        },
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
                    black_box(engine.execute(graph).await.unwrap());
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    dag_scheduler_benches,
    bench_graph_validate,
    bench_find_cycle,
    bench_ready_and_skipped_cascade,
    bench_engine_execute
);
criterion_main!(dag_scheduler_benches);
