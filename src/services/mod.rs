//! Concrete services implementing the spec's C1-C12 component table.
//!
//! Each module owns one component; [`dag_engine::Engine`] (C12) is the
//! composition root that wires the rest together into a single execution
//! loop.

pub mod adaptation_engine;
pub mod auction_engine;
pub mod checkpoint_manager;
pub mod dag_engine;
pub mod dispatcher;
pub mod drift_gate;
pub mod failure_detector;
pub mod healing_engine;
pub mod load_balancer;
pub mod message_bus;
pub mod mutation_controller;
pub mod negotiation_engine;
pub mod outcome_tracker;
pub mod quality_gate;
pub mod replay;
pub mod retry_policy;
pub mod security_gate;
pub mod worker_registry;

pub use adaptation_engine::{AdaptationConfig, AdaptationEngine, Recommendation};
pub use auction_engine::AuctionEngine;
pub use checkpoint_manager::{CheckpointConfig, CheckpointManager, RestoreResult};
pub use dag_engine::{Engine, ExecutionConfig, ExecutionOutcome, ExecutionResult};
pub use dispatcher::{DispatchReport, Dispatcher, DispatcherConfig, FailoverEvent};
pub use drift_gate::{DriftGate, DriftStatus};
pub use failure_detector::{Classification, FailureCategory, FailureDetector};
pub use healing_engine::{HealingAction, HealingConfig, HealingEngine, HealingOutcome};
pub use load_balancer::{BalancingStrategy, LoadBalancer};
pub use message_bus::{AgentMailbox, Barrier, MessageBus, MessageBusConfig, SignalFlag};
pub use mutation_controller::{MutationController, MutationLimits};
pub use negotiation_engine::NegotiationEngine;
pub use outcome_tracker::{OutcomeTracker, Stats};
pub use quality_gate::{QualityGate, Report as QualityReport, TrafficLight};
pub use replay::{ExecutionReplay, ReplayEvent};
pub use retry_policy::{RetryDecision, RetryPolicy, RetryPolicyConfig};
pub use security_gate::{GateVerdict, SecurityGate};
pub use worker_registry::{HeartbeatConfig, WorkerRegistry};
