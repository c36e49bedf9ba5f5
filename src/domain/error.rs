//! Domain error types.
//!
//! Every error surfaced by the engine is a structured, `thiserror`-derived
//! enum rather than a raw propagated exception (spec §7, "Errors are
//! categorised, not propagated raw"). No uncaught error may leave the
//! scheduler task: callers always receive an `ExecutionResult`.

use thiserror::Error;

use crate::domain::models::{BidError, GraphError};

/// Structural errors: the graph itself is invalid (spec §7, "Structural").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Reasons a [`crate::domain::models::auction`]-style spawn request is
/// rejected by the mutation controller (spec §4.1).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnRejectReason {
    #[error("DEPTH_EXCEEDED")]
    DepthExceeded,
    #[error("GRAPH_SIZE_EXCEEDED")]
    GraphSizeExceeded,
    #[error("DUPLICATE_ID")]
    DuplicateId,
    #[error("MISSING_DEPENDENCY")]
    MissingDependency,
    #[error("CYCLE_DETECTED")]
    CycleDetected,
    #[error("RBAC_DENIED")]
    RbacDenied,
    #[error("RBAC_UNKNOWN_ROLE")]
    RbacUnknownRole,
}

/// Policy denial from a pre-dispatch gate (spec §7, "Policy denial").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyDenialError {
    #[error("RBAC denied: role {role} lacks permission for task kind {task_kind}")]
    RbacDenied { role: String, task_kind: String },

    #[error("command not on whitelist: {0}")]
    CommandNotWhitelisted(String),

    #[error("ATDI traffic light is RED (score {score}); deploy blocked")]
    QualityRed { score: i64 },

    #[error("spec is ahead of plan for feature {feature_id}: {reason}")]
    SpecDrift { feature_id: String, reason: String },

    #[error("spawn request rejected: {0}")]
    SpawnRejected(SpawnRejectReason),
}

/// Worker-side execution failure (spec §7, "Worker failure").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatcher invocation for task {task_id} raised an exception: {message}")]
    ExecutorException { task_id: String, message: String },

    #[error("no capable, available worker for task {task_id} (kind {task_kind})")]
    NoAvailableWorker { task_id: String, task_kind: String },

    #[error("dispatch timed out for task {task_id} on worker {worker_id}")]
    Timeout { task_id: String, worker_id: String },
}

/// Exhaustion conditions (spec §7, "Exhaustion").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExhaustionError {
    #[error("circuit breaker opened after {consecutive_failures} consecutive failures")]
    CircuitBroken { consecutive_failures: u32 },

    #[error("execution exceeded maxExecutionTimeMs ({max_execution_time_ms}ms)")]
    ExecutionTimeExceeded { max_execution_time_ms: u64 },

    #[error("healing exhausted after {attempts} attempts for task {task_id}")]
    HealingExhausted { task_id: String, attempts: u32 },
}

/// Checkpoint integrity/lookup errors (spec §7, "Integrity").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("checkpoint {0} not found")]
    NotFound(String),

    #[error("checkpoint {checkpoint_id} failed integrity verification: expected hash {expected}, got {actual}")]
    IntegrityViolation {
        checkpoint_id: String,
        expected: String,
        actual: String,
    },
}

/// Negotiation/auction protocol errors (spec §7, "Protocol").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("proposal {0} not found")]
    ProposalNotFound(String),

    #[error("proposal {0} is not open")]
    ProposalNotOpen(String),

    #[error("voter {voter} is not eligible for proposal {proposal_id}")]
    VoterNotEligible { proposal_id: String, voter: String },

    #[error("voter {voter} has already voted on proposal {proposal_id}")]
    DuplicateVote { proposal_id: String, voter: String },

    #[error("choice {choice} is not among this proposal's options")]
    InvalidChoice { choice: String },

    #[error("role {role} may not cast a VETO vote")]
    VetoNotAuthorized { role: String },

    #[error("proposal {0} has expired")]
    ProposalExpired(String),

    #[error("auction {0} not found or already closed")]
    AuctionClosed(String),

    #[error(transparent)]
    Bid(#[from] BidError),
}
