//! Domain layer.
//!
//! This module contains the core business logic and domain models for the
//! governed DAG orchestrator: the task graph, worker registry records, the
//! message envelope, and the consensus/auction/checkpoint data shapes
//! (spec §3), plus the error taxonomy (spec §7) and the ports through which
//! external collaborators and the agent-dispatch seam are plugged in.

pub mod error;
pub mod models;
pub mod ports;

pub use error::{
    CheckpointError, DispatchError, ExhaustionError, PolicyDenialError, ProtocolError,
    SpawnRejectReason, StructuralError,
};
