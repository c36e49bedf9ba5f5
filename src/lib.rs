//! Castellan - governed task orchestrator for AI-agent pipelines.
//!
//! A DAG scheduler with policy gates, a worker registry, self-healing
//! retries, a pub/sub message bus, consensus/auction negotiation, and
//! hash-verified checkpoint/replay, all composed by
//! [`services::dag_engine::Engine`].

pub mod domain;
pub mod infrastructure;
pub mod services;
