//! Domain ports (interfaces) for external collaborators and the dispatcher
//! seam (spec §1, "OUT OF SCOPE" / "these subsystems are plugged in by the
//! host").

pub mod agent_executor;
pub mod retrieval_service;
pub mod telemetry;

pub use agent_executor::{AgentExecutor, DispatchOutcome, OutboundMessage, SpawnRequest};
pub use retrieval_service::{NullRetrievalService, RetrievalHit, RetrievalService};
pub use telemetry::{ChannelTelemetryEmitter, NullTelemetryEmitter, TelemetryEmitter, TelemetryEvent};
