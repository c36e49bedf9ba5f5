//! `TelemetryEmitter` — out-of-scope external collaborator (spec §1 / §6).
//!
//! The core invokes sink callbacks but does not depend on their delivery
//! (spec §6): emission is fire-and-forget and never blocks the scheduler.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A structured telemetry event, matching spec §6's
/// `{type, timestamp, source, payload}` shape.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TelemetryEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub payload: Value,
}

impl TelemetryEvent {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// A sink accepting telemetry events. Implementations must not block or
/// panic; the engine treats this as best-effort.
pub trait TelemetryEmitter: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// A sink that discards everything, used when no telemetry backend is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetryEmitter;

impl TelemetryEmitter for NullTelemetryEmitter {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// A sink that forwards events over an unbounded channel so a host can poll
/// them without the core ever blocking on a slow consumer.
pub struct ChannelTelemetryEmitter {
    sender: tokio::sync::mpsc::UnboundedSender<TelemetryEvent>,
}

impl ChannelTelemetryEmitter {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<TelemetryEvent>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl TelemetryEmitter for ChannelTelemetryEmitter {
    fn emit(&self, event: TelemetryEvent) {
        let _ = self.sender.send(event);
    }
}
