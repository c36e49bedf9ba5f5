//! Message bus envelope (spec §3 / §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A message published on the [`crate::services::message_bus::MessageBus`].
///
/// `topic` is dot-delimited (`task.*`, `agent.*`, `negotiation.*`,
/// `auction.*`); a trailing `*` in a subscription matches any suffix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub sender: String,
    pub sender_role: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub ttl_ms: u64,
    pub target: Option<String>,
}

impl Message {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age_ms = (now - self.timestamp).num_milliseconds().max(0) as u64;
        age_ms > self.ttl_ms
    }

    /// Byte size of the serialised payload, used for the size guard.
    pub fn payload_size(&self) -> usize {
        serde_json::to_vec(&self.payload).map(|v| v.len()).unwrap_or(0)
    }
}

/// Options accepted by `MessageBus::publish`.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub ttl_ms: Option<u64>,
    pub target: Option<String>,
}

/// Topic-prefix matching: a subscription of `"task.*"` matches any topic
/// starting with `"task."`, and an exact subscription matches only itself.
pub fn topic_matches(subscription: &str, topic: &str) -> bool {
    if let Some(prefix) = subscription.strip_suffix('*') {
        topic.starts_with(prefix)
    } else {
        subscription == topic
    }
}
