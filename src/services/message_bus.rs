//! In-process pub/sub message bus with topic RBAC, TTL, a bounded log,
//! barriers, and signal flags (spec §4.5, C2).
//!
//! Grounded on `abathur::services::event_bus::EventBus` (sequence numbering,
//! categorised envelopes, broadcast-style delivery), generalized from a
//! broadcast event log into full topic-routed pub/sub with RBAC and
//! targeted delivery, and extended with the `AgentMailbox`/`Barrier`/
//! `SignalFlag` primitives from spec §4.5.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use crate::domain::models::{topic_matches, Message, PublishOptions};

/// Reason a `publish` call was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishRejection {
    MessageTooLarge,
    RbacDenied,
    ChannelFull,
}

impl std::fmt::Display for PublishRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MessageTooLarge => "MESSAGE_TOO_LARGE",
            Self::RbacDenied => "RBAC_DENIED",
            Self::ChannelFull => "CHANNEL_FULL",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a publish attempt.
#[derive(Debug, Clone)]
pub struct PublishResult {
    pub success: bool,
    pub message_id: Option<Uuid>,
    pub reason: Option<PublishRejection>,
}

type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

struct Subscription {
    subscriber_id: String,
    role: String,
    topic: String,
    handler: Handler,
}

/// Configuration for the bus.
#[derive(Debug, Clone)]
pub struct MessageBusConfig {
    pub max_message_size: usize,
    pub max_total_messages: usize,
    pub max_per_channel: Option<usize>,
    pub default_ttl_ms: u64,
    pub enforce_rbac: bool,
}

impl Default for MessageBusConfig {
    fn default() -> Self {
        Self {
            max_message_size: 8 * 1024,
            max_total_messages: 10_000,
            max_per_channel: None,
            default_ttl_ms: 60_000,
            enforce_rbac: false,
        }
    }
}

#[derive(Default)]
struct BusState {
    subscriptions: Vec<Subscription>,
    log: Vec<Message>,
    per_channel_counts: HashMap<String, usize>,
    publish_roles: HashMap<String, HashSet<String>>,
    subscribe_roles: HashMap<String, HashSet<String>>,
}

/// Topic-routed, RBAC-aware, TTL-bounded pub/sub bus (spec §4.5).
pub struct MessageBus {
    config: MessageBusConfig,
    state: RwLock<BusState>,
    sequence: AtomicU64,
}

impl MessageBus {
    pub fn new(config: MessageBusConfig) -> Self {
        Self { config, state: RwLock::new(BusState::default()), sequence: AtomicU64::new(0) }
    }

    pub fn with_defaults() -> Self {
        Self::new(MessageBusConfig::default())
    }

    /// Register an RBAC rule: only `roles` may publish/subscribe to topics
    /// under `prefix`. Unknown prefixes deny when RBAC is enforced.
    pub async fn allow_publish(&self, prefix: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) {
        self.state.write().await.publish_roles.insert(prefix.into(), roles.into_iter().map(Into::into).collect());
    }

    pub async fn allow_subscribe(&self, prefix: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) {
        self.state.write().await.subscribe_roles.insert(prefix.into(), roles.into_iter().map(Into::into).collect());
    }

    fn matching_prefix<'a>(rules: &'a HashMap<String, HashSet<String>>, topic: &str) -> Option<&'a HashSet<String>> {
        rules
            .iter()
            .filter(|(prefix, _)| topic.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, roles)| roles)
    }

    /// Publish a message. Subscribers are invoked synchronously, in
    /// registration order, within this call; a panicking/erroring handler
    /// must not prevent delivery to the others (caught via `catch_unwind`).
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        sender: impl Into<String>,
        sender_role: impl Into<String>,
        payload: Value,
        opts: Option<PublishOptions>,
    ) -> PublishResult {
        let topic = topic.into();
        let sender = sender.into();
        let sender_role = sender_role.into();
        let opts = opts.unwrap_or_default();

        let size = serde_json::to_vec(&payload).map(|v| v.len()).unwrap_or(usize::MAX);
        if size > self.config.max_message_size {
            return PublishResult { success: false, message_id: None, reason: Some(PublishRejection::MessageTooLarge) };
        }

        let mut state = self.state.write().await;

        if self.config.enforce_rbac {
            if let Some(roles) = Self::matching_prefix(&state.publish_roles, &topic) {
                if !roles.contains(&sender_role) {
                    return PublishResult { success: false, message_id: None, reason: Some(PublishRejection::RbacDenied) };
                }
            } else {
                return PublishResult { success: false, message_id: None, reason: Some(PublishRejection::RbacDenied) };
            }
        }

        if let Some(limit) = self.config.max_per_channel {
            let count = state.per_channel_counts.get(&topic).copied().unwrap_or(0);
            if count >= limit {
                return PublishResult { success: false, message_id: None, reason: Some(PublishRejection::ChannelFull) };
            }
        }

        let message = Message {
            id: Uuid::new_v4(),
            topic: topic.clone(),
            sender,
            sender_role,
            payload,
            timestamp: Utc::now(),
            ttl_ms: opts.ttl_ms.unwrap_or(self.config.default_ttl_ms),
            target: opts.target,
        };

        self.sequence.fetch_add(1, Ordering::SeqCst);
        state.log.push(message.clone());
        *state.per_channel_counts.entry(topic.clone()).or_insert(0) += 1;
        if state.log.len() > self.config.max_total_messages {
            state.log.remove(0);
        }

        let matching: Vec<Handler> = state
            .subscriptions
            .iter()
            .filter(|sub| topic_matches(&sub.topic, &topic))
            .filter(|sub| message.target.is_none() || message.target.as_deref() == Some(sub.subscriber_id.as_str()))
            .map(|sub| sub.handler.clone())
            .collect();
        drop(state);

        for handler in matching {
            let message = message.clone();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&message)));
            if result.is_err() {
                tracing::warn!(topic = %message.topic, "message bus subscriber panicked; continuing delivery to others");
            }
        }

        PublishResult { success: true, message_id: Some(message.id), reason: None }
    }

    /// Subscribe to a topic (optionally a `prefix.*` wildcard). Returns an
    /// opaque subscription id that can be passed to [`Self::unsubscribe`].
    pub async fn subscribe(
        &self,
        topic: impl Into<String>,
        subscriber_id: impl Into<String>,
        role: impl Into<String>,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Result<usize, PublishRejection> {
        let topic = topic.into();
        let subscriber_id = subscriber_id.into();
        let role = role.into();

        let mut state = self.state.write().await;
        if self.config.enforce_rbac {
            if let Some(roles) = Self::matching_prefix(&state.subscribe_roles, &topic) {
                if !roles.contains(&role) {
                    return Err(PublishRejection::RbacDenied);
                }
            } else {
                return Err(PublishRejection::RbacDenied);
            }
        }
        state.subscriptions.push(Subscription { subscriber_id, role, topic, handler: Arc::new(handler) });
        Ok(state.subscriptions.len() - 1)
    }

    pub async fn unsubscribe(&self, index: usize) {
        let mut state = self.state.write().await;
        if index < state.subscriptions.len() {
            state.subscriptions.remove(index);
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.read().await.subscriptions.len()
    }

    /// Non-expired messages currently retained in the log.
    pub async fn get_messages(&self) -> Vec<Message> {
        let now = Utc::now();
        self.state.read().await.log.iter().filter(|m| !m.is_expired(now)).cloned().collect()
    }

    /// Evict expired messages from the log; returns how many were purged.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let before = state.log.len();
        state.log.retain(|m| !m.is_expired(now));
        before - state.log.len()
    }

    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        *state = BusState::default();
    }
}

/// A per-agent mailbox view over the bus: `send` publishes to a topic
/// namespaced by agent id, `on` subscribes, `inbox`/`read` drain buffered
/// messages (spec §4.5).
pub struct AgentMailbox {
    agent_id: String,
    role: String,
    bus: Arc<MessageBus>,
    inbox: Arc<RwLock<Vec<Message>>>,
    subscription: tokio::sync::Mutex<Option<usize>>,
}

impl AgentMailbox {
    pub async fn new(agent_id: impl Into<String>, role: impl Into<String>, bus: Arc<MessageBus>) -> Self {
        let agent_id = agent_id.into();
        let role = role.into();
        let inbox = Arc::new(RwLock::new(Vec::new()));
        let inbox_clone = inbox.clone();
        let topic = format!("agent.{agent_id}.*");
        let sub = bus
            .subscribe(topic, agent_id.clone(), role.clone(), move |msg| {
                let inbox_clone = inbox_clone.clone();
                let msg = msg.clone();
                tokio::spawn(async move {
                    inbox_clone.write().await.push(msg);
                });
            })
            .await
            .ok();
        Self { agent_id, role, bus, inbox, subscription: tokio::sync::Mutex::new(sub) }
    }

    pub async fn send(&self, target_agent: &str, payload: Value) -> PublishResult {
        let topic = format!("agent.{target_agent}.mailbox");
        self.bus
            .publish(topic, self.agent_id.clone(), self.role.clone(), payload, None)
            .await
    }

    pub async fn read(&self) -> Vec<Message> {
        std::mem::take(&mut *self.inbox.write().await)
    }

    pub async fn dispose(&self) {
        if let Some(idx) = self.subscription.lock().await.take() {
            self.bus.unsubscribe(idx).await;
        }
    }
}

/// Waits until `n` distinct participants have arrived (spec §4.5).
pub struct Barrier {
    target: usize,
    arrived: RwLock<HashSet<String>>,
    notify: Notify,
}

impl Barrier {
    pub fn new(target: usize) -> Self {
        Self { target, arrived: RwLock::new(HashSet::new()), notify: Notify::new() }
    }

    pub async fn arrive(&self, participant: impl Into<String>) {
        let mut arrived = self.arrived.write().await;
        arrived.insert(participant.into());
        if arrived.len() >= self.target {
            self.notify.notify_waiters();
        }
    }

    pub async fn is_met(&self) -> bool {
        self.arrived.read().await.len() >= self.target
    }

    /// Resolves immediately if already met, otherwise waits for the next
    /// arrival that meets the target.
    pub async fn wait(&self) {
        if self.is_met().await {
            return;
        }
        self.notify.notified().await;
    }
}

/// A one-shot rising edge (spec §4.5, "SignalFlag").
pub struct SignalFlag {
    raised: std::sync::atomic::AtomicBool,
    notify: Notify,
}

impl Default for SignalFlag {
    fn default() -> Self {
        Self { raised: std::sync::atomic::AtomicBool::new(false), notify: Notify::new() }
    }
}

impl SignalFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        if !self.raised.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        if self.is_raised() {
            return;
        }
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_to_matching_wildcard_subscriber() {
        let bus = MessageBus::with_defaults();
        let received = Arc::new(RwLock::new(Vec::new()));
        let received_clone = received.clone();
        bus.subscribe("task.*", "sub1", "builder", move |msg| {
            let received_clone = received_clone.clone();
            let msg = msg.clone();
            tokio::spawn(async move {
                received_clone.write().await.push(msg);
            });
        })
        .await
        .unwrap();

        bus.publish("task.completed", "s", "builder", serde_json::json!({"a":1}), None).await;
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(received.read().await.len(), 1);
    }

    #[tokio::test]
    async fn rbac_denies_unknown_prefix_when_enforced() {
        let mut cfg = MessageBusConfig::default();
        cfg.enforce_rbac = true;
        let bus = MessageBus::new(cfg);
        let result = bus.publish("task.completed", "s", "builder", serde_json::json!({}), None).await;
        assert!(!result.success);
        assert_eq!(result.reason, Some(PublishRejection::RbacDenied));
    }

    #[tokio::test]
    async fn message_too_large_is_rejected() {
        let mut cfg = MessageBusConfig::default();
        cfg.max_message_size = 4;
        let bus = MessageBus::new(cfg);
        let result = bus.publish("task.x", "s", "r", serde_json::json!({"a":"bbbbbbbbbb"}), None).await;
        assert_eq!(result.reason, Some(PublishRejection::MessageTooLarge));
    }

    #[tokio::test]
    async fn barrier_resolves_immediately_once_met() {
        let barrier = Barrier::new(2);
        barrier.arrive("a").await;
        barrier.arrive("b").await;
        assert!(barrier.is_met().await);
        barrier.wait().await; // must not hang
    }

    #[tokio::test]
    async fn signal_flag_is_one_shot() {
        let flag = SignalFlag::new();
        assert!(!flag.is_raised());
        flag.raise();
        flag.raise();
        assert!(flag.is_raised());
        flag.wait().await;
    }

    #[tokio::test]
    async fn purge_expired_evicts_old_messages() {
        let bus = MessageBus::with_defaults();
        bus.publish(
            "task.x",
            "s",
            "r",
            serde_json::json!({}),
            Some(PublishOptions { ttl_ms: Some(0), target: None }),
        )
        .await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let purged = bus.purge_expired().await;
        assert_eq!(purged, 1);
        assert!(bus.get_messages().await.is_empty());
    }
}
