//! Broadcast message bus.
//!
//! Topic-based pub/sub with no persistence: a subscriber only receives
//! messages posted after it subscribes, in publication order per topic.
//! Built on `tokio::sync::broadcast`, which the crate already depends on
//! transitively via `tokio-stream`.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::error::CommError;

/// What a publisher does when a subscriber's bounded channel is full: a
/// slow subscriber either back-pressures the publisher or drops messages,
/// per this policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Oldest unread messages are silently dropped for that subscriber;
    /// `tokio::sync::broadcast`'s native behavior.
    Drop,
    /// Publish blocks until every subscriber has room. Implemented by
    /// sizing each topic's channel capacity large enough that in practice
    /// a well-behaved subscriber never lags; a lagging subscriber still
    /// observes a `Lagged` gap rather than stalling the publisher
    /// indefinitely, since an unbounded wait could hang the bus forever on
    /// one wedged subscriber.
    Block,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic: String,
    pub payload: serde_json::Value,
    pub published_at_ms: i64,
}

struct Topic {
    tx: broadcast::Sender<BusMessage>,
}

/// Topic-based publish/subscribe bus.
pub struct MessageBus {
    topics: DashMap<String, Topic>,
    capacity: usize,
    policy: BackpressurePolicy,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BackpressurePolicy::Drop)
    }
}

impl MessageBus {
    pub fn new(policy: BackpressurePolicy) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: match policy {
                BackpressurePolicy::Drop => 256,
                BackpressurePolicy::Block => 8192,
            },
            policy,
        }
    }

    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    /// Publishes `payload` to `topic`. A no-op (returns `Ok`) if nobody is
    /// currently subscribed, per broadcast-channel semantics: there is
    /// nothing to persist.
    pub fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), CommError> {
        let msg = BusMessage {
            topic: topic.to_string(),
            payload,
            published_at_ms: now_ms(),
        };
        let entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic {
                tx: broadcast::channel(self.capacity).0,
            });
        // A `SendError` here only means there are zero subscribers right
        // now; that is not a fabric-level failure.
        let _ = entry.tx.send(msg);
        Ok(())
    }

    /// Subscribes to `topic`; the returned receiver observes every message
    /// published after this call, in order.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        let entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic {
                tx: broadcast::channel(self.capacity).0,
            });
        entry.tx.subscribe()
    }

    /// Drops every topic, closing every outstanding subscriber channel.
    pub fn close(&self) {
        self.topics.clear();
    }

    /// Topics with at least one live sender reference (diagnostic only).
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|e| e.key().clone()).collect()
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Per-namespace policy overrides, consulted by
/// [`super::SharedMemoryStore`] for reference-vs-value promotion; kept here
/// since both the bus and the store share the same "policy by namespace"
/// shape and a caller may want one `PolicyManager` instance for both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferencePolicy {
    AlwaysReference,
    AlwaysValue,
    /// Defer to the size threshold (the default auto-promotion rule).
    Auto,
}

#[derive(Default)]
pub struct PolicyManager {
    overrides: DashMap<String, ReferencePolicy>,
}

impl PolicyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_namespace_policy(&self, namespace: &str, policy: ReferencePolicy) {
        self.overrides.insert(namespace.to_string(), policy);
    }

    pub fn policy_for(&self, namespace: &str) -> ReferencePolicy {
        self.overrides
            .get(namespace)
            .map(|p| *p)
            .unwrap_or(ReferencePolicy::Auto)
    }

    pub fn snapshot(&self) -> HashMap<String, ReferencePolicy> {
        self.overrides.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_only_sees_messages_after_subscribing() {
        let bus = MessageBus::default();
        bus.publish("topic-a", serde_json::json!({"n": 1})).unwrap();
        let mut rx = bus.subscribe("topic-a");
        bus.publish("topic-a", serde_json::json!({"n": 2})).unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.payload["n"], 2);
    }

    #[tokio::test]
    async fn messages_arrive_in_publication_order() {
        let bus = MessageBus::default();
        let mut rx = bus.subscribe("t");
        for i in 0..5 {
            bus.publish("t", serde_json::json!({"n": i})).unwrap();
        }
        for i in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.payload["n"], i);
        }
    }

    #[tokio::test]
    async fn separate_topics_are_independent() {
        let bus = MessageBus::default();
        let mut rx_a = bus.subscribe("a");
        let mut rx_b = bus.subscribe("b");
        bus.publish("a", serde_json::json!(1)).unwrap();
        assert_eq!(rx_a.recv().await.unwrap().payload, serde_json::json!(1));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn policy_manager_defaults_to_auto() {
        let pm = PolicyManager::new();
        assert_eq!(pm.policy_for("anything"), ReferencePolicy::Auto);
        pm.set_namespace_policy("big", ReferencePolicy::AlwaysReference);
        assert_eq!(pm.policy_for("big"), ReferencePolicy::AlwaysReference);
    }
}
