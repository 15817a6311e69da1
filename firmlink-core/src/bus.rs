//! Topic-keyed publish/subscribe registry
//!
//! The bus is the single fan-out primitive of the link layer: the RPC client
//! uses it both to correlate replies with in-flight calls (one topic per
//! request id) and to expose every inbound frame to interested listeners.
//! It knows nothing about networking or time.

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::warn;

type Callback = Arc<dyn Fn(Value) + Send + Sync>;

/// Opaque handle returned by [`EventBus::subscribe`], usable only with
/// [`EventBus::unsubscribe`].
///
/// Ids are allocated from a single counter per bus instance and are never
/// reused while that instance is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    topics: HashMap<String, BTreeMap<u64, Callback>>,
    next_id: u64,
}

/// Publish/subscribe event bus
///
/// A cheap clonable handle to one shared subscriber registry. Construct one
/// per session and pass it to every component that needs it; there is no
/// global instance.
///
/// Delivery semantics: `publish` snapshots the subscriber set for the topic,
/// then invokes each callback outside the lock, in subscription order. A
/// callback may subscribe or unsubscribe (including itself) without
/// deadlocking; a subscriber removed by another callback during the same
/// publish is still invoked once in that pass. A panicking subscriber is
/// logged and does not stop delivery to the rest.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    /// Create a new, empty bus
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Subscriber panics are caught outside the lock, so poisoning can
        // only come from an unrelated panic; the registry is still coherent.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` under `topic`; returns the id to unsubscribe with
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> SubscriptionId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(id, Arc::new(callback));
        SubscriptionId(id)
    }

    /// Remove a subscription; unknown topic or id is a no-op
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        // An emptied topic entry is left in place; it is equivalent to an
        // absent one.
        if let Some(subscribers) = self.lock().topics.get_mut(topic) {
            subscribers.remove(&id.0);
        }
    }

    /// Invoke every callback currently registered under `topic` with a clone
    /// of `data`
    ///
    /// Publishing to a topic with no subscribers is a silent no-op.
    pub fn publish(&self, topic: &str, data: Value) {
        let snapshot: Vec<Callback> = match self.lock().topics.get(topic) {
            Some(subscribers) => subscribers.values().cloned().collect(),
            None => return,
        };
        for callback in snapshot {
            let payload = data.clone();
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                warn!(topic, "event subscriber panicked");
            }
        }
    }

    /// Number of callbacks currently registered under `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().topics.get(topic).map_or(0, BTreeMap::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();
        f.debug_struct("EventBus")
            .field("topics", &registry.topics.len())
            .field("next_id", &registry.next_id)
            .finish()
    }
}
