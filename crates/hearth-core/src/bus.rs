// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

/// Topics emitted by the core subsystems.
pub mod topics {
    pub const TASK_QUEUED: &str = "task:queued";
    pub const TASK_COMPLETED: &str = "task:completed";
    pub const TASK_FAILED: &str = "task:failed";
    pub const AGENT_CREATED: &str = "agent:created";
    pub const AGENT_DISMISSED: &str = "agent:dismissed";
    pub const AGENT_REVIVED: &str = "agent:revived";
    pub const MEMORY_UPDATED: &str = "memory:updated";
    pub const MEMORY_CONSOLIDATED: &str = "memory:consolidated";
    pub const BLACKBOARD_PROPOSAL: &str = "blackboard:proposal";
    pub const BLACKBOARD_RESOLVED: &str = "blackboard:resolved";
}

/// One published event.
///
/// The sequence number is monotonic per bus and exists for observability
/// and disambiguation only — cross-emitter ordering carries no guarantee.
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub seq: u64,
    pub topic: String,
    pub user_id: String,
    pub data: serde_json::Value,
    /// Wall-clock epoch milliseconds at emit time
    pub timestamp: i64,
}

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Token returned by `subscribe`/`subscribe_any`; pass to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

#[derive(Default)]
struct BusState {
    topic_handlers: HashMap<String, Vec<(u64, Handler)>>,
    any_handlers: Vec<(u64, Handler)>,
    topic_history: HashMap<String, VecDeque<BusEvent>>,
    global_history: VecDeque<BusEvent>,
}

/// In-process topic pub/sub with bounded per-topic ring buffers.
///
/// Delivery is synchronous: `emit` stores the event, then invokes every
/// topic handler and then every wildcard handler before returning.  A
/// panicking handler is caught and suppressed so it can neither break the
/// emitter nor starve the remaining handlers.
pub struct EventBus {
    state: Mutex<BusState>,
    seq: AtomicU64,
    next_subscription: AtomicU64,
    history_limit: usize,
}

impl EventBus {
    pub fn new(history_limit: usize) -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            seq: AtomicU64::new(0),
            next_subscription: AtomicU64::new(0),
            history_limit,
        }
    }

    pub fn subscribe(
        &self,
        topic: &str,
        handler: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        state
            .topic_handlers
            .entry(topic.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription(id)
    }

    /// Subscribe to every topic.  Wildcard handlers run after the topic
    /// handlers of each emission.
    pub fn subscribe_any(
        &self,
        handler: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        state.any_handlers.push((id, Arc::new(handler)));
        Subscription(id)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut state = self.lock();
        for handlers in state.topic_handlers.values_mut() {
            handlers.retain(|(id, _)| *id != subscription.0);
        }
        state.any_handlers.retain(|(id, _)| *id != subscription.0);
    }

    pub fn emit(&self, topic: &str, user_id: &str, data: serde_json::Value) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let event = BusEvent {
            seq,
            topic: topic.to_string(),
            user_id: user_id.to_string(),
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        // Store history and snapshot the handler list under the lock, then
        // invoke outside it so a handler that emits again cannot deadlock.
        let handlers: Vec<Handler> = {
            let mut state = self.lock();
            let ring = state.topic_history.entry(topic.to_string()).or_default();
            ring.push_back(event.clone());
            while ring.len() > self.history_limit {
                ring.pop_front();
            }
            let global_limit = self.history_limit * 2;
            state.global_history.push_back(event.clone());
            while state.global_history.len() > global_limit {
                state.global_history.pop_front();
            }

            let mut snapshot = Vec::new();
            if let Some(topic_handlers) = state.topic_handlers.get(topic) {
                snapshot.extend(topic_handlers.iter().map(|(_, h)| Arc::clone(h)));
            }
            snapshot.extend(state.any_handlers.iter().map(|(_, h)| Arc::clone(h)));
            snapshot
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                warn!(topic, seq, "event handler panicked; suppressed");
            }
        }

        seq
    }

    /// Up to `n` most recent events on a topic, newest first.
    pub fn recent(&self, topic: &str, n: usize) -> Vec<BusEvent> {
        let state = self.lock();
        match state.topic_history.get(topic) {
            Some(ring) => ring.iter().rev().take(n).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Up to `n` most recent events across all topics, newest first.
    pub fn recent_all(&self, n: usize) -> Vec<BusEvent> {
        let state = self.lock();
        state.global_history.iter().rev().take(n).cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;

    #[test]
    fn emit_then_recent_returns_the_event() {
        let bus = EventBus::new(100);
        bus.emit(topics::TASK_QUEUED, "u1", json!({"task_id": "t1"}));
        let events = bus.recent(topics::TASK_QUEUED, 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["task_id"], "t1");
        assert_eq!(events[0].user_id, "u1");
    }

    #[test]
    fn topic_handlers_receive_their_topic_only() {
        let bus = EventBus::new(10);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        bus.subscribe(topics::TASK_COMPLETED, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(topics::TASK_COMPLETED, "u1", json!({}));
        bus.emit(topics::TASK_FAILED, "u1", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wildcard_handler_sees_everything() {
        let bus = EventBus::new(10);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        bus.subscribe_any(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit("a", "u", json!({}));
        bus.emit("b", "u", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_handler_does_not_block_others() {
        let bus = EventBus::new(10);
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("t", |_| panic!("bad handler"));
        let hits_clone = Arc::clone(&hits);
        bus.subscribe("t", move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit("t", "u", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new(10);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let sub = bus.subscribe("t", move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit("t", "u", json!({}));
        bus.unsubscribe(sub);
        bus.emit("t", "u", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ring_buffer_drops_oldest_beyond_limit() {
        let bus = EventBus::new(3);
        for i in 0..5 {
            bus.emit("t", "u", json!({"i": i}));
        }
        let events = bus.recent("t", 10);
        assert_eq!(events.len(), 3);
        // Newest first.
        assert_eq!(events[0].data["i"], 4);
        assert_eq!(events[2].data["i"], 2);
    }

    #[test]
    fn global_history_holds_double_the_limit() {
        let bus = EventBus::new(2);
        for i in 0..6 {
            bus.emit(if i % 2 == 0 { "a" } else { "b" }, "u", json!({"i": i}));
        }
        let all = bus.recent_all(10);
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].data["i"], 5);
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let bus = EventBus::new(10);
        let a = bus.emit("t", "u", json!({}));
        let b = bus.emit("t", "u", json!({}));
        assert!(b > a);
    }

    #[test]
    fn handler_may_emit_without_deadlocking() {
        let bus = Arc::new(EventBus::new(10));
        let bus_clone = Arc::clone(&bus);
        bus.subscribe("first", move |_| {
            bus_clone.emit("second", "u", json!({}));
        });
        bus.emit("first", "u", json!({}));
        assert_eq!(bus.recent("second", 1).len(), 1);
    }

    #[test]
    fn recent_on_unknown_topic_is_empty() {
        let bus = EventBus::new(10);
        assert!(bus.recent("ghost", 5).is_empty());
    }
}
