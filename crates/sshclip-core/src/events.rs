//! Process-wide shutdown/event bus (C6).
//!
//! A small pub/sub of named events. Two events are conventional: `Interrupt`
//! and `Terminate`, mapped from OS signals by the binary's `main`. Components
//! may mint additional named events (e.g. a manual "stop listening" request)
//! without changing this type.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::warn;

/// A named event broadcast on the shutdown/event bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShutdownEvent {
    /// Mapped from `SIGINT` (or platform equivalent) by the binary.
    Interrupt,
    /// Mapped from `SIGTERM` (or platform equivalent) by the binary.
    Terminate,
    /// A component-defined event, e.g. "stop the listen loop".
    Custom(Arc<str>),
}

/// Per-subscriber inbox depth. Deliveries beyond this are dropped rather
/// than blocking the publisher; shutdown events are rare and a subscriber
/// that cannot keep up has already missed its chance to react promptly.
const SUBSCRIBER_CAPACITY: usize = 8;

struct Subscription {
    id: u64,
    interests: HashSet<ShutdownEvent>,
    sender: mpsc::Sender<ShutdownEvent>,
}

/// A handle returned by [`EventBus::subscribe`]. Dropping it does not
/// unsubscribe; call [`EventBus::unsubscribe`] explicitly.
pub struct Subscriber {
    id: u64,
    receiver: mpsc::Receiver<ShutdownEvent>,
}

impl Subscriber {
    /// This subscription's id, for a later [`EventBus::unsubscribe`] call.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event this subscription is interested in.
    ///
    /// Returns `None` once the bus (and every sender clone of it) has been
    /// dropped.
    pub async fn recv(&mut self) -> Option<ShutdownEvent> {
        self.receiver.recv().await
    }
}

/// Process-wide shutdown/event bus.
///
/// Cloning an `EventBus` shares the same subscriber table; the bus is cheap
/// to pass around by value.
#[derive(Clone)]
pub struct EventBus {
    subscriptions: Arc<std::sync::Mutex<Vec<Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty event bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self { subscriptions: Arc::new(std::sync::Mutex::new(Vec::new())), next_id: Arc::new(AtomicU64::new(0)) }
    }

    /// Register interest in one or more events, returning a subscriber handle
    /// with its own inbox.
    #[must_use]
    pub fn subscribe(&self, interests: impl IntoIterator<Item = ShutdownEvent>) -> Subscriber {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let interests = interests.into_iter().collect();
        #[allow(clippy::expect_used)]
        self.subscriptions
            .lock()
            .expect("event bus subscriber table mutex poisoned")
            .push(Subscription { id, interests, sender });
        Subscriber { id, receiver }
    }

    /// Remove a subscription by id. A no-op if the id is unknown (already
    /// unsubscribed, or never existed).
    pub fn unsubscribe(&self, id: u64) {
        #[allow(clippy::expect_used)]
        self.subscriptions
            .lock()
            .expect("event bus subscriber table mutex poisoned")
            .retain(|sub| sub.id != id);
    }

    /// Broadcast an event to every subscriber whose interests include it.
    ///
    /// Delivery to an individual subscriber is best-effort: a subscriber
    /// whose inbox is full is logged and skipped rather than allowed to
    /// stall this call.
    pub fn publish(&self, event: &ShutdownEvent) {
        #[allow(clippy::expect_used)]
        let subscriptions =
            self.subscriptions.lock().expect("event bus subscriber table mutex poisoned");
        for sub in subscriptions.iter().filter(|sub| sub.interests.contains(event)) {
            if let Err(err) = sub.sender.try_send(event.clone()) {
                warn!(subscriber_id = sub.id, ?err, "dropping shutdown event for slow subscriber");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_interested_event() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe([ShutdownEvent::Terminate]);
        bus.publish(&ShutdownEvent::Terminate);
        assert_eq!(sub.recv().await, Some(ShutdownEvent::Terminate));
    }

    #[tokio::test]
    async fn subscriber_ignores_uninterested_event() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe([ShutdownEvent::Terminate]);
        bus.publish(&ShutdownEvent::Interrupt);
        bus.publish(&ShutdownEvent::Terminate);
        assert_eq!(sub.recv().await, Some(ShutdownEvent::Terminate));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery_and_closes_the_channel() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe([ShutdownEvent::Terminate]);
        bus.unsubscribe(sub.id());
        bus.publish(&ShutdownEvent::Terminate);
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn custom_named_events_round_trip() {
        let bus = EventBus::new();
        let stop_listening: ShutdownEvent = ShutdownEvent::Custom(Arc::from("manual-listen-stop"));
        let mut sub = bus.subscribe([stop_listening.clone()]);
        bus.publish(&stop_listening);
        assert_eq!(sub.recv().await, Some(stop_listening));
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = EventBus::new();
        let mut a = bus.subscribe([ShutdownEvent::Interrupt]);
        let mut b = bus.subscribe([ShutdownEvent::Interrupt]);
        bus.publish(&ShutdownEvent::Interrupt);
        assert_eq!(a.recv().await, Some(ShutdownEvent::Interrupt));
        assert_eq!(b.recv().await, Some(ShutdownEvent::Interrupt));
    }
}
