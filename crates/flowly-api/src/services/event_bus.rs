// Event bus: sequence, persist, then fan out
// Decision: Publishes are serialized in-process so live subscribers observe
//           strictly ascending seqs; the seq itself still comes from storage
// Decision: Per-subscriber unbounded queues; a slow consumer never blocks publish
// Decision: Subscription is a drop guard, so every exit path unsubscribes

use flowly_core::{Event, EventStore, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

pub struct EventBus {
    store: Arc<dyn EventStore>,
    // BTreeMap keyed by a monotonic id iterates in registration order
    subscribers: Mutex<BTreeMap<u64, mpsc::UnboundedSender<Event>>>,
    next_subscriber_id: AtomicU64,
    publish_lock: tokio::sync::Mutex<()>,
}

impl EventBus {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            subscribers: Mutex::new(BTreeMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            publish_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Allocate a seq, persist, then notify every current subscriber.
    ///
    /// Returns the seq-stamped event. Nothing is broadcast if persisting fails.
    pub async fn publish(&self, event: Event) -> Result<Event> {
        let _guard = self.publish_lock.lock().await;

        let seq = self.store.next_seq().await?;
        let event = event.with_seq(seq);
        self.store.insert_event(seq, &event).await?;

        tracing::debug!(
            seq,
            event_id = %event.id,
            event_type = %event.event_type,
            "Published event"
        );

        self.broadcast(&event);
        Ok(event)
    }

    fn broadcast(&self, event: &Event) {
        let subscribers = self.subscribers.lock();
        for (id, sender) in subscribers.iter() {
            if sender.send(event.clone()).is_err() {
                tracing::debug!(subscriber_id = id, "Skipping closed subscriber");
            }
        }
    }

    /// Register a subscriber; it receives every event published from now on
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().insert(id, sender);

        tracing::debug!(subscriber_id = id, "Subscriber registered");

        Subscription {
            id,
            receiver,
            bus: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber_id = id, "Subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub async fn events_since(&self, last_seq: i64) -> Result<Vec<Event>> {
        self.store.events_since(last_seq).await
    }

    pub async fn current_seq(&self) -> Result<i64> {
        self.store.current_seq().await
    }

    pub async fn purged_through_seq(&self) -> Result<i64> {
        self.store.purged_through_seq().await
    }
}

/// Handle for one registered subscriber; unsubscribes on drop
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Event>,
    bus: Weak<EventBus>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Take an already-queued event without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}
