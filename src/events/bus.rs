//! Fan-out publish/subscribe bus.
//!
//! Subscribers are stored in a copy-on-write list. `publish` clones the list
//! under the lock and invokes callbacks after releasing it, so a callback may
//! subscribe, unsubscribe or publish without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::types::{Event, EventCategory, EventDestination};
use crate::clock::{Clock, SystemClock};
use crate::telemetry::metrics;

/// Callback invoked for every matching event.
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Identifier returned by `subscribe*`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Which events a subscriber receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionFilter {
    /// `None` subscribes to every category.
    pub category: Option<EventCategory>,
    /// Sink bits this subscriber represents.
    pub channel: EventDestination,
}

impl SubscriptionFilter {
    pub fn category(category: EventCategory) -> Self {
        Self { category: Some(category), channel: EventDestination::PUBLIC }
    }

    pub fn all() -> Self {
        Self { category: None, channel: EventDestination::PUBLIC }
    }

    pub fn on_channel(mut self, channel: EventDestination) -> Self {
        self.channel = channel;
        self
    }

    fn matches(&self, event: &Event) -> bool {
        let category_ok = self.category.map_or(true, |c| c == event.category);
        category_ok && event.destination.intersects(self.channel)
    }
}

struct Subscriber {
    id: SubscriptionId,
    filter: SubscriptionFilter,
    callback: EventCallback,
}

/// Thread-safe event bus.
pub struct EventBus {
    subscribers: Mutex<Arc<Vec<Arc<Subscriber>>>>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            subscribers: Mutex::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    /// Subscribe to one category on the public channel.
    pub fn subscribe<F>(&self, category: EventCategory, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe_with(SubscriptionFilter::category(category), callback)
    }

    /// Subscribe to every category on the public channel.
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe_with(SubscriptionFilter::all(), callback)
    }

    pub fn subscribe_with<F>(&self, filter: SubscriptionFilter, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let subscriber = Arc::new(Subscriber { id, filter, callback: Arc::new(callback) });

        let mut guard = self.subscribers.lock();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(subscriber);
        *guard = Arc::new(next);

        tracing::debug!(subscription = id.0, category = ?filter.category, "Subscriber added");
        id
    }

    /// Remove a subscriber. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut guard = self.subscribers.lock();
        if !guard.iter().any(|s| s.id == id) {
            return false;
        }
        let next: Vec<_> = guard.iter().filter(|s| s.id != id).cloned().collect();
        *guard = Arc::new(next);
        true
    }

    /// Publish an event and return how many subscribers received it.
    ///
    /// A zero timestamp is replaced with the current clock reading.
    pub fn publish(&self, mut event: Event) -> usize {
        if event.timestamp_ms == 0 {
            event.timestamp_ms = self.clock.now_ms().max(1);
        }

        let snapshot = Arc::clone(&*self.subscribers.lock());
        metrics::record_event_published(event.category);

        let mut delivered = 0;
        for subscriber in snapshot.iter().filter(|s| s.filter.matches(&event)) {
            (subscriber.callback)(&event);
            delivered += 1;
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Drop every subscriber.
    pub fn clear(&self) {
        *self.subscribers.lock() = Arc::new(Vec::new());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
