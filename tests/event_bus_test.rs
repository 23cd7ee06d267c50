//! Tests for EventBus - filtered delivery, timestamps and reentrancy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use capcore::clock::ManualClock;
use capcore::events::{
    Event, EventBus, EventCategory, EventDestination, SubscriptionFilter, SubscriptionId,
};

fn counter() -> (Arc<AtomicUsize>, impl Fn(&Event) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    (count, move |_: &Event| {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_public_subscriber_ignores_analytics_only_events() {
    let bus = EventBus::new();
    let (count, callback) = counter();
    bus.subscribe(EventCategory::Model, callback);

    let delivered = bus.publish(
        Event::new(EventCategory::Model, "model.did_load")
            .with_destination(EventDestination::PUBLIC),
    );
    assert_eq!(delivered, 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let delivered = bus.publish(
        Event::new(EventCategory::Model, "model.did_load")
            .with_destination(EventDestination::ANALYTICS),
    );
    assert_eq!(delivered, 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_category_filter() {
    let bus = EventBus::new();
    let (stt, stt_cb) = counter();
    let (any, any_cb) = counter();
    bus.subscribe(EventCategory::Stt, stt_cb);
    bus.subscribe_all(any_cb);

    bus.publish(Event::new(EventCategory::Stt, "stt.transcription.completed"));
    bus.publish(Event::new(EventCategory::Tts, "tts.synthesis.completed"));
    bus.publish(Event::new(EventCategory::Device, "device.registered"));

    assert_eq!(stt.load(Ordering::SeqCst), 1);
    assert_eq!(any.load(Ordering::SeqCst), 3);
}

#[test]
fn test_analytics_channel_sees_analytics_events() {
    let bus = EventBus::new();
    let (count, callback) = counter();
    bus.subscribe_with(
        SubscriptionFilter::all().on_channel(EventDestination::ANALYTICS),
        callback,
    );

    bus.publish(Event::new(EventCategory::Llm, "llm.generation.completed"));
    bus.publish(
        Event::new(EventCategory::Llm, "llm.first_token")
            .with_destination(EventDestination::PUBLIC),
    );
    bus.publish(
        Event::new(EventCategory::Llm, "llm.generation.started")
            .with_destination(EventDestination::ANALYTICS),
    );

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_zero_timestamp_is_filled() {
    let bus = EventBus::with_clock(Arc::new(ManualClock::new(1_700_000_000_000)));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe_all(move |e| sink.lock().push(e.timestamp_ms));

    bus.publish(Event::new(EventCategory::Sdk, "sdk.initialized"));
    bus.publish(Event::new(EventCategory::Sdk, "sdk.replayed").with_timestamp(42));

    assert_eq!(*seen.lock(), vec![1_700_000_000_000, 42]);
}

#[test]
fn test_zero_clock_still_yields_nonzero_timestamp() {
    let bus = EventBus::with_clock(Arc::new(ManualClock::new(0)));
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    bus.subscribe_all(move |e| *sink.lock() = Some(e.timestamp_ms));

    bus.publish(Event::new(EventCategory::Sdk, "sdk.initialized"));
    assert!(seen.lock().is_some_and(|ts| ts > 0));
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let bus = EventBus::new();
    let (count, callback) = counter();
    let id = bus.subscribe(EventCategory::Voice, callback);

    bus.publish(Event::new(EventCategory::Voice, "voice.session.started"));
    assert!(bus.unsubscribe(id));
    bus.publish(Event::new(EventCategory::Voice, "voice.session.ended"));

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(!bus.unsubscribe(id));
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn test_callback_may_subscribe_and_publish() {
    let bus = Arc::new(EventBus::new());
    let (late, late_cb) = counter();
    let late_cb = Arc::new(late_cb);
    let forwarded = Arc::new(AtomicUsize::new(0));

    let inner_bus = Arc::clone(&bus);
    let forwarded_inner = forwarded.clone();
    bus.subscribe(EventCategory::Storage, move |e| {
        if e.event_type == "storage.cache.cleared" {
            let cb = Arc::clone(&late_cb);
            inner_bus.subscribe(EventCategory::Error, move |ev| cb(ev));
            inner_bus.publish(Event::new(EventCategory::Error, "error.storage"));
            forwarded_inner.fetch_add(1, Ordering::SeqCst);
        }
    });

    bus.publish(Event::new(EventCategory::Storage, "storage.cache.cleared"));

    assert_eq!(forwarded.load(Ordering::SeqCst), 1);
    // Subscribed before the nested publish, so it saw that event.
    assert_eq!(late.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriber_count(), 2);
}

#[test]
fn test_callback_may_unsubscribe_itself() {
    let bus = Arc::new(EventBus::new());
    let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
    let calls = Arc::new(AtomicUsize::new(0));

    let inner_bus = Arc::clone(&bus);
    let inner_slot = slot.clone();
    let inner_calls = calls.clone();
    let id = bus.subscribe_all(move |_| {
        inner_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = *inner_slot.lock() {
            inner_bus.unsubscribe(id);
        }
    });
    *slot.lock() = Some(id);

    bus.publish(Event::new(EventCategory::Sdk, "a"));
    bus.publish(Event::new(EventCategory::Sdk, "b"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_single_thread_order_preserved() {
    let bus = Arc::new(EventBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe_all(move |e| sink.lock().push(e.payload["seq"].as_u64().unwrap_or(u64::MAX)));

    let publishers: Vec<_> = (0..4u64)
        .map(|t| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for i in 0..100u64 {
                    bus.publish(
                        Event::new(EventCategory::Sdk, "sdk.tick")
                            .with_payload(serde_json::json!({ "seq": t * 1_000 + i })),
                    );
                }
            })
        })
        .collect();
    for p in publishers {
        p.join().unwrap();
    }

    let seen = seen.lock();
    assert_eq!(seen.len(), 400);
    for t in 0..4u64 {
        let from_thread: Vec<_> = seen.iter().copied().filter(|s| s / 1_000 == t).collect();
        let mut sorted = from_thread.clone();
        sorted.sort_unstable();
        assert_eq!(from_thread, sorted, "thread {t} events out of order");
    }
}

#[test]
fn test_correlation_id_passes_through() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    bus.subscribe_all(move |e| *sink.lock() = e.correlation_id.clone());

    bus.publish(Event::new(EventCategory::Model, "model.will_load").with_correlation_id("abc"));
    assert_eq!(seen.lock().as_deref(), Some("abc"));
}

#[test]
fn test_clear_removes_all_subscribers() {
    let bus = EventBus::new();
    let (count, callback) = counter();
    bus.subscribe_all(callback);
    bus.clear();

    assert_eq!(bus.publish(Event::new(EventCategory::Sdk, "sdk.x")), 0);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}
