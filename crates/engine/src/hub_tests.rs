// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jv_core::LogLines;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn logs(line: &str) -> HubEvent {
    HubEvent::Logs(LogLines { lines: vec![line.to_string()], reset: false })
}

fn collector() -> (SendFn, Arc<parking_lot::Mutex<Vec<String>>>) {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let send: SendFn = Box::new(move |event| {
        if let HubEvent::Logs(lines) = event {
            sink.lock().extend(lines.lines.iter().cloned());
        }
        Ok(())
    });
    (send, seen)
}

#[test]
fn broadcast_reaches_every_subscriber() {
    let hub = EventHub::new();
    let (a, seen_a) = collector();
    let (b, seen_b) = collector();
    hub.add_subscriber(a);
    hub.add_subscriber(b);

    hub.broadcast(&logs("one"));

    assert_eq!(*seen_a.lock(), vec!["one".to_string()]);
    assert_eq!(*seen_b.lock(), vec!["one".to_string()]);
}

#[test]
fn subscriber_ids_are_monotonic() {
    let hub = EventHub::new();
    let (a, _) = collector();
    let (b, _) = collector();
    let first = hub.add_subscriber(a);
    let second = hub.add_subscriber(b);
    assert!(second > first);
}

#[test]
fn failing_subscriber_does_not_interrupt_delivery() {
    let hub = EventHub::new();
    let failures = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&failures);
    hub.add_subscriber(Box::new(move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
        Err(())
    }));
    let (ok, seen) = collector();
    hub.add_subscriber(ok);

    hub.broadcast(&logs("x"));
    hub.broadcast(&logs("y"));

    assert_eq!(failures.load(Ordering::Relaxed), 2);
    assert_eq!(*seen.lock(), vec!["x".to_string(), "y".to_string()]);
}

#[test]
fn removed_subscriber_stops_receiving() {
    let hub = EventHub::new();
    let (a, seen) = collector();
    let id = hub.add_subscriber(a);

    hub.broadcast(&logs("before"));
    hub.remove_subscriber(id);
    hub.broadcast(&logs("after"));

    assert_eq!(*seen.lock(), vec!["before".to_string()]);
    assert_eq!(hub.subscriber_count(), 0);
}

#[test]
fn remove_unknown_subscriber_is_fine() {
    let hub = EventHub::new();
    hub.remove_subscriber(42);
}

#[test]
fn send_to_targets_one_subscriber() {
    let hub = EventHub::new();
    let (a, seen_a) = collector();
    let (b, seen_b) = collector();
    let id_a = hub.add_subscriber(a);
    hub.add_subscriber(b);

    hub.send_to(id_a, &logs("direct"));

    assert_eq!(*seen_a.lock(), vec!["direct".to_string()]);
    assert!(seen_b.lock().is_empty());
}

#[test]
fn delivery_preserves_submission_order_per_subscriber() {
    let hub = EventHub::new();
    let (a, seen) = collector();
    hub.add_subscriber(a);

    for i in 0..20 {
        hub.broadcast(&logs(&format!("line-{i}")));
    }

    let got = seen.lock().clone();
    let expected: Vec<String> = (0..20).map(|i| format!("line-{i}")).collect();
    assert_eq!(got, expected);
}
