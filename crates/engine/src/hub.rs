// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event broadcaster.
//!
//! Subscribers are transport adapters (push-streams, sockets) registered
//! as send closures. Delivery is at-most-once per subscriber in
//! submission order; a failing subscriber never interrupts the others;
//! disconnect handling belongs to the transport layer.

use jv_core::HubEvent;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A subscriber's send closure. Errors are swallowed by the hub.
pub type SendFn = Box<dyn Fn(&HubEvent) -> Result<(), ()> + Send + Sync>;

#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<BTreeMap<u64, SendFn>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; the returned id is monotonic and never
    /// reused within the process.
    pub fn add_subscriber(&self, send: SendFn) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, send);
        tracing::debug!(subscriber = id, "subscriber added");
        id
    }

    /// Deregister. Unknown ids are fine (disconnects race removal).
    pub fn remove_subscriber(&self, id: u64) {
        self.subscribers.lock().remove(&id);
        tracing::debug!(subscriber = id, "subscriber removed");
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver to one subscriber. Send errors are swallowed.
    pub fn send_to(&self, id: u64, event: &HubEvent) {
        let subscribers = self.subscribers.lock();
        if let Some(send) = subscribers.get(&id) {
            let _ = send(event);
        }
    }

    /// Deliver to every subscriber. Per-subscriber send errors are
    /// swallowed so one broken pipe cannot starve the rest.
    pub fn broadcast(&self, event: &HubEvent) {
        let subscribers = self.subscribers.lock();
        for (id, send) in subscribers.iter() {
            if send(event).is_err() {
                tracing::trace!(subscriber = id, event = event.name(), "subscriber send failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
