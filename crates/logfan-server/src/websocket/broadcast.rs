//! Payload fan-out to connected subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use logfan_core::SubscriberId;
use logfan_emitter::{EmitterError, PayloadSink};
use metrics::counter;
use parking_lot::RwLock;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

use crate::metrics::HUB_PAYLOAD_DROPS_TOTAL;

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Default)]
struct HubState {
    /// `None` once the hub is closed; the entry stays until the session
    /// removes itself.
    subscribers: HashMap<SubscriberId, Option<mpsc::Sender<Bytes>>>,
    closed: bool,
}

/// Hands every published payload to each registered subscriber's queue.
///
/// Publishing never blocks: a full subscriber queue drops the payload for
/// that subscriber only. Closing the hub closes every queue, which ends
/// each session with `UpstreamExhausted`.
pub struct SubscriberHub {
    state: RwLock<HubState>,
    capacity: usize,
    dropped: AtomicU64,
    emptied: Notify,
}

impl SubscriberHub {
    /// Create a hub whose subscriber queues hold `capacity` payloads.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            emptied: Notify::new(),
        }
    }

    /// Register a subscriber and return its payload queue.
    ///
    /// After [`close`](Self::close) the returned queue is already closed.
    pub fn register(&self) -> (SubscriberId, mpsc::Receiver<Bytes>) {
        let mut state = self.state.write();
        self.insert(&mut state)
    }

    /// Register a subscriber unless `max` are already registered.
    ///
    /// The check and the insert happen under one lock, so concurrent
    /// callers can never push the count past `max`.
    pub fn try_register(&self, max: usize) -> Option<(SubscriberId, mpsc::Receiver<Bytes>)> {
        let mut state = self.state.write();
        if state.subscribers.len() >= max {
            return None;
        }
        Some(self.insert(&mut state))
    }

    fn insert(&self, state: &mut HubState) -> (SubscriberId, mpsc::Receiver<Bytes>) {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(self.capacity);
        let sender = (!state.closed).then_some(tx);
        let _ = state.subscribers.insert(id.clone(), sender);
        debug!(subscriber_id = %id, subscribers = state.subscribers.len(), "subscriber registered");
        (id, rx)
    }

    /// Forget a subscriber once its session has ended.
    pub fn remove(&self, id: &SubscriberId) {
        let mut state = self.state.write();
        if state.subscribers.remove(id).is_some() {
            debug!(subscriber_id = %id, subscribers = state.subscribers.len(), "subscriber removed");
        }
        if state.subscribers.is_empty() {
            self.emptied.notify_waiters();
        }
    }

    /// Offer `payload` to every subscriber. Returns how many accepted it.
    pub fn publish(&self, payload: &Bytes) -> usize {
        let state = self.state.read();
        let mut accepted = 0;
        for (id, sender) in &state.subscribers {
            let Some(sender) = sender else { continue };
            match sender.try_send(payload.clone()) {
                Ok(()) => accepted += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                    counter!(HUB_PAYLOAD_DROPS_TOTAL).increment(1);
                    warn!(subscriber_id = %id, "subscriber queue full, payload dropped");
                }
                // Session already ended; removal is on its way.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        accepted
    }

    /// Close every subscriber queue and refuse further payloads.
    pub fn close(&self) {
        let mut state = self.state.write();
        if state.closed {
            return;
        }
        state.closed = true;
        for sender in state.subscribers.values_mut() {
            *sender = None;
        }
        debug!(subscribers = state.subscribers.len(), "hub closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Subscribers whose sessions have not yet been removed.
    pub fn subscriber_count(&self) -> usize {
        self.state.read().subscribers.len()
    }

    /// Payloads dropped because a subscriber queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Completes once no subscriber remains registered.
    pub async fn drained(&self) {
        loop {
            let emptied = self.emptied.notified();
            if self.subscriber_count() == 0 {
                return;
            }
            emptied.await;
        }
    }
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl PayloadSink for SubscriberHub {
    fn send(&self, payload: Bytes) -> Result<(), EmitterError> {
        if self.is_closed() {
            return Err(EmitterError::QueueClosed);
        }
        let _ = self.publish(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn register_and_remove() {
        let hub = SubscriberHub::new(4);
        let (id, _rx) = hub.register();
        assert_eq!(hub.subscriber_count(), 1);
        hub.remove(&id);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn try_register_stops_at_limit() {
        let hub = SubscriberHub::new(4);
        let (first, _rx1) = hub.try_register(2).unwrap();
        let (_second, _rx2) = hub.try_register(2).unwrap();
        assert!(hub.try_register(2).is_none());
        assert_eq!(hub.subscriber_count(), 2);

        hub.remove(&first);
        assert!(hub.try_register(2).is_some());
    }

    #[test]
    fn concurrent_try_register_never_exceeds_limit() {
        let hub = std::sync::Arc::new(SubscriberHub::new(4));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let hub = std::sync::Arc::clone(&hub);
                std::thread::spawn(move || hub.try_register(3).map(|(id, _rx)| id))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .count();

        assert_eq!(admitted, 3);
        assert_eq!(hub.subscriber_count(), 3);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let hub = SubscriberHub::new(4);
        let (_id, _rx) = hub.register();
        hub.remove(&SubscriberId::from("sub_missing"));
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber_in_order() {
        let hub = SubscriberHub::new(8);
        let (_a, mut rx_a) = hub.register();
        let (_b, mut rx_b) = hub.register();

        for payload in [&b"one"[..], b"two", b"three"] {
            assert_eq!(hub.publish(&Bytes::copy_from_slice(payload)), 2);
        }

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"one"));
            assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"two"));
            assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"three"));
        }
    }

    #[test]
    fn full_queue_drops_for_that_subscriber_only() {
        let hub = SubscriberHub::new(1);
        let (_slow, _slow_rx) = hub.register();
        let (_fast, mut fast_rx) = hub.register();

        assert_eq!(hub.publish(&Bytes::from_static(b"a")), 2);
        let _ = fast_rx.try_recv().unwrap();
        assert_eq!(hub.publish(&Bytes::from_static(b"b")), 1);

        assert_eq!(hub.drop_count(), 1);
        assert_eq!(fast_rx.try_recv().unwrap(), Bytes::from_static(b"b"));
    }

    #[tokio::test]
    async fn close_ends_every_queue_after_buffered_payloads() {
        let hub = SubscriberHub::new(4);
        let (_id, mut rx) = hub.register();
        let _ = hub.publish(&Bytes::from_static(b"last"));
        hub.close();

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"last"));
        assert!(rx.recv().await.is_none());
        assert!(hub.is_closed());
    }

    #[tokio::test]
    async fn register_after_close_yields_closed_queue() {
        let hub = SubscriberHub::new(4);
        hub.close();
        let (_id, mut rx) = hub.register();
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn sink_refuses_after_close() {
        let hub = SubscriberHub::new(4);
        let (_id, _rx) = hub.register();
        assert!(hub.send(Bytes::from_static(b"x")).is_ok());
        hub.close();
        assert_matches!(hub.send(Bytes::from_static(b"x")), Err(EmitterError::QueueClosed));
    }

    #[tokio::test]
    async fn drained_waits_for_last_removal() {
        let hub = Arc::new(SubscriberHub::new(4));
        let (id, _rx) = hub.register();

        let waiter = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.drained().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        hub.remove(&id);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn drained_returns_immediately_when_empty() {
        let hub = SubscriberHub::new(4);
        hub.drained().await;
    }

    #[test]
    fn default_capacity() {
        let hub = SubscriberHub::default();
        let (_id, rx) = hub.register();
        assert_eq!(rx.max_capacity(), DEFAULT_QUEUE_CAPACITY);
    }
}
