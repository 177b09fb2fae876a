//! Process-wide fan-out hub for published payloads.
//!
//! Each subscriber gets a bounded queue. `publish` never waits: a subscriber
//! whose queue is full is disconnected, so one stalled client cannot hold up
//! the tracker or anyone else. Subscriptions unregister themselves on drop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc::{self, error::TrySendError};

/// Published payload, shared between all subscriber queues.
pub type Payload = Arc<[u8]>;

pub type SubscriberId = u64;

/// Outcome of a single `publish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReport {
    pub delivered: usize,
    /// Subscribers dropped because their queue was full.
    pub evicted: usize,
}

struct Hub {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Payload>>>,
    next_id: AtomicU64,
    capacity: usize,
    closed: AtomicBool,
}

impl Hub {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<Payload>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    hub: Arc<Hub>,
}

impl Broadcaster {
    /// New hub with `capacity` queued payloads per subscriber.
    pub fn new(capacity: usize) -> Self {
        Broadcaster {
            hub: Arc::new(Hub {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a subscriber. It only sees payloads published from now on.
    ///
    /// After `close`, the returned subscription is already finished.
    pub fn subscribe(&self) -> Subscription {
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.hub.capacity);

        let mut subscribers = self.hub.subscribers();
        if !self.hub.closed.load(Ordering::Acquire) {
            subscribers.insert(id, tx);
        }
        drop(subscribers);

        tracing::debug!(subscriber = id, "subscribed");
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.hub),
        }
    }

    /// Remove a subscriber. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        remove(&self.hub, id)
    }

    /// Offer `payload` to every subscriber without waiting.
    pub fn publish(&self, payload: impl Into<Payload>) -> PublishReport {
        let payload = payload.into();
        let mut report = PublishReport::default();
        let mut subscribers = self.hub.subscribers();

        subscribers.retain(|id, tx| match tx.try_send(payload.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(subscriber = *id, "subscriber queue full, disconnecting");
                report.evicted += 1;
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });

        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscribers().len()
    }

    /// Drop every subscriber and refuse new ones. Open streams end.
    pub fn close(&self) {
        self.hub.closed.store(true, Ordering::Release);
        let mut subscribers = self.hub.subscribers();
        let n = subscribers.len();
        subscribers.clear();
        tracing::info!(subscribers = n, "broadcaster closed");
    }
}

fn remove(hub: &Hub, id: SubscriberId) -> bool {
    let removed = hub.subscribers().remove(&id).is_some();
    if removed {
        tracing::debug!(subscriber = id, "unsubscribed");
    }
    removed
}

/// Receive side of a subscription. Unsubscribes when dropped.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Payload>,
    hub: Weak<Hub>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next payload, or `None` once the subscriber was removed and drained.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    /// Next queued payload without waiting.
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            remove(&hub, self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn text(p: Option<Payload>) -> Option<String> {
        p.map(|p| String::from_utf8(p.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_fan_out_to_all() {
        let hub = Broadcaster::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let report = hub.publish(&b"hello"[..]);
        assert_eq!(report.delivered, 2);
        assert_eq!(text(a.recv().await).as_deref(), Some("hello"));
        assert_eq!(text(b.recv().await).as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_unsubscribed_gets_nothing() {
        let hub = Broadcaster::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert!(hub.unsubscribe(b.id()));
        hub.publish(&b"only a"[..]);

        assert_eq!(text(a.recv().await).as_deref(), Some("only a"));
        assert_eq!(b.recv().await, None);
    }

    #[test]
    fn test_unsubscribe_idempotent() {
        let hub = Broadcaster::new(8);
        let a = hub.subscribe();
        assert!(hub.unsubscribe(a.id()));
        assert!(!hub.unsubscribe(a.id()));
        drop(a);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub = Broadcaster::new(8);
        let a = hub.subscribe();
        let _b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);
        drop(a);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_late_joiner_sees_no_history() {
        let hub = Broadcaster::new(8);
        hub.publish(&b"before"[..]);
        let mut late = hub.subscribe();
        assert!(late.try_recv().is_none());

        hub.publish(&b"after"[..]);
        assert_eq!(text(late.try_recv()).as_deref(), Some("after"));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = Broadcaster::new(8);
        assert_eq!(hub.publish(&b"x"[..]), PublishReport::default());
    }

    #[test]
    fn test_slow_subscriber_evicted() {
        let hub = Broadcaster::new(2);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        for i in 0..3 {
            hub.publish(format!("{i}").into_bytes());
            // fast keeps up
            assert!(fast.try_recv().is_some());
        }

        assert_eq!(hub.subscriber_count(), 1);
        // slow still drains what was queued, then ends
        assert_eq!(text(slow.try_recv()).as_deref(), Some("0"));
        assert_eq!(text(slow.try_recv()).as_deref(), Some("1"));
        assert!(slow.try_recv().is_none());

        let report = hub.publish(&b"3"[..]);
        assert_eq!(report, PublishReport { delivered: 1, evicted: 0 });
    }

    #[test]
    fn test_eviction_reported() {
        let hub = Broadcaster::new(1);
        let _stalled = hub.subscribe();
        assert_eq!(hub.publish(&b"a"[..]).delivered, 1);
        assert_eq!(hub.publish(&b"b"[..]), PublishReport { delivered: 0, evicted: 1 });
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let hub = Broadcaster::new(8);
        let mut a = hub.subscribe();
        hub.close();

        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(a.recv().await, None);

        let mut late = hub.subscribe();
        assert_eq!(late.recv().await, None);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_outlives_hub() {
        let hub = Broadcaster::new(8);
        let a = hub.subscribe();
        drop(hub);
        drop(a);
    }
}
