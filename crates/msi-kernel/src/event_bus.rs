//! Topic-prefix publish/subscribe.
//!
//! Matching is a literal `starts_with` on the topic string, not segment aware:
//! `sensor` does not reach a `sensor/` subscription. Every subscription owns a
//! bounded queue; publish never blocks and a full queue drops the event for
//! that subscriber only. Delivery is at-most-once regardless of the requested
//! QoS.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use msi_types::{Event, SubId};
use parking_lot::RwLock;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, trace};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Single `key=value` equality test on event metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    raw: String,
    pair: Option<(String, String)>,
}

impl EventFilter {
    /// Splits on the first `=`. A filter without `=` is kept but matches
    /// everything.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let pair = raw
            .split_once('=')
            .map(|(k, v)| (k.to_string(), v.to_string()));
        Self { raw, pair }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, event: &Event) -> bool {
        match &self.pair {
            Some((key, value)) => event.meta.get(key) == Some(value),
            None => true,
        }
    }
}

struct Subscription {
    id: SubId,
    prefix: String,
    filter: Option<EventFilter>,
    tx: mpsc::Sender<Event>,
    rx: Arc<AsyncMutex<mpsc::Receiver<Event>>>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Subscription {
    fn accepts(&self, event: &Event) -> bool {
        event.topic.starts_with(self.prefix.as_str())
            && self.filter.as_ref().is_none_or(|f| f.matches(event))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub id: SubId,
    pub prefix: String,
    pub filter: Option<String>,
    pub dropped: u64,
}

/// Consumer side of a subscription. Cloning shares the same queue; waiters
/// take turns in FIFO order.
#[derive(Clone)]
pub struct SubscriptionReceiver {
    id: SubId,
    rx: Arc<AsyncMutex<mpsc::Receiver<Event>>>,
}

impl std::fmt::Debug for SubscriptionReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionReceiver")
            .field("id", &self.id)
            .finish()
    }
}

impl SubscriptionReceiver {
    pub fn id(&self) -> &SubId {
        &self.id
    }

    /// Next event, or `None` once the subscription is closed and drained.
    pub async fn recv(&self) -> Option<Event> {
        self.rx.lock().await.recv().await
    }

    /// Like [`recv`](Self::recv) but resolves to `None` when the timeout
    /// elapses first.
    pub async fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn try_recv(&self) -> Option<Event> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }
}

type SubscriptionList = Arc<Vec<Arc<Subscription>>>;

pub struct EventBus {
    subscriptions: RwLock<SubscriptionList>,
    capacity: usize,
    dropped_total: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscriptions: RwLock::new(Arc::new(Vec::new())),
            capacity: capacity.max(1),
            dropped_total: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(
        &self,
        prefix: impl Into<String>,
        filter: Option<&str>,
    ) -> (SubId, SubscriptionReceiver) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let rx = Arc::new(AsyncMutex::new(rx));
        let sub = Arc::new(Subscription {
            id: SubId::generate(),
            prefix: prefix.into(),
            filter: filter.map(EventFilter::parse),
            tx,
            rx: rx.clone(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        });
        debug!(sub = %sub.id, prefix = %sub.prefix, "subscription created");
        let receiver = SubscriptionReceiver {
            id: sub.id.clone(),
            rx,
        };
        let id = sub.id.clone();

        let mut guard = self.subscriptions.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(sub);
        *guard = Arc::new(next);
        (id, receiver)
    }

    /// Routes an event to every matching subscription and returns how many
    /// queues accepted it.
    pub fn publish(&self, event: &Event) -> usize {
        let snapshot = self.snapshot();
        let mut delivered = 0;
        for sub in snapshot.iter() {
            if sub.closed.load(Ordering::Acquire) || !sub.accepts(event) {
                continue;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    sub.dropped.fetch_add(1, Ordering::Relaxed);
                    self.dropped_total.fetch_add(1, Ordering::Relaxed);
                    trace!(sub = %sub.id, topic = %event.topic, "queue full; event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    pub fn channel_for(&self, sub: &SubId) -> Option<SubscriptionReceiver> {
        self.find(sub).map(|s| SubscriptionReceiver {
            id: s.id.clone(),
            rx: s.rx.clone(),
        })
    }

    pub fn subscription(&self, sub: &SubId) -> Option<SubscriptionInfo> {
        self.find(sub).map(|s| SubscriptionInfo {
            id: s.id.clone(),
            prefix: s.prefix.clone(),
            filter: s.filter.as_ref().map(|f| f.as_str().to_string()),
            dropped: s.dropped.load(Ordering::Relaxed),
        })
    }

    /// Removes the subscription. Queued events stay readable; afterwards
    /// waiters see `None`.
    pub fn unsubscribe(&self, sub: &SubId) -> bool {
        let removed = {
            let mut guard = self.subscriptions.write();
            let Some(pos) = guard.iter().position(|s| &s.id == sub) else {
                return false;
            };
            let mut next: Vec<_> = guard.iter().cloned().collect();
            let removed = next.remove(pos);
            *guard = Arc::new(next);
            removed
        };
        removed.closed.store(true, Ordering::Release);
        debug!(sub = %sub, "subscription removed");
        true
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        let old = std::mem::replace(&mut *self.subscriptions.write(), Arc::new(Vec::new()));
        for sub in old.iter() {
            sub.closed.store(true, Ordering::Release);
        }
    }

    fn snapshot(&self) -> SubscriptionList {
        self.subscriptions.read().clone()
    }

    fn find(&self, sub: &SubId) -> Option<Arc<Subscription>> {
        self.snapshot().iter().find(|s| &s.id == sub).cloned()
    }
}
