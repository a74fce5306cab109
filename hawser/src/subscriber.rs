//! Subscriptions and their delivery queues.
//!
//! Every subscription owns a FIFO queue of `(topic, event)` pairs fed by the
//! endpoint's fan-out path and drained by the application through
//! [`Subscriber::recv`] / [`Subscriber::try_recv`]. Waiting is waker-based:
//! the queue wakes parked consumers when a message arrives or when the queue
//! closes, and a closed, drained queue yields `None` as the
//! end-of-subscription signal.
//!
//! Queues are unbounded unless a [`QueuePolicy`] bound is configured. The
//! delivery path never blocks, so a full bounded queue sheds load by
//! dropping (oldest or newest), counting every drop.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use hawser_core::{Event, Topic};
use serde::{Deserialize, Serialize};

/// Capacity policy for a subscription queue.
///
/// The delivering path is a connection task that must never park, so a
/// bounded queue sheds messages instead of exerting backpressure on the
/// publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueuePolicy {
    /// No bound; the application is expected to consume promptly.
    #[default]
    Unbounded,
    /// Keep at most this many messages, discarding the oldest on overflow.
    DropOldest(usize),
    /// Keep at most this many messages, discarding new arrivals on overflow.
    DropNewest(usize),
}

/// FIFO delivery queue shared between the fan-out path and one subscriber.
pub(crate) struct SubscriberQueue {
    inner: RefCell<QueueInner>,
    policy: QueuePolicy,
}

struct QueueInner {
    items: VecDeque<(Topic, Event)>,
    wakers: Vec<Waker>,
    closed: bool,
    delivered: u64,
    dropped: u64,
}

impl SubscriberQueue {
    fn new(policy: QueuePolicy) -> Self {
        Self {
            inner: RefCell::new(QueueInner {
                items: VecDeque::new(),
                wakers: Vec::new(),
                closed: false,
                delivered: 0,
                dropped: 0,
            }),
            policy,
        }
    }

    /// Append a message, applying the capacity policy, and wake waiters.
    /// Messages pushed after close are discarded.
    fn push(&self, topic: Topic, event: Event) {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return;
        }

        match self.policy {
            QueuePolicy::Unbounded => {}
            QueuePolicy::DropOldest(bound) => {
                if inner.items.len() >= bound.max(1) {
                    inner.items.pop_front();
                    inner.dropped += 1;
                    tracing::trace!(topic = %topic, "queue full, dropping oldest message");
                }
            }
            QueuePolicy::DropNewest(bound) => {
                if inner.items.len() >= bound.max(1) {
                    inner.dropped += 1;
                    tracing::trace!(topic = %topic, "queue full, dropping new message");
                    return;
                }
            }
        }

        inner.items.push_back((topic, event));
        inner.delivered += 1;
        for waker in inner.wakers.drain(..) {
            waker.wake();
        }
    }

    fn try_pop(&self) -> Option<(Topic, Event)> {
        self.inner.borrow_mut().items.pop_front()
    }

    /// Close the queue and wake every waiter so it can observe the end.
    /// Already-queued messages stay drainable.
    fn close(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.closed = true;
        for waker in inner.wakers.drain(..) {
            waker.wake();
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    fn delivered(&self) -> u64 {
        self.inner.borrow().delivered
    }

    fn dropped(&self) -> u64 {
        self.inner.borrow().dropped
    }
}

/// Shared set of live subscriptions, consulted on every delivery.
///
/// Registration order is preserved so local fan-out is deterministic.
pub(crate) struct SubscriptionRegistry {
    next_id: u64,
    entries: Vec<RegistryEntry>,
}

struct RegistryEntry {
    id: u64,
    topic: Topic,
    queue: Rc<SubscriberQueue>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Register a subscription and hand back its consumer handle.
    pub(crate) fn register(
        registry: &Rc<RefCell<Self>>,
        topic: Topic,
        policy: QueuePolicy,
    ) -> Subscriber {
        let queue = Rc::new(SubscriberQueue::new(policy));
        let mut inner = registry.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push(RegistryEntry {
            id,
            topic: topic.clone(),
            queue: queue.clone(),
        });
        Subscriber {
            id,
            topic,
            queue,
            registry: Rc::downgrade(registry),
        }
    }

    fn deregister(&mut self, id: u64) {
        self.entries.retain(|entry| entry.id != id);
    }

    /// Deliver one message to every matching subscription, each getting its
    /// own copy. Returns how many queues were fed.
    pub(crate) fn deliver(&self, topic: &Topic, event: &Event) -> usize {
        let mut matched = 0;
        for entry in &self.entries {
            if entry.topic.matches(topic) {
                entry.queue.push(topic.clone(), event.clone());
                matched += 1;
            }
        }
        matched
    }

    /// Close every queue and forget the entries; used at endpoint shutdown.
    pub(crate) fn close_all(&mut self) {
        for entry in &self.entries {
            entry.queue.close();
        }
        self.entries.clear();
    }

    /// Deduplicated list of currently subscribed topics, for interest
    /// advertisements.
    pub(crate) fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.entries.iter().map(|e| e.topic.clone()).collect();
        topics.sort();
        topics.dedup();
        topics
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Consumer handle for one subscription.
///
/// Dropping the handle unsubscribes: the endpoint stops delivering into the
/// queue and any task parked in [`Subscriber::recv`] on a shared handle is
/// woken with `None`.
pub struct Subscriber {
    id: u64,
    topic: Topic,
    queue: Rc<SubscriberQueue>,
    registry: Weak<RefCell<SubscriptionRegistry>>,
}

impl Subscriber {
    /// The subscribed topic prefix.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Wait for the next message.
    ///
    /// Resolves to `Some((topic, event))` in FIFO delivery order, or `None`
    /// once the subscription is closed and drained — the end-of-subscription
    /// signal, not an error.
    pub fn recv(&self) -> RecvFuture<'_> {
        RecvFuture { queue: &self.queue }
    }

    /// Take the next message if one is already queued.
    ///
    /// `None` means "nothing right now" while the subscription is open;
    /// check [`Subscriber::is_closed`] to distinguish the end of the stream.
    pub fn try_recv(&self) -> Option<(Topic, Event)> {
        self.queue.try_pop()
    }

    /// Whether the subscription has been closed (endpoint shutdown).
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.queue.len() == 0
    }

    /// Total messages delivered into the queue so far.
    pub fn delivered(&self) -> u64 {
        self.queue.delivered()
    }

    /// Messages discarded by the capacity policy.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().deregister(self.id);
        }
        self.queue.close();
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("topic", &self.topic)
            .field("queued", &self.queue.len())
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}

/// Future returned by [`Subscriber::recv`].
pub struct RecvFuture<'a> {
    queue: &'a SubscriberQueue,
}

impl Future for RecvFuture<'_> {
    type Output = Option<(Topic, Event)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.queue.inner.borrow_mut();

        if let Some(item) = inner.items.pop_front() {
            return Poll::Ready(Some(item));
        }

        if inner.closed {
            return Poll::Ready(None);
        }

        inner.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}
