//! Fan-out of line events to live subscribers
//!
//! Every subscriber owns a bounded queue. Publishing never waits on a
//! subscriber: when a queue is full the event is dropped for that subscriber
//! only, and the drop is counted. Subscribers that went away are pruned on
//! the next publish. There is no replay; a new subscriber only sees events
//! published after it subscribed.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::event::LineEvent;

/// Default per-subscriber queue depth
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 1024;

struct Inner {
    subscribers: RwLock<HashMap<Uuid, mpsc::Sender<Arc<LineEvent>>>>,
    buffer: usize,
    dropped: AtomicU64,
}

/// Cheaply cloneable handle to the subscriber set
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<Inner>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscribers", &self.subscriber_count())
            .field("buffer", &self.inner.buffer)
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl EventBroadcaster {
    /// Create a broadcaster whose subscribers each queue up to `buffer` events
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: RwLock::new(HashMap::new()),
                buffer: buffer.max(1),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new subscriber
    ///
    /// The subscriber is removed again when the returned handle is dropped.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let id = Uuid::new_v4();
        self.inner.subscribers.write().insert(id, tx);
        tracing::debug!("subscriber {} connected", id);

        Subscription {
            id,
            rx,
            broadcaster: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber by id. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        unsubscribe(&self.inner, id)
    }

    /// Deliver `event` to every current subscriber
    ///
    /// Returns how many subscribers accepted the event.
    pub fn publish(&self, event: LineEvent) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let subscribers = self.inner.subscribers.read();
            for (id, tx) in subscribers.iter() {
                match tx.try_send(Arc::clone(&event)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!("subscriber {} is full, dropping event", id);
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.inner.subscribers.write();
            for id in closed {
                subscribers.remove(&id);
            }
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Total events dropped because a subscriber's queue was full
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

fn unsubscribe(inner: &Inner, id: Uuid) -> bool {
    let removed = inner.subscribers.write().remove(&id).is_some();
    if removed {
        tracing::debug!("subscriber {} disconnected", id);
    }
    removed
}

/// A live subscription to the event stream
///
/// Events arrive in publish order. Also usable as a [`Stream`].
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<Arc<LineEvent>>,
    broadcaster: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next event. Returns None once the broadcaster is gone
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<LineEvent>> {
        self.rx.recv().await
    }

    /// Take the next queued event without waiting
    pub fn try_recv(&mut self) -> Option<Arc<LineEvent>> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Arc<LineEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.broadcaster.upgrade() {
            unsubscribe(&inner, self.id);
        }
    }
}
