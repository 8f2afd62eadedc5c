use std::{
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_channel::{Receiver, Sender, TrySendError};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// The receiving end of a subscription. Values arrive in the order they were published.
#[derive(Debug)]
pub struct Subscription<T> {
    handle: SubscriptionHandle,
    receiver: Receiver<Arc<T>>,
}

/// Distributes every published value to all active subscriptions.
///
/// Each subscription has its own bounded queue. A subscriber whose queue is full, or whose
/// receiver is gone, is dropped on the spot so it can never hold back delivery to the others.
pub struct Publisher<T> {
    inner: Arc<Mutex<Inner<T>>>,
    buffer_size: usize,
}

struct Inner<T> {
    next_id: u64,
    subscribers: Vec<Subscriber<T>>,
}

struct Subscriber<T> {
    handle: SubscriptionHandle,
    sender: Sender<Arc<T>>,
}

impl Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<T> Subscription<T> {
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Returns `None` once the subscription has been removed and its queue is drained.
    pub async fn recv(&self) -> Option<Arc<T>> {
        self.receiver.recv().await.ok()
    }

    pub fn try_recv(&self) -> Option<Arc<T>> {
        self.receiver.try_recv().ok()
    }
}

impl<T> Publisher<T> {
    pub fn new(buffer_size: usize) -> Publisher<T> {
        Publisher {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                subscribers: Vec::new(),
            })),
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (sender, receiver) = async_channel::bounded(self.buffer_size);
        let mut inner = self.lock();

        let handle = SubscriptionHandle(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.push(Subscriber { handle, sender });

        info!(subscription = %handle, total = inner.subscribers.len(), "subscribed");
        Subscription { handle, receiver }
    }

    /// Returns `false` if the handle was not subscribed, which makes repeated calls harmless.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| {
            if s.handle == handle {
                s.sender.close();
                false
            } else {
                true
            }
        });

        let removed = before != inner.subscribers.len();
        if removed {
            info!(subscription = %handle, total = inner.subscribers.len(), "unsubscribed");
        }
        removed
    }

    /// Delivers `value` to every subscription and returns the number of successful deliveries.
    pub fn publish(&self, value: T) -> usize {
        let value = Arc::new(value);
        let mut inner = self.lock();
        let mut delivered = 0;

        inner
            .subscribers
            .retain(|s| match s.sender.try_send(Arc::clone(&value)) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(subscription = %s.handle, "subscriber is lagging behind, dropping it");
                    s.sender.close();
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    info!(subscription = %s.handle, "subscriber went away, dropping it");
                    false
                }
            });

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Publisher {
            inner: Arc::clone(&self.inner),
            buffer_size: self.buffer_size,
        }
    }
}
