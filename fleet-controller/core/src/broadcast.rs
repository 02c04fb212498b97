//! Fans configuration messages out to every agent subscribed to a group.
//!
//! A publisher waits until each subscriber has acknowledged the message it
//! was handed. Each subscription owns a single-slot acknowledgement channel;
//! dropping the subscription releases any publisher still waiting on it.

use crate::{ApiAction, FileOverview};
use ahash::AHashMap as HashMap;
use futures::future;
use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};
use tokio::sync::{mpsc, Mutex};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    ConfigApply {
        overviews: Vec<FileOverview>,
        version: String,
    },
    ApiAction(ApiAction),
}

#[derive(Clone, Debug, Default)]
pub struct Broadcaster(Arc<Inner>);

/// A subscriber's half of a broadcaster.
///
/// Every message received must be answered with exactly one call to
/// [`Subscription::respond`], or the subscription must be dropped.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    listen: mpsc::Receiver<Message>,
    acks: mpsc::Sender<()>,
    broadcaster: Weak<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<u64, Subscriber>>,
}

#[derive(Clone, Debug)]
struct Subscriber {
    listen: mpsc::Sender<Message>,
    acks: Arc<Mutex<mpsc::Receiver<()>>>,
}

// === impl Broadcaster ===

impl Broadcaster {
    pub fn subscribe(&self) -> Subscription {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        let (listen_tx, listen_rx) = mpsc::channel(1);
        let (acks_tx, acks_rx) = mpsc::channel(1);
        self.0.subscribers.write().insert(
            id,
            Subscriber {
                listen: listen_tx,
                acks: Arc::new(Mutex::new(acks_rx)),
            },
        );
        tracing::debug!(id, "Subscribed");

        Subscription {
            id,
            listen: listen_rx,
            acks: acks_tx,
            broadcaster: Arc::downgrade(&self.0),
        }
    }

    /// Removes a subscription. Cancelling an unknown subscription is a no-op.
    pub fn cancel(&self, id: u64) {
        self.0.cancel(id);
    }

    /// Sends a message to all current subscribers and waits for each of them
    /// to respond.
    ///
    /// Returns true if at least one subscriber received the message.
    pub async fn send(&self, msg: Message) -> bool {
        let subscribers = self
            .0
            .subscribers
            .read()
            .values()
            .cloned()
            .collect::<Vec<_>>();
        if subscribers.is_empty() {
            return false;
        }

        let delivered = future::join_all(
            subscribers
                .into_iter()
                .map(|subscriber| subscriber.deliver(msg.clone())),
        )
        .await;
        delivered.into_iter().any(|d| d)
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subscribers.read().len()
    }
}

// === impl Inner ===

impl Inner {
    fn cancel(&self, id: u64) {
        if self.subscribers.write().remove(&id).is_some() {
            tracing::debug!(id, "Subscription cancelled");
        }
    }
}

// === impl Subscriber ===

impl Subscriber {
    async fn deliver(self, msg: Message) -> bool {
        // Holding the acknowledgement receiver keeps concurrent publishers from
        // interleaving messages to this subscriber.
        let mut acks = self.acks.lock().await;
        if self.listen.send(msg).await.is_err() {
            return false;
        }
        // A closed channel means the subscription was dropped.
        let _ = acks.recv().await;
        true
    }
}

// === impl Subscription ===

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.listen.recv().await
    }

    /// Acknowledges the most recently received message.
    pub fn respond(&self) {
        // The slot is only full if the publisher stopped waiting.
        let _ = self.acks.try_send(());
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.broadcaster.upgrade() {
            inner.cancel(self.id);
        }
    }
}
