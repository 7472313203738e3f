use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

/// Fan-out of cumulative ack numbers observed by the receive path to any number of watchers.
///
/// Each subscriber has its own bounded inbox. Publishing never blocks: if a subscriber's inbox is
///  full, the ack is dropped for that subscriber. A lost ack only delays the affected segment
///  until its next retransmission, which the peer acknowledges again.
pub struct AckBroadcaster {
    next_subscription_id: AtomicU64,
    subscribers: Mutex<FxHashMap<u64, mpsc::Sender<u32>>>,
}

impl AckBroadcaster {
    pub fn new() -> Arc<AckBroadcaster> {
        Arc::new(AckBroadcaster {
            next_subscription_id: AtomicU64::new(0),
            subscribers: Default::default(),
        })
    }

    /// The returned subscription stays registered until it is dropped
    pub fn subscribe(self: &Arc<Self>, inbox_capacity: usize) -> AckSubscription {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let (sender, inbox) = mpsc::channel(inbox_capacity);

        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
            .insert(id, sender);
        trace!("ack subscription {} registered", id);

        AckSubscription {
            id,
            inbox,
            broadcaster: self.clone(),
        }
    }

    pub fn publish(&self, ack: u32) {
        let subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        trace!("publishing ack {} to {} subscribers", ack, subscribers.len());

        for (id, sender) in subscribers.iter() {
            match sender.try_send(ack) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("inbox of ack subscription {} is full - dropping ack {}", id, ack);
                }
                Err(TrySendError::Closed(_)) => {
                    // the subscription is being dropped and will unregister itself
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        trace!("ack subscription {} unregistered", id);
    }
}

pub struct AckSubscription {
    id: u64,
    inbox: mpsc::Receiver<u32>,
    broadcaster: Arc<AckBroadcaster>,
}

impl AckSubscription {
    /// NB: This never returns `None` while the subscription is alive since the broadcaster's
    ///  registry holds the inbox's sender
    pub async fn recv(&mut self) -> Option<u32> {
        self.inbox.recv().await
    }
}

impl Drop for AckSubscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}
