use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

const CHANNEL_CAPACITY: usize = 64;

/// Publish/subscribe transport keyed by entity name.
///
/// Events carry no payload. `observe` must subscribe before it returns so
/// that a post issued right after it is not lost.
pub trait NotificationBus: Send + Sync {
    fn post(&self, key: &str);
    fn observe(&self, key: &str) -> BoxStream<'static, ()>;
}

/// One tokio broadcast channel per key, created on first use
pub struct BroadcastBus {
    channels: RwLock<HashMap<String, broadcast::Sender<()>>>,
    posted: AtomicU64,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            posted: AtomicU64::new(0),
        }
    }

    fn sender(&self, key: &str) -> broadcast::Sender<()> {
        if let Some(sender) = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return sender.clone();
        }

        // double-checked: another thread may have created it meanwhile
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Total posts since creation
    pub fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }

    /// Live subscribers on `key`
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus for BroadcastBus {
    fn post(&self, key: &str) {
        self.posted.fetch_add(1, Ordering::Relaxed);
        // no receivers is not an error
        let _ = self.sender(key).send(());
    }

    fn observe(&self, key: &str) -> BoxStream<'static, ()> {
        let receiver = self.sender(key).subscribe();
        stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                // a lagged receiver still knows something changed
                Ok(()) | Err(RecvError::Lagged(_)) => Some(((), receiver)),
                Err(RecvError::Closed) => None,
            }
        })
        .boxed()
    }
}
