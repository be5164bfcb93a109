//! Fan-out of status broadcasts to a churning set of subscribers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How long a single subscriber write may take before the subscriber is
/// considered dead.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-subscriber channel capacity.
pub const SUBSCRIBER_BUFFER: usize = 16;

/// Handle identifying a registered subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// Broadcasts serialized status messages to registered subscribers.
///
/// A subscriber is an opaque bounded channel sender; the transport behind
/// it (a WebSocket, a test harness) drains the receiving side. Subscribers
/// whose writes fail or time out are evicted at the end of the broadcast.
pub struct StatusHub {
    subscribers: RwLock<BTreeMap<SubscriberId, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

impl StatusHub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Adds a subscriber and returns its handle together with the channel
    /// the transport should drain.
    pub fn register(&self) -> (SubscriberId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.write().insert(id, tx);
        debug!(subscriber = id.0, "hub subscriber registered");
        (id, rx)
    }

    pub fn unregister(&self, id: SubscriberId) {
        if self.subscribers.write().remove(&id).is_some() {
            debug!(subscriber = id.0, "hub subscriber unregistered");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Serializes the message once and writes it to every subscriber with
    /// a bounded deadline. Safe to call concurrently with registration and
    /// with other broadcasts.
    pub async fn broadcast<T: Serialize>(&self, message: &T) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to serialize broadcast message");
                return;
            }
        };

        let targets: Vec<(SubscriberId, mpsc::Sender<String>)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut failed = Vec::new();
        for (id, tx) in targets {
            if tx
                .send_timeout(payload.clone(), WRITE_TIMEOUT)
                .await
                .is_err()
            {
                failed.push(id);
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in &failed {
                subscribers.remove(id);
            }
            warn!(evicted = failed.len(), "evicted unresponsive subscribers");
        }
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new()
    }
}
