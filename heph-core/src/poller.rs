//! Periodic health polling of the managed container set.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::runtime::{ContainerRuntime, ContainerStatus};

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Invoked with every non-empty snapshot of container statuses.
pub type StatusCallback = Box<dyn Fn(BTreeMap<String, ContainerStatus>) + Send + Sync>;

/// Polls the runtime's managed containers on an interval and hands each
/// snapshot to a callback. Per-container failures surface as `Error`
/// status without aborting the tick.
pub struct HealthPoller<R: ContainerRuntime> {
    runtime: Arc<R>,
    interval: Duration,
    callback: StatusCallback,
}

impl<R: ContainerRuntime> HealthPoller<R> {
    pub fn new(runtime: Arc<R>, interval: Duration, callback: StatusCallback) -> Self {
        Self {
            runtime,
            interval,
            callback,
        }
    }

    /// Runs until the shutdown signal flips to true or the sender is
    /// dropped. Intended to be spawned on its own task.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first interval tick fires immediately; skip it so a freshly
        // started poller waits one full period before its first inspect.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("health poller stopping");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }

    async fn poll_once(&self) {
        let ids = self.runtime.managed_ids();
        if ids.is_empty() {
            return;
        }

        let mut statuses = BTreeMap::new();
        for id in ids {
            let status = match self.runtime.health_check(&id).await {
                Ok(status) => status,
                Err(_) => ContainerStatus::Error,
            };
            statuses.insert(id, status);
        }

        if !statuses.is_empty() {
            (self.callback)(statuses);
        }
    }
}
