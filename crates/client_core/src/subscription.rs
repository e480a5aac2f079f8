use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::OwnerId;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    applier::ChangeEvent,
    error::SubscriptionError,
    store::{RemoteFeed, RemoteStore},
};

/// Consumer of remote change events, typically the session's collection.
#[async_trait]
pub trait ChangeSink: Send + Sync + 'static {
    async fn deliver(&self, event: ChangeEvent);

    /// The remote feed ended on its own; nothing more will be delivered
    /// until the owner is started again. Not called after `stop`.
    async fn closed(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyActive,
    Replaced { previous: OwnerId },
}

struct ActiveSubscription {
    owner_id: OwnerId,
    pump: JoinHandle<()>,
}

/// Owns the single live change feed for the signed-in owner.
pub struct SubscriptionManager {
    store: Arc<dyn RemoteStore>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            active: Mutex::new(None),
        }
    }

    /// Starting again for the owner that is already live is a no-op and keeps
    /// the first sink. A different owner replaces the running feed, which
    /// is fully torn down before the new one is requested.
    pub async fn start(
        &self,
        owner_id: OwnerId,
        sink: Arc<dyn ChangeSink>,
    ) -> Result<StartOutcome, SubscriptionError> {
        let mut active = self.active.lock().await;

        let mut previous = None;
        if let Some(current) = active.take() {
            if current.owner_id == owner_id && !current.pump.is_finished() {
                *active = Some(current);
                return Ok(StartOutcome::AlreadyActive);
            }
            previous = Some(current.owner_id);
            teardown(current).await;
        }

        let feed = self
            .store
            .subscribe(owner_id)
            .await
            .map_err(|source| SubscriptionError::Establish { owner_id, source })?;
        let pump = tokio::spawn(pump_feed(owner_id, feed, sink));
        *active = Some(ActiveSubscription { owner_id, pump });
        info!(owner_id = owner_id.0, "subscription: change feed live");

        Ok(match previous {
            Some(previous) if previous != owner_id => StartOutcome::Replaced { previous },
            _ => StartOutcome::Started,
        })
    }

    /// Once this returns, the sink passed to `start` receives nothing more.
    pub async fn stop(&self) -> bool {
        let mut active = self.active.lock().await;
        let Some(current) = active.take() else {
            return false;
        };
        let owner_id = current.owner_id;
        teardown(current).await;
        info!(owner_id = owner_id.0, "subscription: change feed stopped");
        true
    }

    pub async fn active_owner(&self) -> Option<OwnerId> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|current| !current.pump.is_finished())
            .map(|current| current.owner_id)
    }
}

// Awaiting the aborted pump means any delivery that was mid-flight has
// either completed or been cancelled before we return.
async fn teardown(subscription: ActiveSubscription) {
    subscription.pump.abort();
    let _ = subscription.pump.await;
}

async fn pump_feed(owner_id: OwnerId, mut feed: RemoteFeed, sink: Arc<dyn ChangeSink>) {
    while let Some(change) = feed.recv().await {
        sink.deliver(ChangeEvent::remote(change)).await;
    }
    warn!(owner_id = owner_id.0, "subscription: remote feed closed");
    sink.closed().await;
}

#[cfg(test)]
#[path = "tests/subscription_tests.rs"]
mod tests;
