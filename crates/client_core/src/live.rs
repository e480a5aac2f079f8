use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::{Bookmark, BookmarkId, OwnerId};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{
    applier::{apply_change, ApplyOutcome, ChangeEvent, EventSource},
    collection::BookmarkCollection,
    error::{MutationError, StartError},
    gateway::{MutationGateway, PendingMutation},
    store::{Change, RemoteStore},
    subscription::{ChangeSink, SubscriptionManager},
};

const COLLECTION_EVENT_BUFFER: usize = 256;

/// Notifications for presentation layers that re-render on change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent {
    Reset {
        owner_id: OwnerId,
        items: Vec<Bookmark>,
    },
    Inserted {
        bookmark: Bookmark,
        index: usize,
        source: EventSource,
    },
    Deleted {
        bookmark_id: BookmarkId,
        source: EventSource,
    },
    Cleared {
        owner_id: OwnerId,
    },
    /// The change feed dropped; the items shown may go stale until `start`
    /// is called again.
    FeedLost {
        owner_id: OwnerId,
    },
}

struct SharedCollection {
    state: Mutex<Option<BookmarkCollection>>,
    events: broadcast::Sender<CollectionEvent>,
}

impl SharedCollection {
    async fn owner(&self) -> Option<OwnerId> {
        self.state.lock().await.as_ref().map(BookmarkCollection::owner_id)
    }

    async fn install(&self, collection: BookmarkCollection) {
        let reset = CollectionEvent::Reset {
            owner_id: collection.owner_id(),
            items: collection.snapshot(),
        };
        *self.state.lock().await = Some(collection);
        let _ = self.events.send(reset);
    }

    async fn clear(&self) {
        let previous = self.state.lock().await.take();
        if let Some(previous) = previous {
            let _ = self.events.send(CollectionEvent::Cleared {
                owner_id: previous.owner_id(),
            });
        }
    }

    async fn feed_lost(&self, owner_id: OwnerId) -> bool {
        let state = self.state.lock().await;
        let live = state
            .as_ref()
            .is_some_and(|collection| collection.owner_id() == owner_id);
        if live {
            let _ = self.events.send(CollectionEvent::FeedLost { owner_id });
        }
        live
    }

    /// Applies only while `owner_id` is still the live session; anything
    /// arriving after the session ended or switched owner is dropped.
    async fn apply_for(&self, owner_id: OwnerId, event: ChangeEvent) -> Option<ApplyOutcome> {
        let mut state = self.state.lock().await;
        let collection = state
            .as_mut()
            .filter(|collection| collection.owner_id() == owner_id)?;

        let source = event.source;
        let inserted = match &event.change {
            Change::Inserted(bookmark) => Some(bookmark.clone()),
            Change::Deleted(_) => None,
        };
        let outcome = apply_change(collection, event);
        let notification = match (&outcome, inserted) {
            (ApplyOutcome::Inserted { index }, Some(bookmark)) => Some(CollectionEvent::Inserted {
                bookmark,
                index: *index,
                source,
            }),
            (ApplyOutcome::Deleted { bookmark_id }, _) => Some(CollectionEvent::Deleted {
                bookmark_id: *bookmark_id,
                source,
            }),
            _ => None,
        };
        if let Some(notification) = notification {
            let _ = self.events.send(notification);
        }
        Some(outcome)
    }
}

/// Routes one subscription's events into the collection it was opened for.
struct SessionSink {
    owner_id: OwnerId,
    shared: Arc<SharedCollection>,
}

#[async_trait]
impl ChangeSink for SessionSink {
    async fn deliver(&self, event: ChangeEvent) {
        if self.shared.apply_for(self.owner_id, event).await.is_none() {
            warn!(
                owner_id = self.owner_id.0,
                "live: dropped remote change for inactive session"
            );
        }
    }

    async fn closed(&self) {
        if self.shared.feed_lost(self.owner_id).await {
            warn!(owner_id = self.owner_id.0, "live: change feed lost, restart required");
        }
    }
}

/// Keeps an owner's bookmarks in sync with the store while local adds and
/// deletes race the store's change feed.
pub struct LiveCollection {
    store: Arc<dyn RemoteStore>,
    gateway: MutationGateway,
    subscriptions: SubscriptionManager,
    shared: Arc<SharedCollection>,
    lifecycle: Mutex<()>,
}

impl LiveCollection {
    pub fn new(store: Arc<dyn RemoteStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(COLLECTION_EVENT_BUFFER);
        Arc::new(Self {
            gateway: MutationGateway::new(Arc::clone(&store)),
            subscriptions: SubscriptionManager::new(Arc::clone(&store)),
            store,
            shared: Arc::new(SharedCollection {
                state: Mutex::new(None),
                events,
            }),
            lifecycle: Mutex::new(()),
        })
    }

    /// Loads the owner's snapshot and opens the change feed. Calling it again
    /// for the live owner does nothing; a different owner ends the current
    /// session first. On failure no session is left behind.
    pub async fn start(&self, owner_id: OwnerId) -> Result<(), StartError> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.shared.owner().await == Some(owner_id)
            && self.subscriptions.active_owner().await == Some(owner_id)
        {
            return Ok(());
        }
        self.end_session().await;

        let items = self
            .store
            .list(owner_id)
            .await
            .map_err(|source| StartError::Snapshot { owner_id, source })?;
        self.shared
            .install(BookmarkCollection::from_snapshot(owner_id, items))
            .await;

        let sink = Arc::new(SessionSink {
            owner_id,
            shared: Arc::clone(&self.shared),
        });
        if let Err(err) = self.subscriptions.start(owner_id, sink).await {
            self.shared.clear().await;
            return Err(err.into());
        }
        info!(owner_id = owner_id.0, "live: session started");
        Ok(())
    }

    /// Safe at any time. Writes still in flight complete against the store
    /// but their results are no longer applied.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.end_session().await;
    }

    async fn end_session(&self) {
        self.subscriptions.stop().await;
        if let Some(owner_id) = self.shared.owner().await {
            self.shared.clear().await;
            info!(owner_id = owner_id.0, "live: session ended");
        }
    }

    pub async fn owner(&self) -> Option<OwnerId> {
        self.shared.owner().await
    }

    /// Newest first; empty when no session is active.
    pub async fn snapshot(&self) -> Vec<Bookmark> {
        self.shared
            .state
            .lock()
            .await
            .as_ref()
            .map(BookmarkCollection::snapshot)
            .unwrap_or_default()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<CollectionEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_adding(&self) -> bool {
        self.gateway.is_busy()
    }

    pub fn pending_mutations(&self) -> Vec<PendingMutation> {
        self.gateway.pending()
    }

    /// The created bookmark is applied right away; its echo from the feed is
    /// absorbed as a duplicate.
    pub async fn add_item(&self, title: &str, url: &str) -> Result<Bookmark, MutationError> {
        let owner_id = self.owner().await.ok_or(MutationError::NotStarted)?;
        let bookmark = self.gateway.add_item(owner_id, title, url).await?;
        self.shared
            .apply_for(
                owner_id,
                ChangeEvent::local(Change::Inserted(bookmark.clone())),
            )
            .await;
        Ok(bookmark)
    }

    /// Removal is applied as soon as the store confirms, so the row goes away
    /// even if this client never sees its own echo.
    pub async fn delete_item(&self, bookmark_id: BookmarkId) -> Result<(), MutationError> {
        let owner_id = self.owner().await.ok_or(MutationError::NotStarted)?;
        self.gateway.delete_item(owner_id, bookmark_id).await?;
        self.shared
            .apply_for(owner_id, ChangeEvent::local(Change::Deleted(bookmark_id)))
            .await;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/live_tests.rs"]
mod tests;
