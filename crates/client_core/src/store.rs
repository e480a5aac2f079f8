use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{Bookmark, BookmarkDraft, BookmarkId, OwnerId};
use tokio::{sync::mpsc, task::JoinHandle};

/// A row-level change pushed by the store for one owner partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Inserted(Bookmark),
    Deleted(BookmarkId),
}

/// Durable, owner-partitioned bookmark table plus its change feed.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Newest first.
    async fn list(&self, owner_id: OwnerId) -> Result<Vec<Bookmark>>;
    async fn create(&self, owner_id: OwnerId, draft: &BookmarkDraft) -> Result<Bookmark>;
    async fn delete(&self, owner_id: OwnerId, bookmark_id: BookmarkId) -> Result<()>;
    async fn subscribe(&self, owner_id: OwnerId) -> Result<RemoteFeed>;
}

/// Receiving end of a store subscription. Dropping or closing it stops the
/// reader task that fills it.
pub struct RemoteFeed {
    events: mpsc::Receiver<Change>,
    reader: Option<JoinHandle<()>>,
}

impl RemoteFeed {
    pub fn new(events: mpsc::Receiver<Change>) -> Self {
        Self {
            events,
            reader: None,
        }
    }

    pub fn with_reader(events: mpsc::Receiver<Change>, reader: JoinHandle<()>) -> Self {
        Self {
            events,
            reader: Some(reader),
        }
    }

    pub async fn recv(&mut self) -> Option<Change> {
        self.events.recv().await
    }

    pub fn close(&mut self) {
        self.events.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for RemoteFeed {
    fn drop(&mut self) {
        self.close();
    }
}
