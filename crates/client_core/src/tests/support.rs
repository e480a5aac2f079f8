use std::{
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::domain::{Bookmark, BookmarkDraft, BookmarkId, OwnerId};
use tokio::sync::{mpsc, Mutex, Notify};

use crate::store::{Change, RemoteFeed, RemoteStore};

pub(crate) const ALICE: OwnerId = OwnerId(1);
pub(crate) const BOB: OwnerId = OwnerId(2);

pub(crate) fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000 + seconds, 0).expect("timestamp")
}

pub(crate) fn bookmark(id: i64, owner_id: OwnerId, seconds: i64) -> Bookmark {
    Bookmark {
        id: BookmarkId(id),
        owner_id,
        title: format!("Bookmark {id}"),
        url: format!("https://example.com/{id}"),
        created_at: at(seconds),
    }
}

/// Lets spawned feed pumps run.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StoreCall {
    List(OwnerId),
    Create { owner_id: OwnerId, title: String, url: String },
    Delete { owner_id: OwnerId, bookmark_id: BookmarkId },
    Subscribe(OwnerId),
}

/// In-memory store that records every call and can echo its own writes onto
/// the feeds it handed out.
#[derive(Default)]
pub(crate) struct StubStore {
    calls: std::sync::Mutex<Vec<StoreCall>>,
    rows: Mutex<Vec<Bookmark>>,
    next_id: AtomicI64,
    feeds: Mutex<Vec<(OwnerId, mpsc::Sender<Change>)>>,
    create_gate: Mutex<Option<Arc<Notify>>>,
    pub(crate) fail_list: AtomicBool,
    pub(crate) fail_create: AtomicBool,
    pub(crate) fail_delete: AtomicBool,
    pub(crate) fail_subscribe: AtomicBool,
    pub(crate) echo_writes: AtomicBool,
}

impl StubStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn echoing() -> Arc<Self> {
        let store = Self::default();
        store.echo_writes.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    pub(crate) fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().expect("calls").clone()
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::Create { .. }))
            .count()
    }

    pub(crate) fn subscribe_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::Subscribe(_)))
            .count()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().expect("calls").push(call);
    }

    /// Makes every following `create` wait until the returned notify fires.
    pub(crate) async fn hold_creates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.create_gate.lock().await = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) async fn seed(&self, row: Bookmark) {
        self.next_id.fetch_max(row.id.0, Ordering::SeqCst);
        self.rows.lock().await.push(row);
    }

    /// Pushes a change onto every live feed for `owner_id`, like another
    /// client's write would.
    pub(crate) async fn push(&self, owner_id: OwnerId, change: Change) -> usize {
        let feeds = self.feeds.lock().await.clone();
        let mut delivered = 0;
        for (feed_owner, sender) in feeds {
            if feed_owner == owner_id && sender.send(change.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Drops every feed sender, as if the server hung up.
    pub(crate) async fn close_feeds(&self) {
        self.feeds.lock().await.clear();
    }

    pub(crate) async fn feed_senders(&self, owner_id: OwnerId) -> Vec<mpsc::Sender<Change>> {
        self.feeds
            .lock()
            .await
            .iter()
            .filter(|(feed_owner, _)| *feed_owner == owner_id)
            .map(|(_, sender)| sender.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteStore for StubStore {
    async fn list(&self, owner_id: OwnerId) -> Result<Vec<Bookmark>> {
        self.record(StoreCall::List(owner_id));
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(anyhow!("list unavailable"));
        }
        let mut rows: Vec<Bookmark> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| row.owner_id == owner_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn create(&self, owner_id: OwnerId, draft: &BookmarkDraft) -> Result<Bookmark> {
        self.record(StoreCall::Create {
            owner_id,
            title: draft.title.clone(),
            url: draft.url.clone(),
        });
        let gate = self.create_gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("create unavailable"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let created = Bookmark {
            id: BookmarkId(id),
            owner_id,
            title: draft.title.clone(),
            url: draft.url.clone(),
            created_at: at(1_000 + id),
        };
        self.rows.lock().await.push(created.clone());
        if self.echo_writes.load(Ordering::SeqCst) {
            self.push(owner_id, Change::Inserted(created.clone())).await;
        }
        Ok(created)
    }

    async fn delete(&self, owner_id: OwnerId, bookmark_id: BookmarkId) -> Result<()> {
        self.record(StoreCall::Delete {
            owner_id,
            bookmark_id,
        });
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(anyhow!("delete unavailable"));
        }
        let removed = {
            let mut rows = self.rows.lock().await;
            let before = rows.len();
            rows.retain(|row| !(row.id == bookmark_id && row.owner_id == owner_id));
            rows.len() != before
        };
        if removed && self.echo_writes.load(Ordering::SeqCst) {
            self.push(owner_id, Change::Deleted(bookmark_id)).await;
        }
        Ok(())
    }

    async fn subscribe(&self, owner_id: OwnerId) -> Result<RemoteFeed> {
        self.record(StoreCall::Subscribe(owner_id));
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(anyhow!("realtime unavailable"));
        }
        let (tx, rx) = mpsc::channel(64);
        self.feeds.lock().await.push((owner_id, tx));
        Ok(RemoteFeed::new(rx))
    }
}
