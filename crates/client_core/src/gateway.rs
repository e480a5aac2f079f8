use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use shared::domain::{Bookmark, BookmarkDraft, BookmarkId, OwnerId};
use tracing::{debug, info, warn};

use crate::{error::MutationError, store::RemoteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    Add { title: String, url: String },
    Delete { bookmark_id: BookmarkId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Pending,
    Succeeded,
    Failed,
}

/// An in-flight write. Only `Pending` entries are ever listed; the terminal
/// status is reported once and the entry is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub id: MutationId,
    pub owner_id: OwnerId,
    pub kind: MutationKind,
    pub status: MutationStatus,
}

type PendingTable = Arc<Mutex<BTreeMap<MutationId, PendingMutation>>>;

/// Validates user intents and issues them to the store. At most one add is
/// outstanding at a time; deletes are independent of each other.
pub struct MutationGateway {
    store: Arc<dyn RemoteStore>,
    adding: AtomicBool,
    next_id: AtomicU64,
    pending: PendingTable,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            adding: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.adding.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> Vec<PendingMutation> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub async fn add_item(
        &self,
        owner_id: OwnerId,
        title: &str,
        url: &str,
    ) -> Result<Bookmark, MutationError> {
        let draft = BookmarkDraft::parse(title, url).map_err(|field| MutationError::Validation {
            field: field.as_str(),
        })?;
        let _slot = AddSlot::acquire(&self.adding).ok_or(MutationError::Busy)?;

        let mut ticket = self.open(
            owner_id,
            MutationKind::Add {
                title: draft.title.clone(),
                url: draft.url.clone(),
            },
        );
        match self.store.create(owner_id, &draft).await {
            Ok(bookmark) => {
                ticket.resolve(MutationStatus::Succeeded);
                info!(
                    owner_id = owner_id.0,
                    bookmark_id = bookmark.id.0,
                    "gateway: bookmark added"
                );
                Ok(bookmark)
            }
            Err(err) => {
                ticket.resolve(MutationStatus::Failed);
                warn!(owner_id = owner_id.0, error = %err, "gateway: add failed");
                Err(MutationError::Store(err))
            }
        }
    }

    pub async fn delete_item(
        &self,
        owner_id: OwnerId,
        bookmark_id: BookmarkId,
    ) -> Result<(), MutationError> {
        let mut ticket = self.open(owner_id, MutationKind::Delete { bookmark_id });
        match self.store.delete(owner_id, bookmark_id).await {
            Ok(()) => {
                ticket.resolve(MutationStatus::Succeeded);
                info!(
                    owner_id = owner_id.0,
                    bookmark_id = bookmark_id.0,
                    "gateway: bookmark deleted"
                );
                Ok(())
            }
            Err(err) => {
                ticket.resolve(MutationStatus::Failed);
                warn!(
                    owner_id = owner_id.0,
                    bookmark_id = bookmark_id.0,
                    error = %err,
                    "gateway: delete failed"
                );
                Err(MutationError::Store(err))
            }
        }
    }

    fn open(&self, owner_id: OwnerId, kind: MutationKind) -> Ticket {
        let id = MutationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                PendingMutation {
                    id,
                    owner_id,
                    kind,
                    status: MutationStatus::Pending,
                },
            );
        Ticket {
            id,
            table: Arc::clone(&self.pending),
            resolved: false,
        }
    }
}

/// Holds the single add slot until dropped, including when the calling
/// future is cancelled mid-request.
struct AddSlot<'a>(&'a AtomicBool);

impl<'a> AddSlot<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for AddSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Removes its pending entry when resolved or dropped.
struct Ticket {
    id: MutationId,
    table: PendingTable,
    resolved: bool,
}

impl Ticket {
    fn resolve(&mut self, status: MutationStatus) {
        let entry = self
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        self.resolved = true;
        if let Some(entry) = entry {
            debug!(
                mutation_id = entry.id.0,
                owner_id = entry.owner_id.0,
                kind = ?entry.kind,
                ?status,
                "gateway: mutation resolved"
            );
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.resolved {
            self.table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
