use shared::domain::BookmarkId;
use tracing::debug;

use crate::{collection::BookmarkCollection, store::Change};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// Applied by this client right after its own write succeeded.
    Local,
    /// Delivered by the store's change feed, echoes included.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub change: Change,
    pub source: EventSource,
}

impl ChangeEvent {
    pub fn local(change: Change) -> Self {
        Self {
            change,
            source: EventSource::Local,
        }
    }

    pub fn remote(change: Change) -> Self {
        Self {
            change,
            source: EventSource::Remote,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted { index: usize },
    Deleted { bookmark_id: BookmarkId },
    /// The id is already present; a second delivery of the same insert.
    AlreadyPresent,
    /// The id is already gone; a repeated or late delete.
    AlreadyAbsent,
    /// An insert for an id deleted earlier in the session; a late local
    /// apply or a stale echo.
    AlreadyDeleted,
    /// The row belongs to a different owner partition.
    OutOfScope,
}

impl ApplyOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Inserted { .. } | Self::Deleted { .. })
    }
}

/// Folds one event into the collection. Both kinds are idempotent, so local
/// applies and their later remote echoes converge without tracking event
/// identity.
pub fn apply_change(collection: &mut BookmarkCollection, event: ChangeEvent) -> ApplyOutcome {
    let ChangeEvent { change, source } = event;
    let outcome = match change {
        Change::Inserted(bookmark) => {
            if bookmark.owner_id != collection.owner_id() {
                ApplyOutcome::OutOfScope
            } else if collection.was_deleted(bookmark.id) {
                ApplyOutcome::AlreadyDeleted
            } else {
                match collection.apply_insert(bookmark) {
                    Some(index) => ApplyOutcome::Inserted { index },
                    None => ApplyOutcome::AlreadyPresent,
                }
            }
        }
        Change::Deleted(bookmark_id) => match collection.apply_delete(bookmark_id) {
            Some(_) => ApplyOutcome::Deleted { bookmark_id },
            None => ApplyOutcome::AlreadyAbsent,
        },
    };
    if !outcome.changed() {
        debug!(
            owner_id = collection.owner_id().0,
            ?source,
            ?outcome,
            "applier: change absorbed without effect"
        );
    }
    outcome
}

#[cfg(test)]
#[path = "tests/applier_tests.rs"]
mod tests;
