use std::collections::HashSet;

use shared::domain::{Bookmark, BookmarkId, OwnerId};

/// In-memory bookmarks for one owner, newest first. Ids are unique.
#[derive(Debug, Clone)]
pub struct BookmarkCollection {
    owner_id: OwnerId,
    items: Vec<Bookmark>,
    // The store never reuses ids, so a deleted id can never legitimately return.
    deleted: HashSet<BookmarkId>,
}

impl BookmarkCollection {
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            items: Vec::new(),
            deleted: HashSet::new(),
        }
    }

    /// Builds the collection from a store listing. Rows belonging to another
    /// owner and repeated ids are dropped; the first occurrence wins.
    pub fn from_snapshot(owner_id: OwnerId, mut items: Vec<Bookmark>) -> Self {
        items.retain(|item| item.owner_id == owner_id);
        // Stable, so rows sharing a timestamp keep the store's order.
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut collection = Self::new(owner_id);
        for item in items {
            if !collection.contains(item.id) {
                collection.items.push(item);
            }
        }
        collection
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn snapshot(&self) -> Vec<Bookmark> {
        self.items.clone()
    }

    pub fn items(&self) -> &[Bookmark] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, bookmark_id: BookmarkId) -> bool {
        self.items.iter().any(|item| item.id == bookmark_id)
    }

    pub fn was_deleted(&self, bookmark_id: BookmarkId) -> bool {
        self.deleted.contains(&bookmark_id)
    }

    /// Returns the index the bookmark landed at, or `None` when the id is
    /// already present or was deleted earlier in this session. A bookmark
    /// tied on `created_at` goes ahead of the ones that arrived before it.
    pub fn apply_insert(&mut self, bookmark: Bookmark) -> Option<usize> {
        if self.contains(bookmark.id) || self.was_deleted(bookmark.id) {
            return None;
        }
        let index = self
            .items
            .iter()
            .position(|existing| existing.created_at <= bookmark.created_at)
            .unwrap_or(self.items.len());
        self.items.insert(index, bookmark);
        Some(index)
    }

    /// Removes the bookmark in place, keeping the order of the rest. The id
    /// is remembered even when absent, so a late insert for it stays out.
    pub fn apply_delete(&mut self, bookmark_id: BookmarkId) -> Option<Bookmark> {
        self.deleted.insert(bookmark_id);
        let index = self.items.iter().position(|item| item.id == bookmark_id)?;
        Some(self.items.remove(index))
    }
}

#[cfg(test)]
#[path = "tests/collection_tests.rs"]
mod tests;
