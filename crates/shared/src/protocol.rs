use serde::{Deserialize, Serialize};

use crate::{
    domain::{Bookmark, BookmarkId, OwnerId},
    error::ApiError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub owner_id: OwnerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookmarkRequest {
    pub owner_id: OwnerId,
    pub title: String,
    pub url: String,
}

/// Frames pushed over `/ws`. Every change variant carries the owner so the
/// server can filter per subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Subscribed {
        owner_id: OwnerId,
    },
    BookmarkInserted {
        bookmark: Bookmark,
    },
    BookmarkDeleted {
        owner_id: OwnerId,
        bookmark_id: BookmarkId,
    },
    Error(ApiError),
}

impl ServerEvent {
    /// Owner partition the event belongs to, if it is scoped to one.
    pub fn owner_id(&self) -> Option<OwnerId> {
        match self {
            Self::Subscribed { owner_id } => Some(*owner_id),
            Self::BookmarkInserted { bookmark } => Some(bookmark.owner_id),
            Self::BookmarkDeleted { owner_id, .. } => Some(*owner_id),
            Self::Error(_) => None,
        }
    }
}
