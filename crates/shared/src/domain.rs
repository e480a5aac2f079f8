use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(OwnerId);
id_newtype!(BookmarkId);

/// A bookmark row. Immutable once the store has assigned `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub owner_id: OwnerId,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Title and url after trimming, both guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkDraft {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Title,
    Url,
}

impl DraftField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Url => "url",
        }
    }
}

impl BookmarkDraft {
    pub fn parse(title: &str, url: &str) -> Result<Self, DraftField> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DraftField::Title);
        }
        let url = url.trim();
        if url.is_empty() {
            return Err(DraftField::Url);
        }
        Ok(Self {
            title: title.to_string(),
            url: url.to_string(),
        })
    }
}
