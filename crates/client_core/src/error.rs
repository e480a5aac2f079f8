use shared::domain::OwnerId;
use thiserror::Error;

/// Failure of a user-initiated add or delete. None of these leave the
/// collection partially updated.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("invalid input: {field} must not be empty")]
    Validation { field: &'static str },
    #[error("an add is already in flight")]
    Busy,
    #[error("store request failed: {0}")]
    Store(anyhow::Error),
    #[error("no active session")]
    NotStarted,
}

impl MutationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Store(_))
    }
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("failed to establish change feed for owner {owner_id}: {source}")]
    Establish {
        owner_id: OwnerId,
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("failed to load bookmarks for owner {owner_id}: {source}")]
    Snapshot {
        owner_id: OwnerId,
        source: anyhow::Error,
    },
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}
