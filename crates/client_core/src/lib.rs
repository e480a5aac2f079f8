pub mod applier;
pub mod collection;
pub mod error;
pub mod gateway;
pub mod http_store;
pub mod live;
pub mod store;
pub mod subscription;

pub use applier::{apply_change, ApplyOutcome, ChangeEvent, EventSource};
pub use collection::BookmarkCollection;
pub use error::{MutationError, StartError, SubscriptionError};
pub use gateway::{MutationGateway, MutationId, MutationKind, MutationStatus, PendingMutation};
pub use http_store::HttpRemoteStore;
pub use live::{CollectionEvent, LiveCollection};
pub use store::{Change, RemoteFeed, RemoteStore};
pub use subscription::{ChangeSink, StartOutcome, SubscriptionManager};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
