use shared::{
    domain::{Bookmark, BookmarkDraft, BookmarkId, OwnerId},
    error::{ApiError, ErrorCode},
    protocol::ServerEvent,
};
use storage::Storage;
use tracing::info;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn login(ctx: &ApiContext, username: &str) -> Result<OwnerId, ApiError> {
    if username.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "username must not be empty",
        ));
    }
    let owner_id = ctx.storage.create_user(username).await.map_err(internal)?;
    info!(owner_id = owner_id.0, "api: signed in");
    Ok(owner_id)
}

pub async fn list_bookmarks(
    ctx: &ApiContext,
    owner_id: OwnerId,
) -> Result<Vec<Bookmark>, ApiError> {
    ensure_known_owner(ctx, owner_id).await?;
    ctx.storage
        .list_bookmarks(owner_id)
        .await
        .map_err(internal)
}

/// Creates the bookmark and returns it along with the change event to fan out.
pub async fn create_bookmark(
    ctx: &ApiContext,
    owner_id: OwnerId,
    title: &str,
    url: &str,
) -> Result<(Bookmark, ServerEvent), ApiError> {
    let draft = BookmarkDraft::parse(title, url).map_err(|field| {
        ApiError::new(
            ErrorCode::Validation,
            format!("{} must not be empty", field.as_str()),
        )
    })?;
    ensure_known_owner(ctx, owner_id).await?;

    let bookmark = ctx
        .storage
        .create_bookmark(owner_id, &draft)
        .await
        .map_err(internal)?;
    info!(
        owner_id = owner_id.0,
        bookmark_id = bookmark.id.0,
        "api: bookmark created"
    );
    let event = ServerEvent::BookmarkInserted {
        bookmark: bookmark.clone(),
    };
    Ok((bookmark, event))
}

/// Deleting a missing row succeeds without an event so client retries stay harmless.
pub async fn delete_bookmark(
    ctx: &ApiContext,
    owner_id: OwnerId,
    bookmark_id: BookmarkId,
) -> Result<Option<ServerEvent>, ApiError> {
    ensure_known_owner(ctx, owner_id).await?;
    let removed = ctx
        .storage
        .delete_bookmark(owner_id, bookmark_id)
        .await
        .map_err(internal)?;
    if !removed {
        return Ok(None);
    }
    info!(
        owner_id = owner_id.0,
        bookmark_id = bookmark_id.0,
        "api: bookmark deleted"
    );
    Ok(Some(ServerEvent::BookmarkDeleted {
        owner_id,
        bookmark_id,
    }))
}

pub async fn ensure_known_owner(ctx: &ApiContext, owner_id: OwnerId) -> Result<(), ApiError> {
    let exists = ctx.storage.user_exists(owner_id).await.map_err(internal)?;
    if !exists {
        return Err(ApiError::new(ErrorCode::Unauthorized, "unknown owner"));
    }
    Ok(())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
