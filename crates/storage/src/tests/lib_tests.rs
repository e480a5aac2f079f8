use super::*;

async fn memory_storage() -> Storage {
    Storage::new("sqlite::memory:").await.expect("db")
}

fn draft(title: &str, url: &str) -> BookmarkDraft {
    BookmarkDraft::parse(title, url).expect("draft")
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = memory_storage().await;
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn create_user_is_idempotent_per_username() {
    let storage = memory_storage().await;
    let first = storage.create_user("alice").await.expect("user");
    let second = storage.create_user("alice").await.expect("user again");
    assert_eq!(first, second);
    assert!(storage.user_exists(first).await.expect("exists"));
    assert!(!storage.user_exists(OwnerId(first.0 + 1)).await.expect("missing"));
}

#[tokio::test]
async fn create_user_rejects_blank_username() {
    let storage = memory_storage().await;
    assert!(storage.create_user("   ").await.is_err());
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("bookmark_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn lists_bookmarks_newest_first() {
    let storage = memory_storage().await;
    let owner = storage.create_user("alice").await.expect("user");
    let first = storage
        .create_bookmark(owner, &draft("First", "https://one.example"))
        .await
        .expect("first");
    let second = storage
        .create_bookmark(owner, &draft("Second", "https://two.example"))
        .await
        .expect("second");

    assert!(second.created_at > first.created_at);
    let listed = storage.list_bookmarks(owner).await.expect("list");
    assert_eq!(listed, vec![second, first]);
}

#[tokio::test]
async fn bookmark_ids_are_not_reused_after_delete() {
    let storage = memory_storage().await;
    let owner = storage.create_user("alice").await.expect("user");
    let first = storage
        .create_bookmark(owner, &draft("First", "https://one.example"))
        .await
        .expect("first");
    assert!(storage
        .delete_bookmark(owner, first.id)
        .await
        .expect("delete"));
    let second = storage
        .create_bookmark(owner, &draft("Second", "https://two.example"))
        .await
        .expect("second");
    assert!(second.id.0 > first.id.0);
}

#[tokio::test]
async fn delete_is_scoped_to_owner_and_idempotent() {
    let storage = memory_storage().await;
    let alice = storage.create_user("alice").await.expect("alice");
    let bob = storage.create_user("bob").await.expect("bob");
    let bookmark = storage
        .create_bookmark(alice, &draft("Mine", "https://alice.example"))
        .await
        .expect("bookmark");

    assert!(!storage
        .delete_bookmark(bob, bookmark.id)
        .await
        .expect("foreign delete"));
    assert_eq!(storage.list_bookmarks(alice).await.expect("list").len(), 1);

    assert!(storage
        .delete_bookmark(alice, bookmark.id)
        .await
        .expect("delete"));
    assert!(!storage
        .delete_bookmark(alice, bookmark.id)
        .await
        .expect("repeat delete"));
    assert!(storage.list_bookmarks(alice).await.expect("list").is_empty());
}

#[test]
fn commit_clock_is_strictly_increasing() {
    let clock = CommitClock::default();
    let mut previous = clock.next();
    for _ in 0..1000 {
        let next = clock.next();
        assert!(next > previous);
        previous = next;
    }
}
