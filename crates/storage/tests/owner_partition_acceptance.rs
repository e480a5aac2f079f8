use shared::domain::BookmarkDraft;
use storage::Storage;

#[tokio::test]
async fn owners_only_see_their_own_partition() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    let alice = storage.create_user("partition-alice").await.expect("alice");
    let bob = storage.create_user("partition-bob").await.expect("bob");

    let alice_draft = BookmarkDraft::parse("Rust", "https://www.rust-lang.org").expect("draft");
    let bob_draft = BookmarkDraft::parse("Tokio", "https://tokio.rs").expect("draft");
    let alice_bookmark = storage
        .create_bookmark(alice, &alice_draft)
        .await
        .expect("alice bookmark");
    storage
        .create_bookmark(bob, &bob_draft)
        .await
        .expect("bob bookmark");

    let alice_view = storage.list_bookmarks(alice).await.expect("alice list");
    assert_eq!(alice_view, vec![alice_bookmark]);

    let bob_view = storage.list_bookmarks(bob).await.expect("bob list");
    assert_eq!(bob_view.len(), 1);
    assert_eq!(bob_view[0].title, "Tokio");
    assert_eq!(bob_view[0].owner_id, bob);
}
