use super::*;
use crate::test_support::{bookmark, ALICE, BOB};

#[test]
fn snapshot_is_normalised_newest_first_and_deduplicated() {
    let older = bookmark(1, ALICE, 10);
    let newer = bookmark(2, ALICE, 20);
    let foreign = bookmark(3, BOB, 30);

    let collection = BookmarkCollection::from_snapshot(
        ALICE,
        vec![older.clone(), newer.clone(), older.clone(), foreign],
    );

    assert_eq!(collection.snapshot(), vec![newer, older]);
    assert_eq!(collection.owner_id(), ALICE);
}

#[test]
fn insert_places_newest_at_front() {
    let mut collection = BookmarkCollection::new(ALICE);
    assert_eq!(collection.apply_insert(bookmark(1, ALICE, 1)), Some(0));
    assert_eq!(collection.apply_insert(bookmark(2, ALICE, 2)), Some(0));
    assert_eq!(collection.apply_insert(bookmark(3, ALICE, 3)), Some(0));

    let ids: Vec<i64> = collection.items().iter().map(|item| item.id.0).collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

#[test]
fn insert_with_tied_timestamp_goes_ahead_of_earlier_arrival() {
    let mut collection = BookmarkCollection::new(ALICE);
    collection.apply_insert(bookmark(1, ALICE, 5));
    assert_eq!(collection.apply_insert(bookmark(2, ALICE, 5)), Some(0));

    let ids: Vec<i64> = collection.items().iter().map(|item| item.id.0).collect();
    assert_eq!(ids, vec![2, 1]);
}

#[test]
fn insert_of_existing_id_is_a_noop() {
    let mut collection = BookmarkCollection::new(ALICE);
    let item = bookmark(1, ALICE, 1);
    assert!(collection.apply_insert(item.clone()).is_some());
    assert_eq!(collection.apply_insert(item), None);
    assert_eq!(collection.len(), 1);
}

#[test]
fn delete_keeps_remaining_order_and_is_idempotent() {
    let mut collection = BookmarkCollection::from_snapshot(
        ALICE,
        vec![
            bookmark(3, ALICE, 3),
            bookmark(2, ALICE, 2),
            bookmark(1, ALICE, 1),
        ],
    );

    let removed = collection.apply_delete(BookmarkId(2)).expect("removed");
    assert_eq!(removed.id, BookmarkId(2));
    assert_eq!(collection.apply_delete(BookmarkId(2)), None);

    let ids: Vec<i64> = collection.items().iter().map(|item| item.id.0).collect();
    assert_eq!(ids, vec![3, 1]);
    assert!(!collection.contains(BookmarkId(2)));
}

#[test]
fn insert_after_delete_of_same_id_stays_out() {
    let mut collection = BookmarkCollection::new(ALICE);
    collection.apply_insert(bookmark(1, ALICE, 1));
    collection.apply_delete(BookmarkId(1));
    assert_eq!(collection.apply_insert(bookmark(1, ALICE, 1)), None);

    // A delete that arrives before its insert is remembered as well.
    assert_eq!(collection.apply_delete(BookmarkId(2)), None);
    assert_eq!(collection.apply_insert(bookmark(2, ALICE, 2)), None);

    assert!(collection.is_empty());
    assert!(collection.was_deleted(BookmarkId(1)));
    assert!(collection.was_deleted(BookmarkId(2)));
}
