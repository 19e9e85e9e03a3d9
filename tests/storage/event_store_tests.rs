//! EventStore interface tests.
//!
//! These tests verify the contract of the EventStore trait.
//! Each storage implementation should run these tests. Subjects are prefixed
//! with `test_` so a shared database can be cleaned between runs.

use eventsdb::models::{parse_time, NewEvent};
use eventsdb::storage::{EventStore, StorageError};

/// Create a test event for `subject`.
pub fn make_event(subject: &str, marker: u8) -> NewEvent {
    NewEvent::now("contract", format!("Event{marker}"), subject, vec![1, 2, 3, marker])
}

async fn append_all<S: EventStore>(store: &S, subjects: &[&str]) -> Vec<i64> {
    let mut ids = Vec::with_capacity(subjects.len());
    for (i, subject) in subjects.iter().enumerate() {
        let id = store
            .append(&make_event(subject, i as u8))
            .await
            .expect("append should succeed");
        ids.push(id);
    }
    ids
}

// =============================================================================
// EventStore::append / get_by_id
// =============================================================================

pub async fn test_append_assigns_increasing_ids<S: EventStore>(store: &S) {
    let ids = append_all(store, &["test_ids", "test_ids", "test_ids_other", "test_ids"]).await;

    assert!(ids[0] > 0, "ids start above zero");
    assert!(
        ids.windows(2).all(|pair| pair[0] < pair[1]),
        "ids must strictly increase: {ids:?}"
    );
}

pub async fn test_get_by_id_preserves_fields<S: EventStore>(store: &S) {
    let mut event = make_event("test_fields", 9);
    event.time = parse_time("2024-05-06T07:08:09.123456789Z").unwrap();
    event.data = vec![0, 159, 146, 150, 255];

    let id = store.append(&event).await.expect("append should succeed");
    let stored = store.get_by_id(id).await.expect("get should succeed");

    assert_eq!(stored.id, id);
    assert_eq!(stored.source, event.source);
    assert_eq!(stored.event_type, event.event_type);
    assert_eq!(stored.subject, event.subject);
    assert_eq!(stored.time, event.time, "timestamp must survive storage");
    assert_eq!(stored.data, event.data, "payload is opaque bytes");
}

pub async fn test_get_by_id_empty_payload<S: EventStore>(store: &S) {
    let mut event = make_event("test_empty_payload", 0);
    event.data.clear();

    let id = store.append(&event).await.expect("append should succeed");
    assert!(store.get_by_id(id).await.unwrap().data.is_empty());
}

pub async fn test_get_by_id_missing<S: EventStore>(store: &S) {
    match store.get_by_id(i64::MAX).await {
        Err(StorageError::NotFound { id }) => assert_eq!(id, i64::MAX),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

// =============================================================================
// EventStore::get_by_subject_after
// =============================================================================

pub async fn test_scan_filters_subject_in_id_order<S: EventStore>(store: &S) {
    let ids = append_all(
        store,
        &["test_scan_a", "test_scan_b", "test_scan_a", "test_scan_b", "test_scan_a"],
    )
    .await;

    let events = store
        .get_by_subject_after("test_scan_a", 0, 100)
        .await
        .expect("scan should succeed");
    let scanned: Vec<i64> = events.iter().map(|e| e.id).collect();

    assert_eq!(scanned, vec![ids[0], ids[2], ids[4]]);
    assert!(events.iter().all(|e| e.subject == "test_scan_a"));
}

pub async fn test_scan_pages_after_cursor<S: EventStore>(store: &S) {
    let ids = append_all(store, &["test_page"; 5]).await;

    let first = store.get_by_subject_after("test_page", 0, 2).await.unwrap();
    assert_eq!(first.iter().map(|e| e.id).collect::<Vec<_>>(), &ids[0..2]);

    let second = store
        .get_by_subject_after("test_page", ids[1], 2)
        .await
        .unwrap();
    assert_eq!(second.iter().map(|e| e.id).collect::<Vec<_>>(), &ids[2..4]);

    let rest = store
        .get_by_subject_after("test_page", ids[3], 2)
        .await
        .unwrap();
    assert_eq!(rest.iter().map(|e| e.id).collect::<Vec<_>>(), &ids[4..]);

    let done = store
        .get_by_subject_after("test_page", ids[4], 2)
        .await
        .unwrap();
    assert!(done.is_empty(), "no history past the newest event");
}

pub async fn test_scan_unknown_subject_is_empty<S: EventStore>(store: &S) {
    let events = store
        .get_by_subject_after("test_never_written", 0, 10)
        .await
        .unwrap();
    assert!(events.is_empty());
}

// =============================================================================
// EventStore::list_subjects / init
// =============================================================================

pub async fn test_list_subjects_distinct_sorted<S: EventStore>(store: &S) {
    append_all(store, &["test_list_c", "test_list_a", "test_list_c", "test_list_b"]).await;

    let subjects: Vec<String> = store
        .list_subjects()
        .await
        .expect("list should succeed")
        .into_iter()
        .filter(|s| s.starts_with("test_list_"))
        .collect();

    assert_eq!(subjects, vec!["test_list_a", "test_list_b", "test_list_c"]);
}

pub async fn test_init_is_idempotent<S: EventStore>(store: &S) {
    let id = store.append(&make_event("test_reinit", 1)).await.unwrap();

    store.init().await.expect("second init should succeed");

    assert_eq!(store.get_by_id(id).await.unwrap().subject, "test_reinit");
}

/// Run every EventStore contract test against `$store`.
#[macro_export]
macro_rules! run_event_store_tests {
    ($store:expr) => {
        use $crate::storage::event_store_tests::*;

        test_append_assigns_increasing_ids($store).await;
        println!("  test_append_assigns_increasing_ids: PASSED");

        test_get_by_id_preserves_fields($store).await;
        println!("  test_get_by_id_preserves_fields: PASSED");

        test_get_by_id_empty_payload($store).await;
        println!("  test_get_by_id_empty_payload: PASSED");

        test_get_by_id_missing($store).await;
        println!("  test_get_by_id_missing: PASSED");

        test_scan_filters_subject_in_id_order($store).await;
        println!("  test_scan_filters_subject_in_id_order: PASSED");

        test_scan_pages_after_cursor($store).await;
        println!("  test_scan_pages_after_cursor: PASSED");

        test_scan_unknown_subject_is_empty($store).await;
        println!("  test_scan_unknown_subject_is_empty: PASSED");

        test_list_subjects_distinct_sorted($store).await;
        println!("  test_list_subjects_distinct_sorted: PASSED");

        test_init_is_idempotent($store).await;
        println!("  test_init_is_idempotent: PASSED");
    };
}
