//! Store initialization and durability tests

use harvest_common::models::{RawRecord, Record, RecordKind};
use harvest_common::db::MergeDecision;
use harvest_common::KeyedStore;
use tempfile::TempDir;

fn replace(_existing: Record, incoming: Record) -> MergeDecision {
    MergeDecision::Accept(incoming)
}

#[tokio::test]
async fn test_store_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("data").join("harvest.db");

    let result = KeyedStore::open(&db_path, 1000).await;

    assert!(result.is_ok(), "Store initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Store file was not created");
}

#[tokio::test]
async fn test_store_reopen_keeps_state() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("harvest.db");

    let store = KeyedStore::open(&db_path, 1000).await.unwrap();
    store.set_by_key("vcs:repo:master", "abc123").await.unwrap();
    let record = Record::from_raw(
        RecordKind::Bug,
        RawRecord {
            id: "1001".to_string(),
            date: 1_400_000_000,
            ..Default::default()
        },
    );
    store.merge_chunk(&[record], replace).await.unwrap();
    store.close().await;

    // Opening again must be idempotent and see the same data
    let reopened = KeyedStore::open(&db_path, 1000).await.unwrap();
    let cursor: Option<String> = reopened.get_by_key("vcs:repo:master").await.unwrap();
    assert_eq!(cursor.as_deref(), Some("abc123"));
    assert!(reopened
        .get_record(RecordKind::Bug, "1001")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_in_memory_stores_are_isolated() {
    let first = KeyedStore::in_memory().await.unwrap();
    let second = KeyedStore::in_memory().await.unwrap();

    first.set_by_key("flag", &1).await.unwrap();

    let other: Option<i32> = second.get_by_key("flag").await.unwrap();
    assert!(other.is_none());
}
