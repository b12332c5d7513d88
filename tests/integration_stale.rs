//! Stale mapping integration tests

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::*;
use membership_sync::database::{LocalStore, SqliteDatabase};
use membership_sync::models::{EntityType, SyncMode};
use membership_sync::sync::{cleanup_stale_mappings, detect_stale};
use tempfile::TempDir;

/// Sync two events and some members, then age the event mappings
async fn synced_store(dir: &TempDir) -> Arc<SqliteDatabase> {
    let path = dir.path().join("membership.db");
    let path = path.to_str().unwrap().to_string();
    let store = Arc::new(SqliteDatabase::new(&path).await.unwrap());

    let source = Arc::new(
        FakeSource::new()
            .with_contacts(ten_contacts())
            .with_events(vec![event(100, "Spring Fair"), event(101, "Summer Fair")]),
    );
    let report = orchestrator(source, Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;
    assert!(report.success);

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "UPDATE id_mappings SET synced_at = '2025-01-01T00:00:00.000Z' WHERE entity_type = 'event'",
        [],
    )
    .unwrap();
    store
}

/// Test 1: Only mappings older than the cutoff are reported
#[tokio::test]
async fn test_detect_stale_after_sync() {
    let dir = TempDir::new().unwrap();
    let store = synced_store(&dir).await;

    let stale = detect_stale(store.as_ref(), 90, None, Utc::now()).await.unwrap();
    assert_eq!(stale.len(), 2);
    assert!(stale.iter().all(|m| m.entity_type == EntityType::Event));

    let members = detect_stale(store.as_ref(), 90, Some(EntityType::Member), Utc::now())
        .await
        .unwrap();
    assert!(members.is_empty());
}

/// Test 2: Cleanup removes mapping rows but keeps the local events
#[tokio::test]
async fn test_cleanup_keeps_entities() {
    let dir = TempDir::new().unwrap();
    let store = synced_store(&dir).await;

    let preview = cleanup_stale_mappings(store.as_ref(), 90, true, Utc::now())
        .await
        .unwrap();
    assert_eq!(preview.found, 2);
    assert_eq!(preview.deleted, 0);

    let result = cleanup_stale_mappings(store.as_ref(), 90, false, Utc::now())
        .await
        .unwrap();
    assert_eq!(result.deleted, 2);

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.event_mappings, 0);
    assert_eq!(counts.events, 2);
    assert_eq!(counts.member_mappings, 10);
    assert_eq!(store.list_audit(&result.run_id).await.unwrap().len(), 2);
}
