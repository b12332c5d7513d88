//! Preflight integration tests
//!
//! Tests the checks that gate a run against a real SQLite file:
//! - A healthy store passes
//! - A missing status code blocks the sync before any fetch

mod common;

use std::sync::Arc;

use common::*;
use membership_sync::database::SqliteDatabase;
use membership_sync::error::SyncError;
use membership_sync::models::SyncMode;
use membership_sync::sync::run_preflight;
use tempfile::TempDir;

async fn file_database(dir: &TempDir) -> (Arc<SqliteDatabase>, String) {
    let path = dir.path().join("membership.db");
    let path = path.to_str().unwrap().to_string();
    let db = SqliteDatabase::new(&path)
        .await
        .expect("Failed to create file database");
    (Arc::new(db), path)
}

/// Test 1: A freshly migrated store passes preflight
#[tokio::test]
async fn test_fresh_store_passes() {
    let dir = TempDir::new().unwrap();
    let (store, _) = file_database(&dir).await;
    let source = FakeSource::new();

    let report = run_preflight(&source, store.as_ref()).await;

    assert!(report.ok);
    assert!(report.missing_statuses.is_empty());
    assert!(report.missing_tables.is_empty());
    assert_eq!(report.account.map(|a| a.id), Some(4242));
}

/// Test 2: One missing status code fails preflight and the sync never fetches
#[tokio::test]
async fn test_missing_status_blocks_sync() {
    let dir = TempDir::new().unwrap();
    let (store, path) = file_database(&dir).await;

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute("DELETE FROM member_statuses WHERE code = 'suspended'", [])
        .unwrap();
    drop(conn);

    let source = Arc::new(FakeSource::new().with_contacts(ten_contacts()));

    let report = run_preflight(source.as_ref(), store.as_ref()).await;
    assert!(!report.ok);
    assert_eq!(report.missing_statuses, vec!["suspended".to_string()]);

    let result = orchestrator(Arc::clone(&source), Arc::clone(&store))
        .run_checked(SyncMode::Full, false)
        .await;

    match result {
        Err(SyncError::Preflight(message)) => assert!(message.contains("suspended")),
        Err(other) => panic!("Expected preflight error, got {}", other),
        Ok(report) => panic!("Sync ran despite failed preflight: {}", report.run_id),
    }
    assert_eq!(source.fetch_calls(), 0);
}

/// Test 3: A passing preflight lets the sync proceed
#[tokio::test]
async fn test_run_checked_proceeds() {
    let dir = TempDir::new().unwrap();
    let (store, _) = file_database(&dir).await;
    let source = Arc::new(FakeSource::new().with_contacts(ten_contacts()));

    let report = orchestrator(Arc::clone(&source), store)
        .run_checked(SyncMode::Full, false)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.stats.members.created, 10);
}
