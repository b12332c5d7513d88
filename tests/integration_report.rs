//! Report integration tests
//!
//! Tests reports written after real runs:
//! - Written reports satisfy every invariant
//! - Tampered reports are rejected
//! - Store verification agrees with the report

mod common;

use std::sync::Arc;

use common::*;
use membership_sync::models::SyncMode;
use membership_sync::report::{
    assert_no_violations, validate_report, verify_store, ReportWriter, ViolationCode,
};
use tempfile::TempDir;

fn busy_source() -> Arc<FakeSource> {
    Arc::new(
        FakeSource::new()
            .with_contacts(ten_contacts())
            .with_events(vec![event(100, "Autumn Gala"), event(101, "Quiz Night")])
            .with_registrations(
                100,
                vec![
                    registration(1000, 100, 1),
                    registration(1001, 100, 2),
                    registration(1002, 100, 999),
                ],
            )
            .with_registrations(101, vec![registration(1003, 101, 4)]),
    )
}

/// Test 1: A written report passes validation and matches the store
#[tokio::test]
async fn test_written_report_is_valid() {
    let dir = TempDir::new().unwrap();
    let store = create_test_database().await;
    let report = orchestrator(busy_source(), Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;

    let writer = ReportWriter::new(dir.path());
    let path = writer.write(&report).await.unwrap();
    assert!(path.ends_with(report.file_name()));

    let value = ReportWriter::read_value(&path).await.unwrap();
    let violations = validate_report(&value);
    assert!(violations.is_empty(), "unexpected violations: {:?}", violations);

    let typed = ReportWriter::read(&path).await.unwrap();
    assert_eq!(typed, report);

    let verified = verify_store(store.as_ref(), Some(&typed)).await.unwrap();
    assert!(verified.is_clean());
    assert_eq!(verified.counts.registrations, 3);
}

/// Test 2: Dry-run reports with provisional ids are valid too
#[tokio::test]
async fn test_dry_run_report_is_valid() {
    let store = create_test_database().await;
    let report = orchestrator(busy_source(), Arc::clone(&store))
        .run(SyncMode::Full, true)
        .await;

    let value = serde_json::to_value(&report).unwrap();
    assert!(validate_report(&value).is_empty());
    assert!(verify_store(store.as_ref(), Some(&report))
        .await
        .unwrap()
        .is_clean());
}

/// Test 3: A report whose counts do not add up is rejected
#[tokio::test]
async fn test_tampered_report_is_rejected() {
    let store = create_test_database().await;
    let report = orchestrator(busy_source(), Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;

    let mut value = serde_json::to_value(&report).unwrap();
    value["stats"]["members"]["created"] = serde_json::json!(15);
    value.as_object_mut().unwrap().remove("runId");

    let violations = validate_report(&value);
    let codes: Vec<_> = violations.iter().map(|v| v.code).collect();
    assert!(codes.contains(&ViolationCode::MissingField));
    assert!(codes.contains(&ViolationCode::CountMismatch));

    let err = assert_no_violations(&violations).unwrap_err();
    assert_eq!(err.count, violations.len());
    assert!(err.summary.contains("stats.members"));
}
