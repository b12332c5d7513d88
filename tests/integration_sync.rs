//! Sync functionality integration tests
//!
//! Tests full runs against an in-memory source and SQLite store including:
//! - Creation and idempotent re-runs
//! - Natural-key linking of pre-existing members
//! - Registration diagnostics and skip accounting
//! - Dry runs and incremental runs

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::NaiveDate;
use common::*;
use membership_sync::database::LocalStore;
use membership_sync::models::{EntityType, MemberInput, MemberStatus, SyncMode};
use membership_sync::sync::{RecordAction, WarningCode};

/// Test 1: A full run creates members, events and registrations with mappings
#[tokio::test]
async fn test_full_sync_creates_everything() {
    let source = Arc::new(
        FakeSource::new()
            .with_contacts(ten_contacts())
            .with_events(vec![event(100, "Autumn Gala"), event(101, "Board Meeting")])
            .with_registrations(100, vec![registration(1000, 100, 1), registration(1001, 100, 2)])
            .with_registrations(101, vec![registration(1002, 101, 3)]),
    );
    let store = create_test_database().await;

    let report = orchestrator(source, Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;

    assert!(report.success);
    assert_eq!(report.stats.members.created, 10);
    assert_eq!(report.stats.events.created, 2);
    assert_eq!(report.stats.registrations.created, 3);
    assert_eq!(report.id_mappings.members.len(), 10);

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.members, 10);
    assert_eq!(counts.events, 2);
    assert_eq!(counts.registrations, 3);
    assert_eq!(counts.member_mappings, 10);
    assert_eq!(counts.registration_mappings, 3);

    let state = store.get_sync_state("default").await.unwrap().unwrap();
    let saved = state.last_full_sync.expect("full sync recorded");
    assert!((saved - report.started_at).num_milliseconds().abs() < 1);
}

/// Test 2: Running the same data twice changes nothing the second time
#[tokio::test]
async fn test_second_run_is_idempotent() {
    let source = Arc::new(
        FakeSource::new()
            .with_contacts(ten_contacts())
            .with_events(vec![event(100, "Autumn Gala")])
            .with_registrations(100, vec![registration(1000, 100, 1)]),
    );
    let store = create_test_database().await;

    let first = orchestrator(Arc::clone(&source), Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;
    let second = orchestrator(Arc::clone(&source), Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;

    assert!(second.success);
    assert_eq!(second.stats.members.created, 0);
    assert_eq!(second.stats.members.updated, 0);
    assert_eq!(second.stats.members.skipped, 10);
    assert_eq!(second.stats.events.created, 0);
    assert_eq!(second.stats.registrations.created, 0);
    assert!(second
        .stats
        .members
        .records
        .iter()
        .all(|r| r.action == RecordAction::Unchanged));

    // Same source ids map to the same local ids
    assert_eq!(first.id_mappings, second.id_mappings);

    let audit = store.list_audit(&second.run_id).await.unwrap();
    assert!(audit.is_empty());

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.members, 10);
    assert_eq!(counts.registrations, 1);
}

/// Test 3: A changed contact is updated in place
#[tokio::test]
async fn test_changed_contact_is_updated() {
    let source = Arc::new(FakeSource::new().with_contacts(vec![contact(
        7,
        "grace@example.org",
        "Grace",
        "Hopper",
    )]));
    let store = create_test_database().await;
    orchestrator(Arc::clone(&source), Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;

    *source.contacts.lock().unwrap() = vec![contact(7, "grace@example.org", "Grace", "Murray")];
    let report = orchestrator(Arc::clone(&source), Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;

    assert_eq!(report.stats.members.updated, 1);
    let member = store
        .find_member_by_email("grace@example.org")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(member.last_name, "Murray");
    assert_eq!(store.counts().await.unwrap().members, 1);
}

/// Test 4: An existing unmapped member with the same email is linked, not duplicated
#[tokio::test]
async fn test_natural_key_links_existing_member() {
    let store = create_test_database().await;
    let existing_id = store
        .create_member(&MemberInput {
            email: "ada@example.org".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone: None,
            status: MemberStatus::Lapsed,
            membership_level: None,
            join_date: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
            join_date_from_source: true,
            renewal_due: None,
        })
        .await
        .unwrap();

    let source = Arc::new(FakeSource::new().with_contacts(vec![contact(
        55,
        "ADA@example.org",
        "Ada",
        "Lovelace",
    )]));
    let report = orchestrator(source, Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;

    assert!(report.success);
    assert_eq!(report.stats.members.created, 0);
    assert_eq!(report.stats.members.updated, 1);
    assert_eq!(report.stats.members.records[0].action, RecordAction::Linked);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.code == WarningCode::NaturalKeyMatch && w.source_id == Some(55)));

    let mapping = store
        .get_mapping(EntityType::Member, 55)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mapping.local_id, existing_id);
    assert_eq!(store.counts().await.unwrap().members, 1);
}

/// Test 5: Two source contacts sharing an email produce one member and one skip
#[tokio::test]
async fn test_duplicate_email_within_run_is_skipped() {
    let source = Arc::new(FakeSource::new().with_contacts(vec![
        contact(1, "shared@example.org", "Pat", "One"),
        contact(2, "shared@example.org", "Pat", "Two"),
    ]));
    let store = create_test_database().await;

    let report = orchestrator(source, Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;

    assert_eq!(report.stats.members.created, 1);
    assert_eq!(report.stats.members.skipped, 1);
    assert_eq!(store.counts().await.unwrap().member_mappings, 1);
}

/// Test 6: 50 registrations, 40 of them for unknown contacts
#[tokio::test]
async fn test_registration_skip_accounting() {
    let registrations = (0..50)
        .map(|i| {
            // Contacts 1..=10 exist; 1010.. do not
            let contact_id = if i < 10 { i + 1 } else { 1000 + i };
            registration(5000 + i, 100, contact_id)
        })
        .collect();
    let source = Arc::new(
        FakeSource::new()
            .with_contacts(ten_contacts())
            .with_events(vec![event(100, "Annual Picnic")])
            .with_registrations(100, registrations),
    );
    let store = create_test_database().await;

    let report = orchestrator(source, Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;

    let diagnostics = &report.registration_diagnostics;
    assert_eq!(diagnostics.registrations_fetched, 50);
    assert_eq!(diagnostics.registrations_skipped_missing_member, 40);
    assert_eq!(diagnostics.registrations_upserted, 10);
    assert_eq!(diagnostics.top_skip_reasons[0].count, 40);
    assert_eq!(report.stats.registrations.parsed, 50);
    assert_eq!(report.stats.registrations.skipped, 40);
    // Below the 100-registration floor of the ratio heuristic
    assert!(!report
        .warnings
        .iter()
        .any(|w| w.code == WarningCode::HighMemberSkipRatio));
}

/// Test 7: Unmapped events are skipped and a failed registration fetch is not fatal
#[tokio::test]
async fn test_event_failures_are_isolated() {
    let mut broken = event(102, "Broken");
    broken.start_date = None;
    let source = Arc::new(
        FakeSource::new()
            .with_contacts(ten_contacts())
            .with_events(vec![event(100, "Gala"), event(101, "Hike"), broken])
            .with_registrations(100, vec![registration(1000, 100, 1)]),
    );
    source.failing_events.lock().unwrap().insert(101);
    let store = create_test_database().await;

    let report = orchestrator(Arc::clone(&source), Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;

    assert!(report.success);
    assert_eq!(report.stats.events.created, 2);
    assert_eq!(report.stats.events.errors, 1);
    assert_eq!(report.registration_diagnostics.events_skipped_unmapped, 1);
    assert_eq!(report.registration_diagnostics.fetch_calls, 2);
    assert_eq!(report.registration_diagnostics.registrations_upserted, 1);
    assert_eq!(source.registration_calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.total_error_count, 2);
}

/// Test 8: A dry run reports what it would do and writes nothing
#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let source = Arc::new(
        FakeSource::new()
            .with_contacts(ten_contacts())
            .with_events(vec![event(100, "Autumn Gala")])
            .with_registrations(100, vec![registration(1000, 100, 1), registration(1001, 100, 2)]),
    );
    let store = create_test_database().await;

    let report = orchestrator(source, Arc::clone(&store))
        .run(SyncMode::Full, true)
        .await;

    assert!(report.success);
    assert!(report.dry_run);
    assert_eq!(report.stats.members.created, 10);
    assert_eq!(report.stats.events.created, 1);
    assert_eq!(report.stats.registrations.created, 2);
    assert!(report
        .id_mappings
        .members
        .iter()
        .all(|pair| pair.local_id < 0));

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.members, 0);
    assert_eq!(counts.events, 0);
    assert_eq!(counts.registrations, 0);
    assert_eq!(counts.member_mappings, 0);
    assert!(store.get_sync_state("default").await.unwrap().is_none());
    assert!(store.list_audit(&report.run_id).await.unwrap().is_empty());
}

/// Test 9: An incremental run after a full run only sees and touches what changed
#[tokio::test]
async fn test_incremental_after_full() {
    let source = Arc::new(
        FakeSource::new()
            .with_contacts(ten_contacts())
            .with_events(vec![event(100, "Autumn Gala")]),
    );
    let store = create_test_database().await;
    orchestrator(Arc::clone(&source), Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;

    *source.contacts.lock().unwrap() = vec![contact(11, "new@example.org", "New", "Member")];
    let report = orchestrator(Arc::clone(&source), Arc::clone(&store))
        .run(SyncMode::Incremental, false)
        .await;

    assert!(report.success);
    assert_eq!(report.stats.members.created, 1);
    assert_eq!(report.stats.members.parsed, 1);
    assert_eq!(store.counts().await.unwrap().members, 11);

    let state = store.get_sync_state("default").await.unwrap().unwrap();
    assert!(state.last_full_sync.is_some());
    let saved = state.last_incremental_sync.expect("incremental sync recorded");
    assert!((saved - report.started_at).num_milliseconds().abs() < 1);
}

/// Test 10: A join date that arrives after a defaulted one replaces it, and a later gap keeps it
#[tokio::test]
async fn test_join_date_arriving_later_is_applied() {
    let mut undated = contact(21, "lin@example.org", "Lin", "Chen");
    undated.field_values.clear();
    let source = Arc::new(FakeSource::new().with_contacts(vec![undated.clone()]));
    let store = create_test_database().await;

    let first = orchestrator(Arc::clone(&source), Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;
    assert_eq!(first.stats.members.created, 1);
    let member = store
        .find_member_by_email("lin@example.org")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(member.join_date, first.started_at.date_naive());

    *source.contacts.lock().unwrap() = vec![contact(21, "lin@example.org", "Lin", "Chen")];
    let second = orchestrator(Arc::clone(&source), Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;
    assert!(second.success);
    assert_eq!(second.stats.members.updated, 1);
    let member = store
        .find_member_by_email("lin@example.org")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(member.join_date, NaiveDate::from_ymd_opt(2020, 5, 1).unwrap());

    // The source drops the field again; the stored date stays
    *source.contacts.lock().unwrap() = vec![undated];
    let third = orchestrator(Arc::clone(&source), Arc::clone(&store))
        .run(SyncMode::Full, false)
        .await;
    assert_eq!(third.stats.members.updated, 0);
    assert_eq!(third.stats.members.skipped, 1);
    let member = store
        .find_member_by_email("lin@example.org")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(member.join_date, NaiveDate::from_ymd_opt(2020, 5, 1).unwrap());
}
