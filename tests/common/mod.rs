//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use membership_sync::client::MemberSource;
use membership_sync::config::SyncConfig;
use membership_sync::database::SqliteDatabase;
use membership_sync::error::ApiError;
use membership_sync::models::{
    AccountInfo, ApiContact, ApiEvent, ApiRegistration, ContactFieldDef, MembershipLevel,
};
use membership_sync::sync::SyncOrchestrator;

/// In-memory source with call counters
#[derive(Default)]
pub struct FakeSource {
    pub contacts: Mutex<Vec<ApiContact>>,
    pub events: Mutex<Vec<ApiEvent>>,
    pub registrations: Mutex<HashMap<i64, Vec<ApiRegistration>>>,
    pub failing_events: Mutex<HashSet<i64>>,
    pub contact_calls: AtomicU32,
    pub event_calls: AtomicU32,
    pub registration_calls: AtomicU32,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contacts(self, contacts: Vec<ApiContact>) -> Self {
        *self.contacts.lock().unwrap() = contacts;
        self
    }

    pub fn with_events(self, events: Vec<ApiEvent>) -> Self {
        *self.events.lock().unwrap() = events;
        self
    }

    pub fn with_registrations(self, event_id: i64, registrations: Vec<ApiRegistration>) -> Self {
        self.registrations
            .lock()
            .unwrap()
            .insert(event_id, registrations);
        self
    }

    /// Total entity fetch calls
    pub fn fetch_calls(&self) -> u32 {
        self.contact_calls.load(Ordering::SeqCst)
            + self.event_calls.load(Ordering::SeqCst)
            + self.registration_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MemberSource for FakeSource {
    async fn check_connectivity(&self) -> Result<AccountInfo, ApiError> {
        Ok(AccountInfo {
            id: 4242,
            name: Some("Riverside Club".to_string()),
        })
    }

    async fn fetch_contacts(
        &self,
        _modified_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ApiContact>, ApiError> {
        self.contact_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.contacts.lock().unwrap().clone())
    }

    async fn fetch_events(
        &self,
        _starting_from: Option<DateTime<Utc>>,
    ) -> Result<Vec<ApiEvent>, ApiError> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.events.lock().unwrap().clone())
    }

    async fn fetch_registrations(&self, event_id: i64) -> Result<Vec<ApiRegistration>, ApiError> {
        self.registration_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_events.lock().unwrap().contains(&event_id) {
            return Err(ApiError::Network("connection reset".to_string()));
        }
        Ok(self
            .registrations
            .lock()
            .unwrap()
            .get(&event_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_membership_levels(&self) -> Result<Vec<MembershipLevel>, ApiError> {
        Ok(vec![MembershipLevel {
            id: 1,
            name: "Regular".to_string(),
            membership_fee: Some(40.0),
        }])
    }

    async fn fetch_contact_fields(&self) -> Result<Vec<ContactFieldDef>, ApiError> {
        Ok(vec![])
    }
}

/// Create an in-memory database for testing
pub async fn create_test_database() -> Arc<SqliteDatabase> {
    Arc::new(
        SqliteDatabase::in_memory()
            .await
            .expect("Failed to create test database"),
    )
}

/// Sync settings with the low-count heuristics out of the way
pub fn test_sync_config() -> SyncConfig {
    SyncConfig {
        min_expected_contacts: 0,
        min_expected_events: 0,
        batch_size: 4,
        ..Default::default()
    }
}

pub fn orchestrator(source: Arc<FakeSource>, store: Arc<SqliteDatabase>) -> SyncOrchestrator {
    SyncOrchestrator::new(source, store, test_sync_config())
}

pub fn contact(id: i64, email: &str, first: &str, last: &str) -> ApiContact {
    serde_json::from_value(json!({
        "Id": id,
        "FirstName": first,
        "LastName": last,
        "Email": email,
        "Status": "Active",
        "MembershipLevel": {"Id": 1},
        "FieldValues": [
            {"FieldName": "Member since", "SystemCode": "MemberSince", "Value": "2020-05-01"}
        ]
    }))
    .expect("valid contact fixture")
}

pub fn event(id: i64, name: &str) -> ApiEvent {
    serde_json::from_value(json!({
        "Id": id,
        "Name": name,
        "StartDate": "2026-11-05T18:00:00Z",
        "EndDate": "2026-11-05T21:00:00Z",
        "Location": "Clubhouse",
        "RegistrationEnabled": true,
        "RegistrationsLimit": 80
    }))
    .expect("valid event fixture")
}

pub fn registration(id: i64, event_id: i64, contact_id: i64) -> ApiRegistration {
    serde_json::from_value(json!({
        "Id": id,
        "Event": {"Id": event_id},
        "Contact": {"Id": contact_id},
        "RegistrationType": {"Id": 3, "Name": "Member"},
        "RegistrationDate": "2026-10-01T10:00:00Z"
    }))
    .expect("valid registration fixture")
}

/// Ten contacts with distinct emails, ids 1..=10
pub fn ten_contacts() -> Vec<ApiContact> {
    (1..=10)
        .map(|i| contact(i, &format!("member{}@example.org", i), "Member", &format!("No{}", i)))
        .collect()
}
