//! Id mappings, sync state and audit log records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of entity tracked by an id mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Source contact / local member
    Member,
    /// Source event / local event
    Event,
    /// Source registration / local registration
    Registration,
}

impl EntityType {
    /// Every tracked entity type
    pub const ALL: [EntityType; 3] = [
        EntityType::Member,
        EntityType::Event,
        EntityType::Registration,
    ];

    /// Entity type as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Member => "member",
            EntityType::Event => "event",
            EntityType::Registration => "registration",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(EntityType::Member),
            "event" => Ok(EntityType::Event),
            "registration" => Ok(EntityType::Registration),
            _ => Err(format!("Invalid entity type: {}", s)),
        }
    }
}

/// Link between a source record and the local entity created from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdMapping {
    /// Entity kind
    pub entity_type: EntityType,
    /// Source id
    pub source_id: i64,
    /// Local id
    pub local_id: i64,
    /// Last time a sync confirmed this mapping
    pub synced_at: DateTime<Utc>,
}

/// Sync mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Everything the source exposes
    Full,
    /// Windowed by the previous run's timestamps
    Incremental,
}

impl SyncMode {
    /// Mode as stored and reported
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-organization record of the last successful runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Organization key
    pub organization_id: String,
    /// Last successful full run
    pub last_full_sync: Option<DateTime<Utc>>,
    /// Last successful incremental run
    pub last_incremental_sync: Option<DateTime<Utc>>,
    /// Last time contacts were synced
    pub last_contact_sync: Option<DateTime<Utc>>,
    /// Last time events were synced
    pub last_event_sync: Option<DateTime<Utc>>,
    /// Last time registrations were synced
    pub last_registration_sync: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Empty state for an organization that has never synced
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            ..Default::default()
        }
    }

    /// Record a successful run finishing at `at`
    pub fn mark_completed(&mut self, mode: SyncMode, at: DateTime<Utc>) {
        match mode {
            SyncMode::Full => self.last_full_sync = Some(at),
            SyncMode::Incremental => self.last_incremental_sync = Some(at),
        }
        self.last_contact_sync = Some(at);
        self.last_event_sync = Some(at);
        self.last_registration_sync = Some(at);
    }
}

/// Audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Local entity inserted
    Create,
    /// Local entity modified
    Update,
    /// Existing local entity linked to a source record
    Link,
    /// Stale mapping removed
    DeleteMapping,
}

impl AuditAction {
    /// Action as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Link => "link",
            AuditAction::DeleteMapping => "delete_mapping",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(AuditAction::Create),
            "update" => Ok(AuditAction::Update),
            "link" => Ok(AuditAction::Link),
            "delete_mapping" => Ok(AuditAction::DeleteMapping),
            _ => Err(format!("Invalid audit action: {}", s)),
        }
    }
}

/// Append-only audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Run that produced the entry
    pub run_id: String,
    /// Run mode, or `maintenance` for stale cleanup
    pub mode: String,
    /// Action
    pub action: AuditAction,
    /// Entity kind
    pub entity_type: EntityType,
    /// Local id, when known
    pub local_id: Option<i64>,
    /// Source id, when known
    pub source_id: Option<i64>,
    /// Action details
    pub details: serde_json::Value,
    /// Time of the action
    pub created_at: DateTime<Utc>,
}

/// Row counts of the local store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCounts {
    /// Members
    pub members: u64,
    /// Events
    pub events: u64,
    /// Registrations
    pub registrations: u64,
    /// Member mappings
    pub member_mappings: u64,
    /// Event mappings
    pub event_mappings: u64,
    /// Registration mappings
    pub registration_mappings: u64,
}

/// Registration whose event or member row is missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanRegistration {
    /// Local registration id
    pub registration_id: i64,
    /// Referenced event id
    pub event_id: i64,
    /// Referenced member id
    pub member_id: i64,
    /// Event row is missing
    pub missing_event: bool,
    /// Member row is missing
    pub missing_member: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entity_type_parse() {
        for entity in EntityType::ALL {
            assert_eq!(entity.as_str().parse::<EntityType>(), Ok(entity));
        }
        assert!("contact".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_mark_completed_full() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut state = SyncState::new("club");
        state.mark_completed(SyncMode::Full, at);

        assert_eq!(state.last_full_sync, Some(at));
        assert_eq!(state.last_incremental_sync, None);
        assert_eq!(state.last_contact_sync, Some(at));
        assert_eq!(state.last_event_sync, Some(at));
        assert_eq!(state.last_registration_sync, Some(at));
    }

    #[test]
    fn test_mark_completed_incremental_keeps_full() {
        let first = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let mut state = SyncState::new("club");
        state.mark_completed(SyncMode::Full, first);
        state.mark_completed(SyncMode::Incremental, second);

        assert_eq!(state.last_full_sync, Some(first));
        assert_eq!(state.last_incremental_sync, Some(second));
        assert_eq!(state.last_contact_sync, Some(second));
    }

    #[test]
    fn test_audit_action_round_trip() {
        assert_eq!(
            "delete_mapping".parse::<AuditAction>(),
            Ok(AuditAction::DeleteMapping)
        );
        assert_eq!(AuditAction::Link.as_str(), "link");
    }
}
