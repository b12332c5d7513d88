//! State of one sync invocation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::diagnostics::{
    EntityStats, FetchedCounts, RecordSummary, RegistrationDiagnostics, SyncWarning,
};
use crate::models::{EntityType, SyncMode};

/// Error recorded against a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunError {
    /// Stable error code
    pub code: String,
    /// Message
    pub message: String,
    /// Entity category, when the error concerns a record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    /// Source id, when the error concerns a record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<i64>,
    /// Whether the error ended the run
    #[serde(default)]
    pub fatal: bool,
}

/// Source id to local id pairs confirmed during a run
#[derive(Debug, Clone, Default)]
struct ConfirmedMappings {
    by_source: BTreeMap<i64, i64>,
    by_local: HashMap<i64, i64>,
}

impl ConfirmedMappings {
    fn insert(&mut self, source_id: i64, local_id: i64) {
        if let Some(previous) = self.by_source.insert(source_id, local_id) {
            self.by_local.remove(&previous);
        }
        if let Some(displaced) = self.by_local.insert(local_id, source_id) {
            if displaced != source_id {
                self.by_source.remove(&displaced);
            }
        }
    }
}

/// Everything a run accumulates before it becomes a report
///
/// Confirmed mappings double as the run's view of pending writes: in dry-run
/// mode nothing reaches the store, so later steps resolve provisional ids
/// from here.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Run id (UUID v4)
    pub run_id: String,
    /// Mode
    pub mode: SyncMode,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// No store or audit writes
    pub dry_run: bool,
    /// Records returned by the source
    pub fetched: FetchedCounts,
    /// Member counters
    pub members: EntityStats,
    /// Event counters
    pub events: EntityStats,
    /// Registration counters
    pub registrations: EntityStats,
    /// Registration step diagnostics
    pub registration_diagnostics: RegistrationDiagnostics,
    /// Run and record warnings
    pub warnings: Vec<SyncWarning>,
    /// Record warnings not kept because of the cap
    pub warnings_dropped: u64,
    /// Every error of the run
    pub errors: Vec<RunError>,
    /// Set once a fatal error ended the run
    pub fatal: bool,
    max_record_warnings: usize,
    record_warning_count: usize,
    max_records: usize,
    next_provisional_id: i64,
    confirmed: HashMap<EntityType, ConfirmedMappings>,
    provisional_emails: HashMap<String, i64>,
    provisional_registrations: HashMap<(i64, i64), i64>,
}

impl RunContext {
    /// Fresh context with a new run id
    pub fn new(mode: SyncMode, dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            mode,
            started_at,
            dry_run,
            fetched: FetchedCounts::default(),
            members: EntityStats::default(),
            events: EntityStats::default(),
            registrations: EntityStats::default(),
            registration_diagnostics: RegistrationDiagnostics::default(),
            warnings: Vec::new(),
            warnings_dropped: 0,
            errors: Vec::new(),
            fatal: false,
            max_record_warnings: usize::MAX,
            record_warning_count: 0,
            max_records: usize::MAX,
            next_provisional_id: -1,
            confirmed: HashMap::new(),
            provisional_emails: HashMap::new(),
            provisional_registrations: HashMap::new(),
        }
    }

    /// Cap record warnings and record samples
    pub fn with_limits(mut self, max_record_warnings: usize, max_records: usize) -> Self {
        self.max_record_warnings = max_record_warnings;
        self.max_records = max_records;
        self
    }

    /// Counters of an entity category
    pub fn stats_mut(&mut self, entity_type: EntityType) -> &mut EntityStats {
        match entity_type {
            EntityType::Member => &mut self.members,
            EntityType::Event => &mut self.events,
            EntityType::Registration => &mut self.registrations,
        }
    }

    /// Count a record outcome
    pub fn record(&mut self, entity_type: EntityType, summary: RecordSummary) {
        let cap = self.max_records;
        self.stats_mut(entity_type).record(summary, cap);
    }

    /// Add a record-level warning, subject to the cap
    pub fn add_record_warning(&mut self, warning: SyncWarning) {
        if self.record_warning_count < self.max_record_warnings {
            self.record_warning_count += 1;
            self.warnings.push(warning);
        } else {
            self.warnings_dropped += 1;
        }
    }

    /// Add a run-level warning; never capped
    pub fn add_run_warning(&mut self, warning: SyncWarning) {
        self.warnings.push(warning);
    }

    /// Record an error
    pub fn add_error(
        &mut self,
        code: &str,
        message: impl Into<String>,
        entity_type: Option<EntityType>,
        source_id: Option<i64>,
    ) {
        self.errors.push(RunError {
            code: code.to_string(),
            message: message.into(),
            entity_type,
            source_id,
            fatal: false,
        });
    }

    /// Record the error that ends the run
    pub fn fail(&mut self, code: &str, message: impl Into<String>) {
        self.fatal = true;
        self.errors.push(RunError {
            code: code.to_string(),
            message: message.into(),
            entity_type: None,
            source_id: None,
            fatal: true,
        });
    }

    /// Negative id standing in for an entity a dry run would create
    pub fn next_provisional_id(&mut self) -> i64 {
        let id = self.next_provisional_id;
        self.next_provisional_id -= 1;
        id
    }

    /// Note that a source record maps to a local id in this run
    pub fn confirm(&mut self, entity_type: EntityType, source_id: i64, local_id: i64) {
        self.confirmed
            .entry(entity_type)
            .or_default()
            .insert(source_id, local_id);
    }

    /// Local id confirmed for a source record in this run
    pub fn confirmed_local(&self, entity_type: EntityType, source_id: i64) -> Option<i64> {
        self.confirmed
            .get(&entity_type)
            .and_then(|m| m.by_source.get(&source_id).copied())
    }

    /// Source id confirmed for a local entity in this run
    pub fn confirmed_source(&self, entity_type: EntityType, local_id: i64) -> Option<i64> {
        self.confirmed
            .get(&entity_type)
            .and_then(|m| m.by_local.get(&local_id).copied())
    }

    /// True when a source record was already confirmed in this run
    pub fn is_confirmed(&self, entity_type: EntityType, source_id: i64) -> bool {
        self.confirmed_local(entity_type, source_id).is_some()
    }

    /// Confirmed pairs of an entity category, ordered by source id
    pub fn confirmed_pairs(&self, entity_type: EntityType) -> Vec<(i64, i64)> {
        self.confirmed
            .get(&entity_type)
            .map(|m| m.by_source.iter().map(|(s, l)| (*s, *l)).collect())
            .unwrap_or_default()
    }

    /// Remember the email of a member a dry run would create
    pub fn remember_provisional_email(&mut self, email: &str, local_id: i64) {
        self.provisional_emails.insert(email.to_string(), local_id);
    }

    /// Provisional member id for an email
    pub fn provisional_member(&self, email: &str) -> Option<i64> {
        self.provisional_emails.get(email).copied()
    }

    /// Remember a registration a dry run would create
    pub fn remember_provisional_registration(&mut self, event_id: i64, member_id: i64, id: i64) {
        self.provisional_registrations
            .insert((event_id, member_id), id);
    }

    /// Provisional registration id for an (event, member) key
    pub fn provisional_registration(&self, event_id: i64, member_id: i64) -> Option<i64> {
        self.provisional_registrations
            .get(&(event_id, member_id))
            .copied()
    }

    /// Mode tag used in audit entries
    pub fn audit_mode(&self) -> &'static str {
        self.mode.as_str()
    }
}
