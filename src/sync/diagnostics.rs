//! Per-run counters, skip reasons and advisory warnings

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{EntityType, SyncMode};

/// Why a source record did not produce a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// Local entity already matches the source
    Unchanged,
    /// Transform rejected the record
    TransformFailed,
    /// Registration references a contact with no member mapping
    MissingMemberMapping,
    /// Registration belongs to an event with no mapping
    MissingEventMapping,
    /// Email already belongs to a member mapped from another live contact
    DuplicateNaturalKey,
    /// Local store rejected a write
    StoreError,
}

impl SkipReason {
    /// Reason as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Unchanged => "UNCHANGED",
            SkipReason::TransformFailed => "TRANSFORM_FAILED",
            SkipReason::MissingMemberMapping => "MISSING_MEMBER_MAPPING",
            SkipReason::MissingEventMapping => "MISSING_EVENT_MAPPING",
            SkipReason::DuplicateNaturalKey => "DUPLICATE_NATURAL_KEY",
            SkipReason::StoreError => "STORE_ERROR",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one source record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    /// New local entity
    Created,
    /// Existing local entity modified
    Updated,
    /// Existing local entity linked by natural key
    Linked,
    /// Existing local entity confirmed as is
    Unchanged,
    /// Not written
    Skipped,
    /// Failed
    Error,
}

/// Outcome of one source record, kept as a sample in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    /// Source id
    pub source_id: i64,
    /// Local id, when one was resolved
    pub local_id: Option<i64>,
    /// Action taken
    pub action: RecordAction,
    /// Why nothing was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    /// Changed fields or error detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RecordSummary {
    /// Summary for a record that reached the store
    pub fn written(source_id: i64, local_id: i64, action: RecordAction) -> Self {
        Self {
            source_id,
            local_id: Some(local_id),
            action,
            reason: None,
            detail: None,
        }
    }

    /// Summary for a record that was skipped or failed
    pub fn not_written(
        source_id: i64,
        action: RecordAction,
        reason: SkipReason,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            source_id,
            local_id: None,
            action,
            reason: Some(reason),
            detail: Some(detail.into()),
        }
    }

    /// Attach a detail string
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Counters of one entity category
///
/// Linked records count as updated and unchanged records as skipped, so that
/// `created + updated + skipped + errors == parsed` always holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStats {
    /// Source records processed
    pub parsed: u64,
    /// Local entities created
    pub created: u64,
    /// Local entities updated or linked
    pub updated: u64,
    /// Records skipped, including unchanged ones
    pub skipped: u64,
    /// Records that failed
    pub errors: u64,
    /// Sample of record outcomes
    #[serde(default)]
    pub records: Vec<RecordSummary>,
}

impl EntityStats {
    /// Count a record outcome, keeping at most `cap` samples
    pub fn record(&mut self, summary: RecordSummary, cap: usize) {
        self.parsed += 1;
        match summary.action {
            RecordAction::Created => self.created += 1,
            RecordAction::Updated | RecordAction::Linked => self.updated += 1,
            RecordAction::Unchanged | RecordAction::Skipped => self.skipped += 1,
            RecordAction::Error => self.errors += 1,
        }
        if self.records.len() < cap {
            self.records.push(summary);
        }
    }

    /// True when every parsed record is accounted for
    pub fn is_balanced(&self) -> bool {
        self.created + self.updated + self.skipped + self.errors == self.parsed
    }
}

/// Skip reason count with one sample detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipReasonCount {
    /// Reason
    pub reason: SkipReason,
    /// Occurrences
    pub count: u64,
    /// First detail seen
    pub sample: String,
}

/// Registration step diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationDiagnostics {
    /// Fetched events considered for registrations
    pub events_processed: u64,
    /// Events skipped because they have no mapping
    pub events_skipped_unmapped: u64,
    /// Registration fetch calls issued
    pub fetch_calls: u64,
    /// Registrations returned by the source
    pub registrations_fetched: u64,
    /// Registrations transformed successfully
    pub registrations_transformed: u64,
    /// Registrations created, updated or confirmed unchanged
    pub registrations_upserted: u64,
    /// Registrations skipped for a missing member mapping
    pub registrations_skipped_missing_member: u64,
    skip_reasons: BTreeMap<SkipReason, (u64, String)>,
}

impl RegistrationDiagnostics {
    /// Count a skip reason, keeping the first detail as its sample
    pub fn record_skip(&mut self, reason: SkipReason, detail: &str) {
        let entry = self
            .skip_reasons
            .entry(reason)
            .or_insert_with(|| (0, detail.to_string()));
        entry.0 += 1;
    }

    /// Occurrences of a skip reason
    pub fn skip_count(&self, reason: SkipReason) -> u64 {
        self.skip_reasons.get(&reason).map(|(n, _)| *n).unwrap_or(0)
    }

    /// Most frequent skip reasons, ties broken by reason order
    pub fn top_skip_reasons(&self, limit: usize) -> Vec<SkipReasonCount> {
        let mut reasons: Vec<SkipReasonCount> = self
            .skip_reasons
            .iter()
            .map(|(reason, (count, sample))| SkipReasonCount {
                reason: *reason,
                count: *count,
                sample: sample.clone(),
            })
            .collect();
        reasons.sort_by(|a, b| b.count.cmp(&a.count).then(a.reason.cmp(&b.reason)));
        reasons.truncate(limit);
        reasons
    }

    /// Serializable view for the report
    pub fn summary(&self) -> RegistrationSummary {
        RegistrationSummary {
            events_processed: self.events_processed,
            events_skipped_unmapped: self.events_skipped_unmapped,
            fetch_calls: self.fetch_calls,
            registrations_fetched: self.registrations_fetched,
            registrations_transformed: self.registrations_transformed,
            registrations_upserted: self.registrations_upserted,
            registrations_skipped_missing_member: self.registrations_skipped_missing_member,
            skip_reasons: self
                .skip_reasons
                .iter()
                .map(|(reason, (count, _))| (reason.as_str().to_string(), *count))
                .collect(),
            top_skip_reasons: self.top_skip_reasons(3),
        }
    }
}

/// Registration diagnostics as written to the report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSummary {
    /// Fetched events considered for registrations
    pub events_processed: u64,
    /// Events skipped because they have no mapping
    pub events_skipped_unmapped: u64,
    /// Registration fetch calls issued
    pub fetch_calls: u64,
    /// Registrations returned by the source
    pub registrations_fetched: u64,
    /// Registrations transformed successfully
    pub registrations_transformed: u64,
    /// Registrations created, updated or confirmed unchanged
    pub registrations_upserted: u64,
    /// Registrations skipped for a missing member mapping
    pub registrations_skipped_missing_member: u64,
    /// Full skip reason table
    pub skip_reasons: BTreeMap<String, u64>,
    /// Three most frequent skip reasons
    pub top_skip_reasons: Vec<SkipReasonCount>,
}

/// Stable warning codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    /// Full run fetched fewer contacts than expected
    LowContactCount,
    /// Full run fetched fewer events than expected
    LowEventCount,
    /// Full run fetched no contacts at all
    NoContactsFetched,
    /// Registrations were fetched but none reconciled
    NoRegistrationsUpserted,
    /// Most registrations point at unmapped contacts
    HighMemberSkipRatio,
    /// Contact linked to an existing member by email
    NaturalKeyMatch,
    /// Mapping of a contact not seen this run handed over to another contact
    MappingSuperseded,
    /// Mapping pointed at a local entity that no longer exists
    OrphanedMapping,
    /// Transform applied a fallback value
    TransformFallback,
    /// Field schema or membership levels could not be fetched
    LookupUnavailable,
}

/// Non-fatal advisory attached to a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWarning {
    /// Warning code
    pub code: WarningCode,
    /// Human-readable message
    pub message: String,
    /// Entity category of a record-level warning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    /// Source id of a record-level warning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<i64>,
}

impl SyncWarning {
    /// Run-level warning
    pub fn run(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            entity_type: None,
            source_id: None,
        }
    }

    /// Warning about one source record
    pub fn record(
        code: WarningCode,
        entity_type: EntityType,
        source_id: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            entity_type: Some(entity_type),
            source_id: Some(source_id),
        }
    }
}

/// Records returned by the source, per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedCounts {
    /// Contacts
    pub contacts: u64,
    /// Events
    pub events: u64,
    /// Registrations
    pub registrations: u64,
}

/// Floors for the low-count heuristics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarningThresholds {
    /// Expected minimum contacts in a full run
    pub min_contacts: u64,
    /// Expected minimum events in a full run
    pub min_events: u64,
}

/// Registrations fetched above which the member skip ratio is checked
const SKIP_RATIO_MIN_FETCHED: u64 = 100;

/// Apply the run-level warning heuristics
pub fn run_warnings(
    mode: SyncMode,
    fetched: &FetchedCounts,
    registrations: &RegistrationDiagnostics,
    thresholds: &WarningThresholds,
) -> Vec<SyncWarning> {
    let mut warnings = Vec::new();

    if mode == SyncMode::Full {
        if fetched.contacts == 0 {
            warnings.push(SyncWarning::run(
                WarningCode::NoContactsFetched,
                "Full sync fetched zero contacts",
            ));
        } else if fetched.contacts < thresholds.min_contacts {
            warnings.push(SyncWarning::run(
                WarningCode::LowContactCount,
                format!(
                    "Full sync fetched {} contacts, expected at least {}",
                    fetched.contacts, thresholds.min_contacts
                ),
            ));
        }

        if fetched.events < thresholds.min_events {
            warnings.push(SyncWarning::run(
                WarningCode::LowEventCount,
                format!(
                    "Full sync fetched {} events, expected at least {}",
                    fetched.events, thresholds.min_events
                ),
            ));
        }
    }

    if registrations.registrations_fetched > 0 && registrations.registrations_upserted == 0 {
        let reasons = registrations
            .top_skip_reasons(3)
            .iter()
            .map(|r| format!("{} ({})", r.reason, r.count))
            .collect::<Vec<_>>()
            .join(", ");
        warnings.push(SyncWarning::run(
            WarningCode::NoRegistrationsUpserted,
            format!(
                "{} registrations fetched but none upserted; top skip reasons: {}",
                registrations.registrations_fetched, reasons
            ),
        ));
    }

    let fetched_registrations = registrations.registrations_fetched;
    let skipped_missing = registrations.registrations_skipped_missing_member;
    if fetched_registrations > SKIP_RATIO_MIN_FETCHED
        && skipped_missing * 10 > fetched_registrations * 9
    {
        warnings.push(SyncWarning::run(
            WarningCode::HighMemberSkipRatio,
            format!(
                "{} of {} registrations skipped for missing member mappings; run a full contact sync first",
                skipped_missing, fetched_registrations
            ),
        ));
    }

    warnings
}
