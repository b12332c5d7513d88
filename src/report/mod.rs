//! Sync run report
//!
//! A `SyncReport` is the only artifact a run leaves besides the store writes
//! and the sync state. It is written as camelCase JSON to
//! `{report_dir}/sync-report-{run_id}.json`.

pub mod invariants;
pub mod verify;

pub use invariants::{assert_no_violations, validate_report, InvariantViolation, ViolationCode};
pub use verify::{verify_store, VerifyReport};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::error::ReportError;
use crate::models::{EntityType, SyncMode};
use crate::sync::context::{RunContext, RunError};
use crate::sync::diagnostics::{EntityStats, FetchedCounts, RegistrationSummary, SyncWarning};

/// Report format version
pub const REPORT_VERSION: &str = "1.0";

/// Source id / local id pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingPair {
    /// Source id
    pub source_id: i64,
    /// Local id
    pub local_id: i64,
}

/// Mappings confirmed by the run, per category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdMappingSummary {
    /// Contacts to members
    pub members: Vec<MappingPair>,
    /// Source events to local events
    pub events: Vec<MappingPair>,
    /// Source registrations to local registrations
    pub registrations: Vec<MappingPair>,
}

/// Counters per category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    /// Members
    pub members: EntityStats,
    /// Events
    pub events: EntityStats,
    /// Registrations
    pub registrations: EntityStats,
}

/// Serialized outcome of one sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Report format version
    pub version: String,
    /// Run id
    pub run_id: String,
    /// Mode
    pub mode: SyncMode,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration
    pub duration_ms: u64,
    /// False when a fatal error ended the run
    pub success: bool,
    /// Preview run without writes
    pub dry_run: bool,
    /// Records returned by the source
    pub fetched: FetchedCounts,
    /// Run warnings followed by record warnings
    pub warnings: Vec<SyncWarning>,
    /// Record warnings dropped by the cap
    #[serde(default)]
    pub warnings_dropped: u64,
    /// Per-category counters
    pub stats: ReportStats,
    /// Registration step diagnostics
    pub registration_diagnostics: RegistrationSummary,
    /// Sample of errors
    pub errors: Vec<RunError>,
    /// Number of errors, including those left out of the sample
    pub total_error_count: u64,
    /// Mappings confirmed by the run
    pub id_mappings: IdMappingSummary,
}

impl SyncReport {
    /// Build the report of a finished run
    pub fn from_context(ctx: &RunContext, finished_at: DateTime<Utc>, max_errors: usize) -> Self {
        let pairs = |entity_type: EntityType| -> Vec<MappingPair> {
            ctx.confirmed_pairs(entity_type)
                .into_iter()
                .map(|(source_id, local_id)| MappingPair {
                    source_id,
                    local_id,
                })
                .collect()
        };

        // Fatal errors come last; keep them in a full sample, but an empty sample stays empty
        let mut errors: Vec<RunError> = ctx.errors.iter().take(max_errors).cloned().collect();
        if let Some(fatal) = ctx.errors.iter().find(|e| e.fatal) {
            if max_errors > 0 && !errors.iter().any(|e| e.fatal) {
                errors.pop();
                errors.push(fatal.clone());
            }
        }

        Self {
            version: REPORT_VERSION.to_string(),
            run_id: ctx.run_id.clone(),
            mode: ctx.mode,
            started_at: ctx.started_at,
            finished_at,
            duration_ms: (finished_at - ctx.started_at).num_milliseconds().max(0) as u64,
            success: !ctx.fatal,
            dry_run: ctx.dry_run,
            fetched: ctx.fetched,
            warnings: ctx.warnings.clone(),
            warnings_dropped: ctx.warnings_dropped,
            stats: ReportStats {
                members: ctx.members.clone(),
                events: ctx.events.clone(),
                registrations: ctx.registrations.clone(),
            },
            registration_diagnostics: ctx.registration_diagnostics.summary(),
            errors,
            total_error_count: ctx.errors.len() as u64,
            id_mappings: IdMappingSummary {
                members: pairs(EntityType::Member),
                events: pairs(EntityType::Event),
                registrations: pairs(EntityType::Registration),
            },
        }
    }

    /// File name of the report
    pub fn file_name(&self) -> String {
        format!("sync-report-{}.json", self.run_id)
    }
}

/// Writes and reads report files
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    /// Writer targeting a directory, created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a report, returning its path
    pub async fn write(&self, report: &SyncReport) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(report.file_name());
        let body = serde_json::to_vec_pretty(report)?;
        fs::write(&path, body).await?;

        info!(path = %path.display(), run_id = %report.run_id, "Sync report written");
        Ok(path)
    }

    /// Read a report as raw JSON, for validation of files of unknown shape
    pub async fn read_value(path: impl AsRef<Path>) -> Result<serde_json::Value, ReportError> {
        let body = fs::read(path.as_ref()).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Read a typed report
    pub async fn read(path: impl AsRef<Path>) -> Result<SyncReport, ReportError> {
        let body = fs::read(path.as_ref()).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::diagnostics::{RecordAction, RecordSummary};
    use tempfile::TempDir;

    fn context() -> RunContext {
        let mut ctx = RunContext::new(SyncMode::Full, false, Utc::now());
        ctx.fetched.contacts = 2;
        ctx.record(
            EntityType::Member,
            RecordSummary::written(100, 1, RecordAction::Created),
        );
        ctx.record(
            EntityType::Member,
            RecordSummary::written(101, 2, RecordAction::Unchanged),
        );
        ctx.confirm(EntityType::Member, 100, 1);
        ctx.confirm(EntityType::Member, 101, 2);
        ctx
    }

    #[test]
    fn test_report_uses_camel_case_fields() {
        let ctx = context();
        let report = SyncReport::from_context(&ctx, Utc::now(), 10);
        let json = serde_json::to_value(&report).unwrap();

        for field in [
            "version",
            "runId",
            "mode",
            "startedAt",
            "finishedAt",
            "durationMs",
            "success",
            "dryRun",
            "fetched",
            "warnings",
            "stats",
            "registrationDiagnostics",
            "errors",
            "totalErrorCount",
            "idMappings",
        ] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(json["mode"], "full");
        assert_eq!(json["stats"]["members"]["created"], 1);
        assert_eq!(json["idMappings"]["members"][1]["localId"], 2);
        assert!(json["registrationDiagnostics"]["topSkipReasons"].is_array());
    }

    #[test]
    fn test_error_sample_is_capped() {
        let mut ctx = context();
        for id in 0..5 {
            ctx.add_error("API_ERROR", "boom", Some(EntityType::Event), Some(id));
        }
        ctx.fail("TIMEOUT", "events unreachable");

        let report = SyncReport::from_context(&ctx, Utc::now(), 3);
        assert_eq!(report.errors.len(), 3);
        assert_eq!(report.total_error_count, 6);
        assert!(!report.success);
        assert!(report.errors[2].fatal);
    }

    #[test]
    fn test_zero_error_sample_stays_empty() {
        let mut ctx = context();
        ctx.add_error("API_ERROR", "boom", Some(EntityType::Event), Some(7));
        ctx.fail("TIMEOUT", "events unreachable");

        let report = SyncReport::from_context(&ctx, Utc::now(), 0);
        assert!(report.errors.is_empty());
        assert_eq!(report.total_error_count, 2);
        assert!(!report.success);
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(temp_dir.path().join("reports"));
        let report = SyncReport::from_context(&context(), Utc::now(), 10);

        let path = writer.write(&report).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("sync-report-{}.json", report.run_id)
        );

        let read = ReportWriter::read(&path).await.unwrap();
        assert_eq!(read, report);
        let value = ReportWriter::read_value(&path).await.unwrap();
        assert_eq!(value["runId"], report.run_id.as_str());
    }
}
