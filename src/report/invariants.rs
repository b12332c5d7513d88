//! Structural and count invariants of a sync report
//!
//! Validation works on raw JSON so that hand-edited or truncated report files
//! produce violations instead of decode errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::InvariantError;

/// Top-level fields every report carries
const REQUIRED_FIELDS: &[&str] = &[
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
];

const ENTITY_CATEGORIES: &[&str] = &["members", "events", "registrations"];

const COUNT_FIELDS: &[&str] = &["parsed", "created", "updated", "skipped", "errors"];

/// Violation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCode {
    /// Required field absent
    MissingField,
    /// Count negative or not an integer
    NegativeCount,
    /// Outcome counts do not add up to parsed
    CountMismatch,
    /// More record samples than parsed records
    RecordsExceedParsed,
    /// Source id mapped twice
    DuplicateSourceId,
    /// Local id mapped twice
    DuplicateLocalId,
    /// Mapping entry without an id
    MissingId,
    /// Registration referencing a missing member or event
    OrphanRegistration,
    /// Mapping pointing at a missing local entity
    DanglingMapping,
}

impl ViolationCode {
    /// Code as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationCode::MissingField => "MISSING_FIELD",
            ViolationCode::NegativeCount => "NEGATIVE_COUNT",
            ViolationCode::CountMismatch => "COUNT_MISMATCH",
            ViolationCode::RecordsExceedParsed => "RECORDS_EXCEED_PARSED",
            ViolationCode::DuplicateSourceId => "DUPLICATE_SOURCE_ID",
            ViolationCode::DuplicateLocalId => "DUPLICATE_LOCAL_ID",
            ViolationCode::MissingId => "MISSING_ID",
            ViolationCode::OrphanRegistration => "ORPHAN_REGISTRATION",
            ViolationCode::DanglingMapping => "DANGLING_MAPPING",
        }
    }
}

impl std::fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One broken invariant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Code
    pub code: ViolationCode,
    /// Message
    pub message: String,
    /// Location in the report, dotted
    pub path: String,
    /// Offending values
    pub details: Value,
}

impl InvariantViolation {
    /// New violation
    pub fn new(
        code: ViolationCode,
        path: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            path: path.into(),
            details,
        }
    }
}

/// Validate a report document
pub fn validate_report(report: &Value) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for field in REQUIRED_FIELDS {
        if report.get(field).is_none() {
            violations.push(InvariantViolation::new(
                ViolationCode::MissingField,
                *field,
                format!("Required field '{}' is missing", field),
                Value::Null,
            ));
        }
    }

    if let Some(fetched) = report.get("fetched") {
        for category in ["contacts", "events", "registrations"] {
            let path = format!("fetched.{}", category);
            check_count(fetched.get(category), &path, &mut violations);
        }
    }

    if let Some(stats) = report.get("stats") {
        for category in ENTITY_CATEGORIES {
            validate_stats(stats.get(category), category, &mut violations);
        }
    }

    if let Some(total) = report.get("totalErrorCount") {
        check_count(Some(total), "totalErrorCount", &mut violations);
    }

    if let Some(mappings) = report.get("idMappings") {
        for category in ENTITY_CATEGORIES {
            validate_mappings(mappings.get(category), category, &mut violations);
        }
    }

    violations
}

/// Turn violations into a single error
pub fn assert_no_violations(violations: &[InvariantViolation]) -> Result<(), InvariantError> {
    if violations.is_empty() {
        return Ok(());
    }
    let summary = violations
        .iter()
        .map(|v| format!("{} at {}", v.code, v.path))
        .collect::<Vec<_>>()
        .join("; ");
    Err(InvariantError {
        count: violations.len(),
        summary,
    })
}

/// Read a non-negative count, recording a violation when it is not one
fn check_count(
    value: Option<&Value>,
    path: &str,
    violations: &mut Vec<InvariantViolation>,
) -> Option<u64> {
    match value {
        None | Some(Value::Null) => {
            violations.push(InvariantViolation::new(
                ViolationCode::MissingField,
                path,
                format!("Count '{}' is missing", path),
                Value::Null,
            ));
            None
        }
        Some(v) => match v.as_u64() {
            Some(n) => Some(n),
            None => {
                violations.push(InvariantViolation::new(
                    ViolationCode::NegativeCount,
                    path,
                    format!("Count '{}' must be a non-negative integer", path),
                    v.clone(),
                ));
                None
            }
        },
    }
}

fn validate_stats(stats: Option<&Value>, category: &str, violations: &mut Vec<InvariantViolation>) {
    let base = format!("stats.{}", category);
    let Some(stats) = stats.filter(|s| s.is_object()) else {
        violations.push(InvariantViolation::new(
            ViolationCode::MissingField,
            &base,
            format!("Stats for '{}' are missing", category),
            Value::Null,
        ));
        return;
    };

    let counts: Vec<Option<u64>> = COUNT_FIELDS
        .iter()
        .map(|field| check_count(stats.get(field), &format!("{}.{}", base, field), violations))
        .collect();

    let &[Some(parsed), Some(created), Some(updated), Some(skipped), Some(errors)] =
        counts.as_slice()
    else {
        return;
    };

    let Some(accounted) = created
        .checked_add(updated)
        .and_then(|sum| sum.checked_add(skipped))
        .and_then(|sum| sum.checked_add(errors))
    else {
        violations.push(InvariantViolation::new(
            ViolationCode::CountMismatch,
            &base,
            format!(
                "created + updated + skipped + errors overflows but parsed = {}",
                parsed
            ),
            serde_json::json!({
                "parsed": parsed,
                "created": created,
                "updated": updated,
                "skipped": skipped,
                "errors": errors,
            }),
        ));
        return;
    };
    if accounted != parsed {
        violations.push(InvariantViolation::new(
            ViolationCode::CountMismatch,
            &base,
            format!(
                "created + updated + skipped + errors = {} but parsed = {}",
                accounted, parsed
            ),
            serde_json::json!({
                "parsed": parsed,
                "created": created,
                "updated": updated,
                "skipped": skipped,
                "errors": errors,
            }),
        ));
    }

    if let Some(records) = stats.get("records").and_then(Value::as_array) {
        if records.len() as u64 > parsed {
            violations.push(InvariantViolation::new(
                ViolationCode::RecordsExceedParsed,
                format!("{}.records", base),
                format!("{} records listed but only {} parsed", records.len(), parsed),
                serde_json::json!({ "records": records.len(), "parsed": parsed }),
            ));
        }
    }
}

fn validate_mappings(
    mappings: Option<&Value>,
    category: &str,
    violations: &mut Vec<InvariantViolation>,
) {
    let base = format!("idMappings.{}", category);
    let Some(entries) = mappings.and_then(Value::as_array) else {
        violations.push(InvariantViolation::new(
            ViolationCode::MissingField,
            &base,
            format!("Mappings for '{}' are missing", category),
            Value::Null,
        ));
        return;
    };

    let mut sources = HashSet::new();
    let mut locals = HashSet::new();
    for (index, entry) in entries.iter().enumerate() {
        let path = format!("{}[{}]", base, index);
        let source_id = entry.get("sourceId").and_then(Value::as_i64);
        let local_id = entry.get("localId").and_then(Value::as_i64);

        let (Some(source_id), Some(local_id)) = (source_id, local_id) else {
            violations.push(InvariantViolation::new(
                ViolationCode::MissingId,
                &path,
                "Mapping entry lacks sourceId or localId",
                entry.clone(),
            ));
            continue;
        };

        if !sources.insert(source_id) {
            violations.push(InvariantViolation::new(
                ViolationCode::DuplicateSourceId,
                &path,
                format!("Source id {} mapped more than once", source_id),
                entry.clone(),
            ));
        }
        if !locals.insert(local_id) {
            violations.push(InvariantViolation::new(
                ViolationCode::DuplicateLocalId,
                &path,
                format!("Local id {} mapped more than once", local_id),
                entry.clone(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stats(parsed: i64, created: i64, updated: i64, skipped: i64, errors: i64) -> Value {
        json!({
            "parsed": parsed,
            "created": created,
            "updated": updated,
            "skipped": skipped,
            "errors": errors,
            "records": [],
        })
    }

    fn valid_report() -> Value {
        json!({
            "version": "1.0",
            "runId": "4f1c",
            "mode": "full",
            "startedAt": "2026-10-01T00:00:00Z",
            "finishedAt": "2026-10-01T00:01:00Z",
            "durationMs": 60000,
            "success": true,
            "dryRun": false,
            "fetched": {"contacts": 3, "events": 1, "registrations": 2},
            "warnings": [],
            "stats": {
                "members": stats(3, 1, 1, 1, 0),
                "events": stats(1, 1, 0, 0, 0),
                "registrations": stats(2, 0, 0, 1, 1),
            },
            "registrationDiagnostics": {"topSkipReasons": []},
            "errors": [],
            "totalErrorCount": 1,
            "idMappings": {
                "members": [{"sourceId": 1, "localId": 10}, {"sourceId": 2, "localId": 11}],
                "events": [{"sourceId": 5, "localId": 20}],
                "registrations": [],
            },
        })
    }

    fn codes(violations: &[InvariantViolation]) -> Vec<ViolationCode> {
        violations.iter().map(|v| v.code).collect()
    }

    // Test 1: A consistent report has no violations
    #[test]
    fn test_valid_report() {
        let violations = validate_report(&valid_report());
        assert!(violations.is_empty(), "{:?}", violations);
        assert!(assert_no_violations(&violations).is_ok());
    }

    // Test 2: Missing top-level field
    #[test]
    fn test_missing_field() {
        let mut report = valid_report();
        report.as_object_mut().unwrap().remove("runId");

        let violations = validate_report(&report);
        assert_eq!(codes(&violations), vec![ViolationCode::MissingField]);
        assert_eq!(violations[0].path, "runId");
    }

    // Test 3: Negative count
    #[test]
    fn test_negative_count() {
        let mut report = valid_report();
        report["stats"]["events"] = stats(1, 2, -1, 0, 0);

        let violations = validate_report(&report);
        assert_eq!(codes(&violations), vec![ViolationCode::NegativeCount]);
        assert_eq!(violations[0].path, "stats.events.updated");
    }

    // Test 4: Counts that do not add up
    #[test]
    fn test_count_mismatch() {
        let mut report = valid_report();
        report["stats"]["members"] = stats(5, 1, 1, 1, 0);

        let violations = validate_report(&report);
        assert_eq!(codes(&violations), vec![ViolationCode::CountMismatch]);
        assert_eq!(violations[0].details["parsed"], 5);
    }

    // Test 5: More samples than parsed records
    #[test]
    fn test_records_exceed_parsed() {
        let mut report = valid_report();
        report["stats"]["events"]["records"] = json!([{}, {}]);

        let violations = validate_report(&report);
        assert_eq!(codes(&violations), vec![ViolationCode::RecordsExceedParsed]);
    }

    // Test 6: Duplicate and missing mapping ids
    #[test]
    fn test_mapping_violations() {
        let mut report = valid_report();
        report["idMappings"]["members"] = json!([
            {"sourceId": 1, "localId": 10},
            {"sourceId": 1, "localId": 11},
            {"sourceId": 2, "localId": 10},
            {"sourceId": 3},
        ]);

        let violations = validate_report(&report);
        assert_eq!(
            codes(&violations),
            vec![
                ViolationCode::DuplicateSourceId,
                ViolationCode::DuplicateLocalId,
                ViolationCode::MissingId,
            ]
        );
    }

    // Test 7: Aggregated error
    #[test]
    fn test_assert_no_violations_aggregates() {
        let mut report = valid_report();
        report.as_object_mut().unwrap().remove("mode");
        report["stats"]["members"] = stats(5, 1, 1, 1, 0);

        let err = assert_no_violations(&validate_report(&report)).unwrap_err();
        assert_eq!(err.count, 2);
        assert_eq!(err.summary, "MISSING_FIELD at mode; COUNT_MISMATCH at stats.members");
    }

    // Test 8: Counts whose sum does not fit in a u64
    #[test]
    fn test_count_overflow_is_a_mismatch() {
        let mut report = valid_report();
        report["stats"]["members"] = json!({
            "parsed": u64::MAX,
            "created": u64::MAX,
            "updated": u64::MAX,
            "skipped": 0,
            "errors": 0,
            "records": [],
        });

        let violations = validate_report(&report);
        assert_eq!(codes(&violations), vec![ViolationCode::CountMismatch]);
        assert_eq!(violations[0].path, "stats.members");
        assert_eq!(violations[0].details["created"], u64::MAX);
    }
}
