//! Post-hoc integrity check of the local store against a run report

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::{info, warn};

use super::invariants::{InvariantViolation, ViolationCode};
use super::SyncReport;
use crate::database::LocalStore;
use crate::error::DbError;
use crate::models::{EntityType, StoreCounts};

/// Result of a store verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    /// Store row counts at verification time
    pub counts: StoreCounts,
    /// Everything found wrong
    pub violations: Vec<InvariantViolation>,
}

impl VerifyReport {
    /// True when nothing was found
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check referential integrity and mapping uniqueness of the store
///
/// When a live report is given, mapping counts must also cover what the run
/// claims to have created.
pub async fn verify_store(
    store: &dyn LocalStore,
    report: Option<&SyncReport>,
) -> Result<VerifyReport, DbError> {
    let mut violations = Vec::new();

    for orphan in store.find_orphan_registrations().await? {
        violations.push(InvariantViolation::new(
            ViolationCode::OrphanRegistration,
            format!("registrations[{}]", orphan.registration_id),
            format!(
                "Registration {} references a missing {}",
                orphan.registration_id,
                match (orphan.missing_event, orphan.missing_member) {
                    (true, true) => "event and member",
                    (true, false) => "event",
                    _ => "member",
                }
            ),
            json!(orphan),
        ));
    }

    for mapping in store.find_dangling_mappings().await? {
        violations.push(InvariantViolation::new(
            ViolationCode::DanglingMapping,
            format!("id_mappings.{}[{}]", mapping.entity_type, mapping.source_id),
            format!(
                "{} mapping {} -> {} points at a missing row",
                mapping.entity_type, mapping.source_id, mapping.local_id
            ),
            json!(mapping),
        ));
    }

    for entity_type in EntityType::ALL {
        let mut owners: HashMap<i64, i64> = HashMap::new();
        for mapping in store.list_mappings(entity_type).await? {
            if let Some(first) = owners.insert(mapping.local_id, mapping.source_id) {
                violations.push(InvariantViolation::new(
                    ViolationCode::DuplicateLocalId,
                    format!("id_mappings.{}", entity_type),
                    format!(
                        "Local {} {} is mapped from sources {} and {}",
                        entity_type, mapping.local_id, first, mapping.source_id
                    ),
                    json!({ "localId": mapping.local_id, "sourceIds": [first, mapping.source_id] }),
                ));
            }
        }
    }

    let counts = store.counts().await?;

    if let Some(report) = report.filter(|r| !r.dry_run) {
        for (category, mapped, created) in [
            ("members", counts.member_mappings, report.stats.members.created),
            ("events", counts.event_mappings, report.stats.events.created),
            (
                "registrations",
                counts.registration_mappings,
                report.stats.registrations.created,
            ),
        ] {
            if mapped < created {
                violations.push(InvariantViolation::new(
                    ViolationCode::CountMismatch,
                    format!("stats.{}.created", category),
                    format!(
                        "Report claims {} {} created but the store holds {} mappings",
                        created, category, mapped
                    ),
                    json!({ "created": created, "mapped": mapped }),
                ));
            }
        }
    }

    if violations.is_empty() {
        info!(
            members = counts.members,
            events = counts.events,
            registrations = counts.registrations,
            "Store verification passed"
        );
    } else {
        warn!(violations = violations.len(), "Store verification found problems");
    }

    Ok(VerifyReport { counts, violations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqliteDatabase;
    use crate::models::{IdMapping, RegistrationInput, RegistrationStatus, SyncMode};
    use crate::sync::context::RunContext;
    use chrono::Utc;

    #[tokio::test]
    async fn test_clean_store() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let result = verify_store(&db, None).await.unwrap();
        assert!(result.is_clean());
    }

    #[tokio::test]
    async fn test_orphans_and_dangling_mappings() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.create_registration(&RegistrationInput {
            event_id: 8,
            member_id: 9,
            status: RegistrationStatus::Registered,
            registration_type: None,
            registered_at: Utc::now(),
            waitlist_position: None,
        })
        .await
        .unwrap();
        db.insert_mapping(&IdMapping {
            entity_type: EntityType::Member,
            source_id: 1,
            local_id: 77,
            synced_at: Utc::now(),
        })
        .await
        .unwrap();

        let result = verify_store(&db, None).await.unwrap();
        let codes: Vec<_> = result.violations.iter().map(|v| v.code).collect();
        assert_eq!(
            codes,
            vec![ViolationCode::OrphanRegistration, ViolationCode::DanglingMapping]
        );
        assert!(result.violations[0].message.contains("event and member"));
    }

    #[tokio::test]
    async fn test_report_claims_more_than_store_holds() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let mut ctx = RunContext::new(SyncMode::Full, false, Utc::now());
        ctx.members.parsed = 2;
        ctx.members.created = 2;
        let report = SyncReport::from_context(&ctx, Utc::now(), 10);

        let result = verify_store(&db, Some(&report)).await.unwrap();
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].code, ViolationCode::CountMismatch);
        assert_eq!(result.violations[0].path, "stats.members.created");

        let mut dry = report.clone();
        dry.dry_run = true;
        assert!(verify_store(&db, Some(&dry)).await.unwrap().is_clean());
    }
}
