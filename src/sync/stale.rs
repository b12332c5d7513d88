//! Stale mapping detection and cleanup
//!
//! A mapping is stale when no sync has confirmed it for a number of days,
//! which usually means the source record was deleted. Cleanup only removes
//! mapping rows; local entities are never deleted here.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::database::LocalStore;
use crate::error::DbError;
use crate::models::{AuditAction, AuditEntry, EntityType, IdMapping};

/// Audit mode of maintenance operations
pub const MAINTENANCE_MODE: &str = "maintenance";

/// Outcome of a cleanup pass
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleCleanup {
    /// Maintenance run id used in audit entries
    pub run_id: String,
    /// Mappings synced before this time were considered stale
    pub cutoff: DateTime<Utc>,
    /// Nothing was deleted
    pub dry_run: bool,
    /// Stale mappings found
    pub found: usize,
    /// Mapping rows deleted
    pub deleted: usize,
    /// The stale mappings
    pub mappings: Vec<IdMapping>,
}

fn cutoff(days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(i64::from(days))
}

/// Mappings not confirmed within `days`, optionally of one entity type
pub async fn detect_stale(
    store: &dyn LocalStore,
    days: u32,
    entity_type: Option<EntityType>,
    now: DateTime<Utc>,
) -> Result<Vec<IdMapping>, DbError> {
    let before = cutoff(days, now);
    let stale = store.find_stale_mappings(entity_type, before).await?;
    info!(
        days,
        entity_type = entity_type.map(|e| e.as_str()).unwrap_or("all"),
        found = stale.len(),
        "Stale mapping scan complete"
    );
    Ok(stale)
}

/// Delete stale mapping rows, auditing each deletion
///
/// In dry-run mode the stale mappings are only counted.
pub async fn cleanup_stale_mappings(
    store: &dyn LocalStore,
    days: u32,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<StaleCleanup, DbError> {
    let run_id = Uuid::new_v4().to_string();
    let stale = detect_stale(store, days, None, now).await?;

    let mut deleted = 0;
    if !dry_run {
        for mapping in &stale {
            if !store
                .delete_mapping(mapping.entity_type, mapping.source_id)
                .await?
            {
                continue;
            }
            deleted += 1;
            store
                .append_audit(&AuditEntry {
                    run_id: run_id.clone(),
                    mode: MAINTENANCE_MODE.to_string(),
                    action: AuditAction::DeleteMapping,
                    entity_type: mapping.entity_type,
                    local_id: Some(mapping.local_id),
                    source_id: Some(mapping.source_id),
                    details: json!({
                        "reason": "stale",
                        "days": days,
                        "syncedAt": mapping.synced_at,
                    }),
                    created_at: now,
                })
                .await?;
        }
    }

    info!(
        run_id = %run_id,
        found = stale.len(),
        deleted,
        dry_run,
        "Stale mapping cleanup complete"
    );

    Ok(StaleCleanup {
        run_id,
        cutoff: cutoff(days, now),
        dry_run,
        found: stale.len(),
        deleted,
        mappings: stale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqliteDatabase;
    use chrono::TimeZone;

    async fn seeded() -> (SqliteDatabase, DateTime<Utc>) {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();

        for (entity_type, source_id, age_days) in [
            (EntityType::Member, 1, 200),
            (EntityType::Member, 2, 5),
            (EntityType::Event, 3, 120),
        ] {
            db.insert_mapping(&IdMapping {
                entity_type,
                source_id,
                local_id: source_id * 10,
                synced_at: now - Duration::days(age_days),
            })
            .await
            .unwrap();
        }
        (db, now)
    }

    #[tokio::test]
    async fn test_detect_stale_filters_by_age_and_type() {
        let (db, now) = seeded().await;

        let all = detect_stale(&db, 90, None, now).await.unwrap();
        assert_eq!(all.len(), 2);

        let events = detect_stale(&db, 90, Some(EntityType::Event), now)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source_id, 3);

        assert!(detect_stale(&db, 365, None, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_dry_run_only_counts() {
        let (db, now) = seeded().await;

        let result = cleanup_stale_mappings(&db, 90, true, now).await.unwrap();
        assert_eq!(result.found, 2);
        assert_eq!(result.deleted, 0);
        assert_eq!(db.counts().await.unwrap().member_mappings, 2);
        assert!(db.list_audit(&result.run_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_deletes_mappings_and_audits() {
        let (db, now) = seeded().await;

        let result = cleanup_stale_mappings(&db, 90, false, now).await.unwrap();
        assert_eq!(result.deleted, 2);

        let counts = db.counts().await.unwrap();
        assert_eq!(counts.member_mappings, 1);
        assert_eq!(counts.event_mappings, 0);

        let audit = db.list_audit(&result.run_id).await.unwrap();
        assert_eq!(audit.len(), 2);
        assert!(audit.iter().all(|e| e.action == AuditAction::DeleteMapping));
        assert!(audit.iter().all(|e| e.mode == MAINTENANCE_MODE));
    }
}
