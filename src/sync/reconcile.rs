//! Idempotent reconciliation of transformed records against the local store
//!
//! Every function resolves the source record's mapping, decides between
//! create, link, update and no-op, performs the writes (unless the run is a
//! dry run) and confirms the mapping in the run context. Store failures are
//! returned to the caller, which records them against the record.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};

use super::context::RunContext;
use super::diagnostics::{RecordAction, RecordSummary, SkipReason, SyncWarning, WarningCode};
use crate::database::LocalStore;
use crate::error::DbError;
use crate::models::{
    AuditAction, AuditEntry, EntityType, EventInput, IdMapping, MemberInput, RegistrationInput,
};

/// Who else holds the mapping of a local entity
enum Claim {
    /// Nobody, or the record itself
    Free,
    /// A source record not confirmed this run; its mapping was released
    Superseded(i64),
    /// A source record already confirmed this run
    Taken(i64),
}

/// Local id of a source record, from this run or from the store
pub async fn resolve_local_id(
    store: &dyn LocalStore,
    ctx: &RunContext,
    entity_type: EntityType,
    source_id: i64,
) -> Result<Option<i64>, DbError> {
    if let Some(local_id) = ctx.confirmed_local(entity_type, source_id) {
        return Ok(Some(local_id));
    }
    Ok(store
        .get_mapping(entity_type, source_id)
        .await?
        .map(|m| m.local_id))
}

#[allow(clippy::too_many_arguments)]
async fn audit(
    store: &dyn LocalStore,
    ctx: &RunContext,
    action: AuditAction,
    entity_type: EntityType,
    local_id: i64,
    source_id: i64,
    details: serde_json::Value,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    if ctx.dry_run {
        return Ok(());
    }
    store
        .append_audit(&AuditEntry {
            run_id: ctx.run_id.clone(),
            mode: ctx.audit_mode().to_string(),
            action,
            entity_type,
            local_id: Some(local_id),
            source_id: Some(source_id),
            details,
            created_at: now,
        })
        .await
}

/// Insert, touch or repoint the mapping and confirm it for the run
async fn write_mapping(
    store: &dyn LocalStore,
    ctx: &mut RunContext,
    entity_type: EntityType,
    source_id: i64,
    local_id: i64,
    prior: Option<i64>,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    if !ctx.dry_run {
        match prior {
            None => {
                store
                    .insert_mapping(&IdMapping {
                        entity_type,
                        source_id,
                        local_id,
                        synced_at: now,
                    })
                    .await?
            }
            Some(previous) if previous == local_id => {
                store.touch_mapping(entity_type, source_id, now).await?
            }
            Some(_) => {
                store
                    .repoint_mapping(entity_type, source_id, local_id, now)
                    .await?
            }
        }
    }
    ctx.confirm(entity_type, source_id, local_id);
    Ok(())
}

/// Make sure `local_id` can be mapped from `source_id`
async fn claim_local(
    store: &dyn LocalStore,
    ctx: &mut RunContext,
    entity_type: EntityType,
    source_id: i64,
    local_id: i64,
    now: DateTime<Utc>,
) -> Result<Claim, DbError> {
    let owner = match ctx.confirmed_source(entity_type, local_id) {
        Some(owner) => Some(owner),
        None if local_id < 0 => None,
        None => store
            .find_mapping_by_local_id(entity_type, local_id)
            .await?
            .map(|m| m.source_id),
    };

    let Some(owner) = owner.filter(|o| *o != source_id) else {
        return Ok(Claim::Free);
    };
    if ctx.is_confirmed(entity_type, owner) {
        return Ok(Claim::Taken(owner));
    }

    if !ctx.dry_run {
        store.delete_mapping(entity_type, owner).await?;
        audit(
            store,
            ctx,
            AuditAction::DeleteMapping,
            entity_type,
            local_id,
            owner,
            json!({ "supersededBy": source_id }),
            now,
        )
        .await?;
    }
    ctx.add_record_warning(SyncWarning::record(
        WarningCode::MappingSuperseded,
        entity_type,
        source_id,
        format!(
            "{} {} was mapped from source {} which was not seen this run; mapping handed over",
            entity_type, local_id, owner
        ),
    ));
    Ok(Claim::Superseded(owner))
}

/// Reconcile one transformed contact
pub async fn reconcile_member(
    store: &dyn LocalStore,
    ctx: &mut RunContext,
    source_id: i64,
    input: &MemberInput,
    now: DateTime<Utc>,
) -> Result<RecordSummary, DbError> {
    let entity_type = EntityType::Member;
    let prior = resolve_local_id(store, ctx, entity_type, source_id).await?;

    if let Some(local_id) = prior {
        if local_id < 0 {
            ctx.confirm(entity_type, source_id, local_id);
            return Ok(RecordSummary::written(source_id, local_id, RecordAction::Unchanged));
        }
        if let Some(existing) = store.find_member(local_id).await? {
            let changed = input.changed_fields(&existing);
            let action = if changed.is_empty() {
                RecordAction::Unchanged
            } else {
                if !ctx.dry_run {
                    store.update_member(local_id, input).await?;
                }
                audit(
                    store,
                    ctx,
                    AuditAction::Update,
                    entity_type,
                    local_id,
                    source_id,
                    json!({ "changedFields": changed }),
                    now,
                )
                .await?;
                RecordAction::Updated
            };
            write_mapping(store, ctx, entity_type, source_id, local_id, prior, now).await?;
            return Ok(summary_with_changes(source_id, local_id, action, &changed));
        }

        warn!(source_id, local_id, "Member mapping points at a missing row, recreating");
        ctx.add_record_warning(SyncWarning::record(
            WarningCode::OrphanedMapping,
            entity_type,
            source_id,
            format!("Mapped member {} no longer exists", local_id),
        ));
    }

    let candidate = match ctx.provisional_member(&input.email) {
        Some(id) => Some((id, None)),
        None => store
            .find_member_by_email(&input.email)
            .await?
            .map(|m| (m.id, Some(m))),
    };

    let Some((local_id, existing)) = candidate else {
        let local_id = if ctx.dry_run {
            let id = ctx.next_provisional_id();
            ctx.remember_provisional_email(&input.email, id);
            id
        } else {
            store.create_member(input).await?
        };
        audit(
            store,
            ctx,
            AuditAction::Create,
            entity_type,
            local_id,
            source_id,
            json!({ "email": input.email, "replacesOrphan": prior }),
            now,
        )
        .await?;
        write_mapping(store, ctx, entity_type, source_id, local_id, prior, now).await?;
        debug!(source_id, local_id, "Member created");
        return Ok(RecordSummary::written(source_id, local_id, RecordAction::Created));
    };

    let previous_owner = match claim_local(store, ctx, entity_type, source_id, local_id, now).await? {
        Claim::Taken(owner) => {
            return Ok(RecordSummary::not_written(
                source_id,
                RecordAction::Skipped,
                SkipReason::DuplicateNaturalKey,
                format!(
                    "Email {} already belongs to member {} mapped from contact {}",
                    input.email, local_id, owner
                ),
            ));
        }
        Claim::Superseded(owner) => Some(owner),
        Claim::Free => None,
    };

    write_mapping(store, ctx, entity_type, source_id, local_id, prior, now).await?;
    audit(
        store,
        ctx,
        AuditAction::Link,
        entity_type,
        local_id,
        source_id,
        json!({ "email": input.email, "previousSourceId": previous_owner }),
        now,
    )
    .await?;
    ctx.add_record_warning(SyncWarning::record(
        WarningCode::NaturalKeyMatch,
        entity_type,
        source_id,
        format!("Linked to existing member {} by email {}", local_id, input.email),
    ));

    let changed = match existing {
        Some(existing) => input.changed_fields(&existing),
        None => Vec::new(),
    };
    if !changed.is_empty() {
        if !ctx.dry_run {
            store.update_member(local_id, input).await?;
        }
        audit(
            store,
            ctx,
            AuditAction::Update,
            entity_type,
            local_id,
            source_id,
            json!({ "changedFields": changed }),
            now,
        )
        .await?;
    }
    debug!(source_id, local_id, "Member linked by email");
    Ok(summary_with_changes(source_id, local_id, RecordAction::Linked, &changed))
}

/// Reconcile one transformed event
pub async fn reconcile_event(
    store: &dyn LocalStore,
    ctx: &mut RunContext,
    source_id: i64,
    input: &EventInput,
    now: DateTime<Utc>,
) -> Result<RecordSummary, DbError> {
    let entity_type = EntityType::Event;
    let prior = resolve_local_id(store, ctx, entity_type, source_id).await?;

    if let Some(local_id) = prior {
        if local_id < 0 {
            ctx.confirm(entity_type, source_id, local_id);
            return Ok(RecordSummary::written(source_id, local_id, RecordAction::Unchanged));
        }
        if let Some(existing) = store.find_event(local_id).await? {
            let changed = input.changed_fields(&existing);
            let action = if changed.is_empty() {
                RecordAction::Unchanged
            } else {
                if !ctx.dry_run {
                    store.update_event(local_id, input).await?;
                }
                audit(
                    store,
                    ctx,
                    AuditAction::Update,
                    entity_type,
                    local_id,
                    source_id,
                    json!({ "changedFields": changed }),
                    now,
                )
                .await?;
                RecordAction::Updated
            };
            write_mapping(store, ctx, entity_type, source_id, local_id, prior, now).await?;
            return Ok(summary_with_changes(source_id, local_id, action, &changed));
        }

        warn!(source_id, local_id, "Event mapping points at a missing row, recreating");
        ctx.add_record_warning(SyncWarning::record(
            WarningCode::OrphanedMapping,
            entity_type,
            source_id,
            format!("Mapped event {} no longer exists", local_id),
        ));
    }

    let local_id = if ctx.dry_run {
        ctx.next_provisional_id()
    } else {
        store.create_event(input).await?
    };
    audit(
        store,
        ctx,
        AuditAction::Create,
        entity_type,
        local_id,
        source_id,
        json!({ "title": input.title, "replacesOrphan": prior }),
        now,
    )
    .await?;
    write_mapping(store, ctx, entity_type, source_id, local_id, prior, now).await?;
    debug!(source_id, local_id, "Event created");
    Ok(RecordSummary::written(source_id, local_id, RecordAction::Created))
}

/// Reconcile one transformed registration by its (event, member) key
pub async fn reconcile_registration(
    store: &dyn LocalStore,
    ctx: &mut RunContext,
    source_id: i64,
    input: &RegistrationInput,
    now: DateTime<Utc>,
) -> Result<RecordSummary, DbError> {
    let entity_type = EntityType::Registration;
    let prior = resolve_local_id(store, ctx, entity_type, source_id).await?;

    let existing = if let Some(id) = ctx.provisional_registration(input.event_id, input.member_id)
    {
        Some((id, None))
    } else if input.event_id < 0 || input.member_id < 0 {
        None
    } else {
        store
            .find_registration(input.event_id, input.member_id)
            .await?
            .map(|r| (r.id, Some(r)))
    };

    let Some((local_id, stored)) = existing else {
        let local_id = if ctx.dry_run {
            let id = ctx.next_provisional_id();
            ctx.remember_provisional_registration(input.event_id, input.member_id, id);
            id
        } else {
            store.create_registration(input).await?
        };
        audit(
            store,
            ctx,
            AuditAction::Create,
            entity_type,
            local_id,
            source_id,
            json!({
                "eventId": input.event_id,
                "memberId": input.member_id,
                "status": input.status.code(),
            }),
            now,
        )
        .await?;
        write_mapping(store, ctx, entity_type, source_id, local_id, prior, now).await?;
        return Ok(RecordSummary::written(source_id, local_id, RecordAction::Created));
    };

    if let Claim::Taken(owner) = claim_local(store, ctx, entity_type, source_id, local_id, now).await? {
        return Ok(RecordSummary::not_written(
            source_id,
            RecordAction::Skipped,
            SkipReason::DuplicateNaturalKey,
            format!(
                "Event {} / member {} already reconciled from registration {}",
                input.event_id, input.member_id, owner
            ),
        ));
    }

    let changed = match stored {
        Some(stored) => input.changed_fields(&stored),
        None => Vec::new(),
    };
    let action = if changed.is_empty() {
        RecordAction::Unchanged
    } else {
        if !ctx.dry_run {
            store.update_registration(local_id, input).await?;
        }
        audit(
            store,
            ctx,
            AuditAction::Update,
            entity_type,
            local_id,
            source_id,
            json!({ "changedFields": changed }),
            now,
        )
        .await?;
        RecordAction::Updated
    };
    write_mapping(store, ctx, entity_type, source_id, local_id, prior, now).await?;
    Ok(summary_with_changes(source_id, local_id, action, &changed))
}

fn summary_with_changes(
    source_id: i64,
    local_id: i64,
    action: RecordAction,
    changed: &[&str],
) -> RecordSummary {
    let summary = RecordSummary::written(source_id, local_id, action);
    if changed.is_empty() {
        summary
    } else {
        summary.with_detail(changed.join(","))
    }
}
