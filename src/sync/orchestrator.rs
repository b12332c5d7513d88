//! Full and incremental sync runs
//!
//! A run fetches contacts, then events, then the registrations of every mapped
//! event, reconciling each record as it goes. Record-level failures are
//! collected in the run context; only a failure to fetch contacts or events at
//! all ends the run early.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::context::RunContext;
use super::diagnostics::{
    run_warnings, RecordAction, RecordSummary, SkipReason, SyncWarning, WarningCode,
    WarningThresholds,
};
use super::preflight::run_preflight;
use super::reconcile::{reconcile_event, reconcile_member, reconcile_registration, resolve_local_id};
use crate::client::MemberSource;
use crate::config::SyncConfig;
use crate::database::LocalStore;
use crate::error::{DbError, SyncError};
use crate::models::{ApiContact, ApiEvent, ApiRegistration, EntityType, SyncMode, SyncState};
use crate::report::SyncReport;
use crate::transform::{
    transform_contact, transform_event, transform_registration, ContactContext, ContactFieldMap,
};

/// Drives sync runs from a source into a local store
pub struct SyncOrchestrator {
    source: Arc<dyn MemberSource>,
    store: Arc<dyn LocalStore>,
    config: SyncConfig,
}

impl SyncOrchestrator {
    /// Create an orchestrator
    pub fn new(source: Arc<dyn MemberSource>, store: Arc<dyn LocalStore>, config: SyncConfig) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// Run preflight, then the sync; a failed preflight aborts before any fetch
    pub async fn run_checked(&self, mode: SyncMode, dry_run: bool) -> Result<SyncReport, SyncError> {
        run_preflight(self.source.as_ref(), self.store.as_ref())
            .await
            .into_result()?;
        Ok(self.run(mode, dry_run).await)
    }

    /// Execute one run and build its report
    pub async fn run(&self, mode: SyncMode, dry_run: bool) -> SyncReport {
        let started_at = Utc::now();
        let mut ctx = RunContext::new(mode, dry_run, started_at)
            .with_limits(self.config.max_report_warnings, self.config.max_report_records);

        info!(
            run_id = %ctx.run_id,
            mode = %mode,
            dry_run,
            organization_id = %self.config.organization_id,
            "Starting sync run"
        );

        self.execute(&mut ctx).await;

        if !ctx.fatal {
            let thresholds = WarningThresholds {
                min_contacts: self.config.min_expected_contacts,
                min_events: self.config.min_expected_events,
            };
            for warning in run_warnings(mode, &ctx.fetched, &ctx.registration_diagnostics, &thresholds)
            {
                warn!(code = ?warning.code, message = %warning.message, "Sync warning");
                ctx.add_run_warning(warning);
            }

            if !dry_run {
                if let Err(e) = self.save_sync_state(&ctx).await {
                    error!(error = %e, "Failed to save sync state");
                    ctx.fail(e.code(), format!("Cannot save sync state: {}", e));
                }
            }
        }

        let finished_at = Utc::now();
        let report = SyncReport::from_context(&ctx, finished_at, self.config.max_report_errors);

        info!(
            run_id = %report.run_id,
            success = report.success,
            duration_ms = report.duration_ms,
            members_created = report.stats.members.created,
            members_updated = report.stats.members.updated,
            events_created = report.stats.events.created,
            registrations_upserted = report.registration_diagnostics.registrations_upserted,
            errors = report.total_error_count,
            warnings = report.warnings.len(),
            "Sync run finished"
        );

        report
    }

    async fn execute(&self, ctx: &mut RunContext) {
        let now = ctx.started_at;

        let (contacts_since, events_from) = match ctx.mode {
            SyncMode::Full => (None, None),
            SyncMode::Incremental => {
                let state = match self.store.get_sync_state(&self.config.organization_id).await {
                    Ok(state) => state,
                    Err(e) => {
                        ctx.fail(e.code(), format!("Cannot read sync state: {}", e));
                        return;
                    }
                };
                let (Some(default_since), Some(from)) = (
                    window_start(now, self.config.contacts_lookback_days),
                    window_start(now, self.config.events_lookback_days),
                ) else {
                    ctx.fail(
                        "INVALID_CONFIG",
                        format!(
                            "Lookback windows of {} and {} days are out of range",
                            self.config.contacts_lookback_days, self.config.events_lookback_days
                        ),
                    );
                    return;
                };
                let since = state
                    .and_then(|s| s.last_contact_sync)
                    .unwrap_or(default_since);
                info!(contacts_since = %since, events_from = %from, "Incremental windows");
                (Some(since), Some(from))
            }
        };

        let contact_ctx = self.contact_context(ctx, now).await;

        // Contacts
        let contacts = match self.source.fetch_contacts(contacts_since).await {
            Ok(contacts) => contacts,
            Err(e) => {
                error!(error = %e, "Contact fetch failed");
                ctx.fail(e.code(), format!("Cannot fetch contacts: {}", e));
                return;
            }
        };
        ctx.fetched.contacts = contacts.len() as u64;
        info!(count = contacts.len(), "Contacts fetched");

        let batch_size = self.config.batch_size.max(1);
        let total_batches = contacts.len().div_ceil(batch_size);
        for (index, batch) in contacts.chunks(batch_size).enumerate() {
            for contact in batch {
                self.sync_contact(ctx, &contact_ctx, contact, now).await;
            }
            info!(
                batch = index + 1,
                batches = total_batches,
                created = ctx.members.created,
                updated = ctx.members.updated,
                skipped = ctx.members.skipped,
                errors = ctx.members.errors,
                "Contact batch processed"
            );
        }

        // Events
        let events = match self.source.fetch_events(events_from).await {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, "Event fetch failed");
                ctx.fail(e.code(), format!("Cannot fetch events: {}", e));
                return;
            }
        };
        ctx.fetched.events = events.len() as u64;
        info!(count = events.len(), "Events fetched");

        for event in &events {
            self.sync_event(ctx, event, now).await;
        }

        // Registrations
        for event in &events {
            self.sync_event_registrations(ctx, event, now).await;
        }
        info!(
            events_processed = ctx.registration_diagnostics.events_processed,
            events_skipped = ctx.registration_diagnostics.events_skipped_unmapped,
            fetched = ctx.registration_diagnostics.registrations_fetched,
            upserted = ctx.registration_diagnostics.registrations_upserted,
            "Registrations processed"
        );
    }

    /// Field schema and level lookups; failures fall back to defaults
    async fn contact_context(&self, ctx: &mut RunContext, now: DateTime<Utc>) -> ContactContext {
        let mut contact_ctx = ContactContext::new(now);

        match self.source.fetch_contact_fields().await {
            Ok(fields) => contact_ctx.fields = ContactFieldMap::from_schema(&fields),
            Err(e) => {
                warn!(error = %e, "Contact field schema unavailable, using default field names");
                ctx.add_run_warning(SyncWarning::run(
                    WarningCode::LookupUnavailable,
                    format!("Contact field schema unavailable ({}); default field names used", e),
                ));
            }
        }

        match self.source.fetch_membership_levels().await {
            Ok(levels) => {
                contact_ctx.levels = levels
                    .into_iter()
                    .map(|level| (level.id, level.name))
                    .collect::<HashMap<_, _>>();
            }
            Err(e) => {
                warn!(error = %e, "Membership levels unavailable");
                ctx.add_run_warning(SyncWarning::run(
                    WarningCode::LookupUnavailable,
                    format!("Membership levels unavailable ({}); level ids not resolved", e),
                ));
            }
        }

        contact_ctx
    }

    async fn sync_contact(
        &self,
        ctx: &mut RunContext,
        contact_ctx: &ContactContext,
        contact: &ApiContact,
        now: DateTime<Utc>,
    ) {
        let entity_type = EntityType::Member;
        let result = transform_contact(contact, contact_ctx);
        for warning in result.warnings {
            ctx.add_record_warning(SyncWarning::record(
                WarningCode::TransformFallback,
                entity_type,
                contact.id,
                warning,
            ));
        }

        let input = match result.outcome {
            Ok(input) => input,
            Err(e) => {
                debug!(source_id = contact.id, error = %e, "Contact rejected");
                ctx.add_error(e.code(), format!("Contact {}: {}", contact.id, e), Some(entity_type), Some(contact.id));
                ctx.record(
                    entity_type,
                    RecordSummary::not_written(contact.id, RecordAction::Error, SkipReason::TransformFailed, e.to_string()),
                );
                return;
            }
        };

        match reconcile_member(self.store.as_ref(), ctx, contact.id, &input, now).await {
            Ok(summary) => ctx.record(entity_type, summary),
            Err(e) => record_store_error(ctx, entity_type, contact.id, e),
        }
    }

    async fn sync_event(&self, ctx: &mut RunContext, event: &ApiEvent, now: DateTime<Utc>) {
        let entity_type = EntityType::Event;
        let store = self.store.as_ref();

        let organizer = event.details.as_ref().and_then(|d| d.organizer.as_ref());
        let chair_member_id = match organizer {
            Some(organizer) => match resolve_local_id(store, ctx, EntityType::Member, organizer.id).await {
                Ok(id) => id,
                Err(e) => {
                    record_store_error(ctx, entity_type, event.id, e);
                    return;
                }
            },
            None => None,
        };

        let result = transform_event(event, chair_member_id);
        for warning in result.warnings {
            ctx.add_record_warning(SyncWarning::record(
                WarningCode::TransformFallback,
                entity_type,
                event.id,
                warning,
            ));
        }

        let input = match result.outcome {
            Ok(input) => input,
            Err(e) => {
                debug!(source_id = event.id, error = %e, "Event rejected");
                ctx.add_error(e.code(), format!("Event {}: {}", event.id, e), Some(entity_type), Some(event.id));
                ctx.record(
                    entity_type,
                    RecordSummary::not_written(event.id, RecordAction::Error, SkipReason::TransformFailed, e.to_string()),
                );
                return;
            }
        };

        match reconcile_event(store, ctx, event.id, &input, now).await {
            Ok(summary) => ctx.record(entity_type, summary),
            Err(e) => record_store_error(ctx, entity_type, event.id, e),
        }
    }

    async fn sync_event_registrations(&self, ctx: &mut RunContext, event: &ApiEvent, now: DateTime<Utc>) {
        let store = self.store.as_ref();

        let event_local_id = match resolve_local_id(store, ctx, EntityType::Event, event.id).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                let detail = format!("Event {} has no mapping", event.id);
                debug!(source_id = event.id, "Skipping registrations of unmapped event");
                ctx.registration_diagnostics.events_skipped_unmapped += 1;
                ctx.registration_diagnostics
                    .record_skip(SkipReason::MissingEventMapping, &detail);
                return;
            }
            Err(e) => {
                ctx.add_error(e.code(), format!("Event {} mapping lookup: {}", event.id, e), Some(EntityType::Event), Some(event.id));
                return;
            }
        };

        ctx.registration_diagnostics.events_processed += 1;
        ctx.registration_diagnostics.fetch_calls += 1;
        let registrations = match self.source.fetch_registrations(event.id).await {
            Ok(registrations) => registrations,
            Err(e) => {
                warn!(event_id = event.id, error = %e, "Registration fetch failed, continuing");
                ctx.add_error(
                    e.code(),
                    format!("Registrations of event {}: {}", event.id, e),
                    Some(EntityType::Event),
                    Some(event.id),
                );
                return;
            }
        };

        let count = registrations.len() as u64;
        ctx.fetched.registrations += count;
        ctx.registration_diagnostics.registrations_fetched += count;
        debug!(event_id = event.id, count, "Registrations fetched");

        for registration in &registrations {
            self.sync_registration(ctx, event_local_id, registration, now).await;
        }
    }

    async fn sync_registration(
        &self,
        ctx: &mut RunContext,
        event_local_id: i64,
        registration: &ApiRegistration,
        now: DateTime<Utc>,
    ) {
        let entity_type = EntityType::Registration;
        let store = self.store.as_ref();
        let source_id = registration.id;

        let member_local_id = match resolve_local_id(store, ctx, EntityType::Member, registration.contact.id).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                let detail = format!("Contact {} has no member mapping", registration.contact.id);
                ctx.registration_diagnostics.registrations_skipped_missing_member += 1;
                ctx.registration_diagnostics
                    .record_skip(SkipReason::MissingMemberMapping, &detail);
                ctx.record(
                    entity_type,
                    RecordSummary::not_written(source_id, RecordAction::Skipped, SkipReason::MissingMemberMapping, detail),
                );
                return;
            }
            Err(e) => {
                ctx.registration_diagnostics
                    .record_skip(SkipReason::StoreError, &e.to_string());
                record_store_error(ctx, entity_type, source_id, e);
                return;
            }
        };

        let result = transform_registration(registration, event_local_id, member_local_id, now);
        for warning in result.warnings {
            ctx.add_record_warning(SyncWarning::record(
                WarningCode::TransformFallback,
                entity_type,
                source_id,
                warning,
            ));
        }

        let input = match result.outcome {
            Ok(input) => input,
            Err(e) => {
                ctx.registration_diagnostics
                    .record_skip(SkipReason::TransformFailed, &e.to_string());
                ctx.add_error(e.code(), format!("Registration {}: {}", source_id, e), Some(entity_type), Some(source_id));
                ctx.record(
                    entity_type,
                    RecordSummary::not_written(source_id, RecordAction::Error, SkipReason::TransformFailed, e.to_string()),
                );
                return;
            }
        };
        ctx.registration_diagnostics.registrations_transformed += 1;

        match reconcile_registration(store, ctx, source_id, &input, now).await {
            Ok(summary) => {
                match (summary.action, summary.reason) {
                    (RecordAction::Skipped, Some(reason)) => {
                        let detail = summary.detail.clone().unwrap_or_default();
                        ctx.registration_diagnostics.record_skip(reason, &detail);
                    }
                    (RecordAction::Skipped, None) | (RecordAction::Error, _) => {}
                    _ => ctx.registration_diagnostics.registrations_upserted += 1,
                }
                ctx.record(entity_type, summary);
            }
            Err(e) => {
                ctx.registration_diagnostics
                    .record_skip(SkipReason::StoreError, &e.to_string());
                record_store_error(ctx, entity_type, source_id, e);
            }
        }
    }

    async fn save_sync_state(&self, ctx: &RunContext) -> Result<(), DbError> {
        let organization_id = &self.config.organization_id;
        let mut state = self
            .store
            .get_sync_state(organization_id)
            .await?
            .unwrap_or_else(|| SyncState::new(organization_id.as_str()));
        // Windows start where this run started so changes made during it are picked up next time
        state.mark_completed(ctx.mode, ctx.started_at);
        self.store.save_sync_state(&state).await?;
        info!(organization_id = %organization_id, mode = %ctx.mode, "Sync state updated");
        Ok(())
    }
}

fn record_store_error(ctx: &mut RunContext, entity_type: EntityType, source_id: i64, e: DbError) {
    error!(entity_type = %entity_type, source_id, error = %e, "Store write failed");
    ctx.add_error(
        e.code(),
        format!("{} {}: {}", entity_type, source_id, e),
        Some(entity_type),
        Some(source_id),
    );
    ctx.record(
        entity_type,
        RecordSummary::not_written(source_id, RecordAction::Error, SkipReason::StoreError, e.to_string()),
    );
}

/// Start of a window reaching `days` back from `now`, if representable
fn window_start(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    Duration::try_days(i64::from(days)).and_then(|span| now.checked_sub_signed(span))
}
