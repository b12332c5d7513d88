//! Local store for membership-sync
//!
//! This module defines the store trait the sync engine writes through and its
//! SQLite implementation.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteDatabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbError;
use crate::models::{
    AuditEntry, EntityType, Event, EventInput, IdMapping, Member, MemberInput,
    OrphanRegistration, Registration, RegistrationInput, StoreCounts, SyncState,
};

/// Local relational store
///
/// This trait defines every store operation the sync engine needs.
/// It uses `async_trait` for async methods and `mockall::automock` for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocalStore: Send + Sync {
    // =========================================================================
    // Health and schema
    // =========================================================================

    /// Round-trip a trivial query
    async fn ping(&self) -> Result<(), DbError>;

    /// Check whether a table exists
    async fn table_exists(&self, table: &str) -> Result<bool, DbError>;

    /// List the member status codes known to the store
    async fn list_status_codes(&self) -> Result<Vec<String>, DbError>;

    // =========================================================================
    // Members
    // =========================================================================

    /// Get a member by local id
    async fn find_member(&self, id: i64) -> Result<Option<Member>, DbError>;

    /// Get a member by normalized email
    async fn find_member_by_email(&self, email: &str) -> Result<Option<Member>, DbError>;

    /// Insert a member, returning its id
    async fn create_member(&self, input: &MemberInput) -> Result<i64, DbError>;

    /// Overwrite the mutable fields of a member
    async fn update_member(&self, id: i64, input: &MemberInput) -> Result<(), DbError>;

    // =========================================================================
    // Events
    // =========================================================================

    /// Get an event by local id
    async fn find_event(&self, id: i64) -> Result<Option<Event>, DbError>;

    /// Insert an event, returning its id
    async fn create_event(&self, input: &EventInput) -> Result<i64, DbError>;

    /// Overwrite the mutable fields of an event
    async fn update_event(&self, id: i64, input: &EventInput) -> Result<(), DbError>;

    // =========================================================================
    // Registrations
    // =========================================================================

    /// Get a registration by its (event, member) key
    async fn find_registration(
        &self,
        event_id: i64,
        member_id: i64,
    ) -> Result<Option<Registration>, DbError>;

    /// Insert a registration, returning its id
    async fn create_registration(&self, input: &RegistrationInput) -> Result<i64, DbError>;

    /// Update the status, type and waitlist position of a registration
    async fn update_registration(
        &self,
        id: i64,
        input: &RegistrationInput,
    ) -> Result<(), DbError>;

    // =========================================================================
    // Id mappings
    // =========================================================================

    /// Get the mapping of a source record
    async fn get_mapping(
        &self,
        entity_type: EntityType,
        source_id: i64,
    ) -> Result<Option<IdMapping>, DbError>;

    /// Get the mapping pointing at a local entity
    async fn find_mapping_by_local_id(
        &self,
        entity_type: EntityType,
        local_id: i64,
    ) -> Result<Option<IdMapping>, DbError>;

    /// Insert a new mapping
    async fn insert_mapping(&self, mapping: &IdMapping) -> Result<(), DbError>;

    /// Point an existing mapping at another local entity
    async fn repoint_mapping(
        &self,
        entity_type: EntityType,
        source_id: i64,
        local_id: i64,
        synced_at: DateTime<Utc>,
    ) -> Result<(), DbError>;

    /// Mark a mapping as confirmed by a sync
    async fn touch_mapping(
        &self,
        entity_type: EntityType,
        source_id: i64,
        synced_at: DateTime<Utc>,
    ) -> Result<(), DbError>;

    /// Delete a mapping row; the local entity is left untouched
    ///
    /// Returns whether a row was deleted.
    async fn delete_mapping(&self, entity_type: EntityType, source_id: i64)
        -> Result<bool, DbError>;

    /// List the mappings of one entity type
    async fn list_mappings(&self, entity_type: EntityType) -> Result<Vec<IdMapping>, DbError>;

    /// Mappings not confirmed since `before`, optionally of one entity type
    async fn find_stale_mappings(
        &self,
        entity_type: Option<EntityType>,
        before: DateTime<Utc>,
    ) -> Result<Vec<IdMapping>, DbError>;

    /// Mappings whose local entity no longer exists
    async fn find_dangling_mappings(&self) -> Result<Vec<IdMapping>, DbError>;

    // =========================================================================
    // Sync state and audit
    // =========================================================================

    /// Get the sync state of an organization
    async fn get_sync_state(&self, organization_id: &str) -> Result<Option<SyncState>, DbError>;

    /// Insert or replace the sync state of an organization
    async fn save_sync_state(&self, state: &SyncState) -> Result<(), DbError>;

    /// Append an audit entry
    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), DbError>;

    /// List the audit entries of a run, oldest first
    async fn list_audit(&self, run_id: &str) -> Result<Vec<AuditEntry>, DbError>;

    // =========================================================================
    // Integrity
    // =========================================================================

    /// Row counts of entity and mapping tables
    async fn counts(&self) -> Result<StoreCounts, DbError>;

    /// Registrations referencing a missing member or event
    async fn find_orphan_registrations(&self) -> Result<Vec<OrphanRegistration>, DbError>;
}
