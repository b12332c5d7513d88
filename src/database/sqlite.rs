//! SQLite implementation of the LocalStore trait
//!
//! This module provides a SQLite-based implementation of the LocalStore trait
//! using rusqlite and tokio-rusqlite for async operations.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row};
use std::str::FromStr;
use tokio_rusqlite::Connection;

use super::migrations::{CREATE_SCHEMA, SEED_MEMBER_STATUSES};
use super::LocalStore;
use crate::error::DbError;
use crate::models::{
    AuditEntry, EntityType, Event, EventInput, IdMapping, Member, MemberInput,
    OrphanRegistration, Registration, RegistrationInput, StoreCounts, SyncState,
    WaitlistPosition,
};

const MEMBER_COLUMNS: &str = "id, email, first_name, last_name, phone, status_code, \
     membership_level, join_date, renewal_due, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, title, description, category, location, start_at, end_at, \
     capacity, chair_member_id, registration_enabled";

const REGISTRATION_COLUMNS: &str =
    "id, event_id, member_id, status, registration_type, registered_at, waitlist_position";

const MAPPING_COLUMNS: &str = "entity_type, source_id, local_id, synced_at";

/// SQLite local store
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Open (or create) a SQLite database and apply the schema
    ///
    /// Use `:memory:` for in-memory database or a file path for persistent storage.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(path).await?;

        // Run migrations
        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            conn.execute_batch(SEED_MEMBER_STATUSES)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create a new in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::new(":memory:").await
    }
}

/// Format a timestamp for storage
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn parse_column<T: FromStr<Err = String>>(row: &Row<'_>, column: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e| conversion_error(column, e))
}

fn timestamp_column(row: &Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, format!("{}: {}", raw, e)))
}

fn optional_timestamp_column(
    row: &Row<'_>,
    column: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(column)? {
        Some(_) => timestamp_column(row, column).map(Some),
        None => Ok(None),
    }
}

fn date_column(row: &Row<'_>, column: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(column)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| conversion_error(column, format!("{}: {}", raw, e)))
}

fn optional_date_column(row: &Row<'_>, column: usize) -> rusqlite::Result<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(column)? {
        Some(_) => date_column(row, column).map(Some),
        None => Ok(None),
    }
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone: row.get(4)?,
        status: parse_column(row, 5)?,
        membership_level: row.get(6)?,
        join_date: date_column(row, 7)?,
        renewal_due: optional_date_column(row, 8)?,
        created_at: optional_timestamp_column(row, 9)?,
        updated_at: optional_timestamp_column(row, 10)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: parse_column(row, 3)?,
        location: row.get(4)?,
        start_at: timestamp_column(row, 5)?,
        end_at: optional_timestamp_column(row, 6)?,
        capacity: row.get(7)?,
        chair_member_id: row.get(8)?,
        registration_enabled: row.get::<_, i64>(9)? != 0,
    })
}

fn registration_from_row(row: &Row<'_>) -> rusqlite::Result<Registration> {
    Ok(Registration {
        id: row.get(0)?,
        event_id: row.get(1)?,
        member_id: row.get(2)?,
        status: parse_column(row, 3)?,
        registration_type: row.get(4)?,
        registered_at: timestamp_column(row, 5)?,
        waitlist_position: row
            .get::<_, Option<i64>>(6)?
            .map(WaitlistPosition::from_stored),
    })
}

fn mapping_from_row(row: &Row<'_>) -> rusqlite::Result<IdMapping> {
    Ok(IdMapping {
        entity_type: parse_column(row, 0)?,
        source_id: row.get(1)?,
        local_id: row.get(2)?,
        synced_at: timestamp_column(row, 3)?,
    })
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let details: String = row.get(6)?;
    Ok(AuditEntry {
        run_id: row.get(0)?,
        mode: row.get(1)?,
        action: parse_column(row, 2)?,
        entity_type: parse_column(row, 3)?,
        local_id: row.get(4)?,
        source_id: row.get(5)?,
        details: serde_json::from_str(&details).map_err(|e| conversion_error(6, e.to_string()))?,
        created_at: timestamp_column(row, 7)?,
    })
}

#[async_trait]
impl LocalStore for SqliteDatabase {
    // =========================================================================
    // Health and schema
    // =========================================================================

    async fn ping(&self) -> Result<(), DbError> {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn table_exists(&self, table: &str) -> Result<bool, DbError> {
        let table = table.to_string();

        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [&table],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Into::into)
    }

    async fn list_status_codes(&self) -> Result<Vec<String>, DbError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT code FROM member_statuses ORDER BY code")?;
                let codes = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(codes)
            })
            .await
            .map_err(Into::into)
    }

    // =========================================================================
    // Members
    // =========================================================================

    async fn find_member(&self, id: i64) -> Result<Option<Member>, DbError> {
        self.conn
            .call(move |conn| {
                let member = conn
                    .query_row(
                        &format!("SELECT {} FROM members WHERE id = ?1", MEMBER_COLUMNS),
                        [id],
                        member_from_row,
                    )
                    .optional()?;
                Ok(member)
            })
            .await
            .map_err(Into::into)
    }

    async fn find_member_by_email(&self, email: &str) -> Result<Option<Member>, DbError> {
        let email = email.to_string();

        self.conn
            .call(move |conn| {
                let member = conn
                    .query_row(
                        &format!("SELECT {} FROM members WHERE email = ?1", MEMBER_COLUMNS),
                        [&email],
                        member_from_row,
                    )
                    .optional()?;
                Ok(member)
            })
            .await
            .map_err(Into::into)
    }

    async fn create_member(&self, input: &MemberInput) -> Result<i64, DbError> {
        let input = input.clone();
        let now = format_timestamp(Utc::now());

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO members
                    (email, first_name, last_name, phone, status_code, membership_level,
                     join_date, renewal_due, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                    "#,
                    rusqlite::params![
                        input.email,
                        input.first_name,
                        input.last_name,
                        input.phone,
                        input.status.code(),
                        input.membership_level,
                        format_date(input.join_date),
                        input.renewal_due.map(format_date),
                        now
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Into::into)
    }

    async fn update_member(&self, id: i64, input: &MemberInput) -> Result<(), DbError> {
        let input = input.clone();
        let now = format_timestamp(Utc::now());

        let rows_affected = self
            .conn
            .call(move |conn| {
                let count = conn.execute(
                    r#"
                    UPDATE members
                    SET email = ?1, first_name = ?2, last_name = ?3, phone = ?4,
                        status_code = ?5, membership_level = ?6, renewal_due = ?7,
                        updated_at = ?8,
                        join_date = CASE WHEN ?10 THEN ?11 ELSE join_date END
                    WHERE id = ?9
                    "#,
                    rusqlite::params![
                        input.email,
                        input.first_name,
                        input.last_name,
                        input.phone,
                        input.status.code(),
                        input.membership_level,
                        input.renewal_due.map(format_date),
                        now,
                        id,
                        input.join_date_from_source,
                        format_date(input.join_date)
                    ],
                )?;
                Ok(count)
            })
            .await?;

        if rows_affected == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    // =========================================================================
    // Events
    // =========================================================================

    async fn find_event(&self, id: i64) -> Result<Option<Event>, DbError> {
        self.conn
            .call(move |conn| {
                let event = conn
                    .query_row(
                        &format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS),
                        [id],
                        event_from_row,
                    )
                    .optional()?;
                Ok(event)
            })
            .await
            .map_err(Into::into)
    }

    async fn create_event(&self, input: &EventInput) -> Result<i64, DbError> {
        let input = input.clone();
        let now = format_timestamp(Utc::now());

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO events
                    (title, description, category, location, start_at, end_at, capacity,
                     chair_member_id, registration_enabled, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                    "#,
                    rusqlite::params![
                        input.title,
                        input.description,
                        input.category.code(),
                        input.location,
                        format_timestamp(input.start_at),
                        input.end_at.map(format_timestamp),
                        input.capacity,
                        input.chair_member_id,
                        input.registration_enabled as i64,
                        now
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Into::into)
    }

    async fn update_event(&self, id: i64, input: &EventInput) -> Result<(), DbError> {
        let input = input.clone();
        let now = format_timestamp(Utc::now());

        let rows_affected = self
            .conn
            .call(move |conn| {
                let count = conn.execute(
                    r#"
                    UPDATE events
                    SET title = ?1, description = ?2, category = ?3, location = ?4,
                        start_at = ?5, end_at = ?6, capacity = ?7, chair_member_id = ?8,
                        registration_enabled = ?9, updated_at = ?10
                    WHERE id = ?11
                    "#,
                    rusqlite::params![
                        input.title,
                        input.description,
                        input.category.code(),
                        input.location,
                        format_timestamp(input.start_at),
                        input.end_at.map(format_timestamp),
                        input.capacity,
                        input.chair_member_id,
                        input.registration_enabled as i64,
                        now,
                        id
                    ],
                )?;
                Ok(count)
            })
            .await?;

        if rows_affected == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    // =========================================================================
    // Registrations
    // =========================================================================

    async fn find_registration(
        &self,
        event_id: i64,
        member_id: i64,
    ) -> Result<Option<Registration>, DbError> {
        self.conn
            .call(move |conn| {
                let registration = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM registrations WHERE event_id = ?1 AND member_id = ?2",
                            REGISTRATION_COLUMNS
                        ),
                        [event_id, member_id],
                        registration_from_row,
                    )
                    .optional()?;
                Ok(registration)
            })
            .await
            .map_err(Into::into)
    }

    async fn create_registration(&self, input: &RegistrationInput) -> Result<i64, DbError> {
        let input = input.clone();
        let now = format_timestamp(Utc::now());

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO registrations
                    (event_id, member_id, status, registration_type, registered_at,
                     waitlist_position, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                    "#,
                    rusqlite::params![
                        input.event_id,
                        input.member_id,
                        input.status.code(),
                        input.registration_type,
                        format_timestamp(input.registered_at),
                        input.waitlist_position.map(WaitlistPosition::to_stored),
                        now
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Into::into)
    }

    async fn update_registration(
        &self,
        id: i64,
        input: &RegistrationInput,
    ) -> Result<(), DbError> {
        let input = input.clone();
        let now = format_timestamp(Utc::now());

        let rows_affected = self
            .conn
            .call(move |conn| {
                let count = conn.execute(
                    r#"
                    UPDATE registrations
                    SET status = ?1, registration_type = ?2, waitlist_position = ?3,
                        updated_at = ?4
                    WHERE id = ?5
                    "#,
                    rusqlite::params![
                        input.status.code(),
                        input.registration_type,
                        input.waitlist_position.map(WaitlistPosition::to_stored),
                        now,
                        id
                    ],
                )?;
                Ok(count)
            })
            .await?;

        if rows_affected == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    // =========================================================================
    // Id mappings
    // =========================================================================

    async fn get_mapping(
        &self,
        entity_type: EntityType,
        source_id: i64,
    ) -> Result<Option<IdMapping>, DbError> {
        self.conn
            .call(move |conn| {
                let mapping = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM id_mappings WHERE entity_type = ?1 AND source_id = ?2",
                            MAPPING_COLUMNS
                        ),
                        rusqlite::params![entity_type.as_str(), source_id],
                        mapping_from_row,
                    )
                    .optional()?;
                Ok(mapping)
            })
            .await
            .map_err(Into::into)
    }

    async fn find_mapping_by_local_id(
        &self,
        entity_type: EntityType,
        local_id: i64,
    ) -> Result<Option<IdMapping>, DbError> {
        self.conn
            .call(move |conn| {
                let mapping = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM id_mappings WHERE entity_type = ?1 AND local_id = ?2",
                            MAPPING_COLUMNS
                        ),
                        rusqlite::params![entity_type.as_str(), local_id],
                        mapping_from_row,
                    )
                    .optional()?;
                Ok(mapping)
            })
            .await
            .map_err(Into::into)
    }

    async fn insert_mapping(&self, mapping: &IdMapping) -> Result<(), DbError> {
        let mapping = mapping.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO id_mappings (entity_type, source_id, local_id, synced_at)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                    rusqlite::params![
                        mapping.entity_type.as_str(),
                        mapping.source_id,
                        mapping.local_id,
                        format_timestamp(mapping.synced_at)
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn repoint_mapping(
        &self,
        entity_type: EntityType,
        source_id: i64,
        local_id: i64,
        synced_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let rows_affected = self
            .conn
            .call(move |conn| {
                let count = conn.execute(
                    r#"
                    UPDATE id_mappings SET local_id = ?1, synced_at = ?2
                    WHERE entity_type = ?3 AND source_id = ?4
                    "#,
                    rusqlite::params![
                        local_id,
                        format_timestamp(synced_at),
                        entity_type.as_str(),
                        source_id
                    ],
                )?;
                Ok(count)
            })
            .await?;

        if rows_affected == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    async fn touch_mapping(
        &self,
        entity_type: EntityType,
        source_id: i64,
        synced_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let rows_affected = self
            .conn
            .call(move |conn| {
                let count = conn.execute(
                    "UPDATE id_mappings SET synced_at = ?1 WHERE entity_type = ?2 AND source_id = ?3",
                    rusqlite::params![format_timestamp(synced_at), entity_type.as_str(), source_id],
                )?;
                Ok(count)
            })
            .await?;

        if rows_affected == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    async fn delete_mapping(
        &self,
        entity_type: EntityType,
        source_id: i64,
    ) -> Result<bool, DbError> {
        self.conn
            .call(move |conn| {
                let count = conn.execute(
                    "DELETE FROM id_mappings WHERE entity_type = ?1 AND source_id = ?2",
                    rusqlite::params![entity_type.as_str(), source_id],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Into::into)
    }

    async fn list_mappings(&self, entity_type: EntityType) -> Result<Vec<IdMapping>, DbError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM id_mappings WHERE entity_type = ?1 ORDER BY source_id",
                    MAPPING_COLUMNS
                ))?;
                let mappings = stmt
                    .query_map([entity_type.as_str()], mapping_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(mappings)
            })
            .await
            .map_err(Into::into)
    }

    async fn find_stale_mappings(
        &self,
        entity_type: Option<EntityType>,
        before: DateTime<Utc>,
    ) -> Result<Vec<IdMapping>, DbError> {
        let entity = entity_type.map(|e| e.as_str().to_string());
        let before = format_timestamp(before);

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"
                    SELECT {} FROM id_mappings
                    WHERE synced_at < ?1 AND (?2 IS NULL OR entity_type = ?2)
                    ORDER BY entity_type, source_id
                    "#,
                    MAPPING_COLUMNS
                ))?;
                let mappings = stmt
                    .query_map(rusqlite::params![before, entity], mapping_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(mappings)
            })
            .await
            .map_err(Into::into)
    }

    async fn find_dangling_mappings(&self) -> Result<Vec<IdMapping>, DbError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"
                    SELECT {} FROM id_mappings m
                    WHERE (m.entity_type = 'member'
                           AND NOT EXISTS (SELECT 1 FROM members WHERE id = m.local_id))
                       OR (m.entity_type = 'event'
                           AND NOT EXISTS (SELECT 1 FROM events WHERE id = m.local_id))
                       OR (m.entity_type = 'registration'
                           AND NOT EXISTS (SELECT 1 FROM registrations WHERE id = m.local_id))
                    ORDER BY m.entity_type, m.source_id
                    "#,
                    MAPPING_COLUMNS
                ))?;
                let mappings = stmt
                    .query_map([], mapping_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(mappings)
            })
            .await
            .map_err(Into::into)
    }

    // =========================================================================
    // Sync state and audit
    // =========================================================================

    async fn get_sync_state(&self, organization_id: &str) -> Result<Option<SyncState>, DbError> {
        let organization_id = organization_id.to_string();

        self.conn
            .call(move |conn| {
                let state = conn
                    .query_row(
                        r#"
                        SELECT organization_id, last_full_sync, last_incremental_sync,
                               last_contact_sync, last_event_sync, last_registration_sync
                        FROM sync_state
                        WHERE organization_id = ?1
                        "#,
                        [&organization_id],
                        |row| {
                            Ok(SyncState {
                                organization_id: row.get(0)?,
                                last_full_sync: optional_timestamp_column(row, 1)?,
                                last_incremental_sync: optional_timestamp_column(row, 2)?,
                                last_contact_sync: optional_timestamp_column(row, 3)?,
                                last_event_sync: optional_timestamp_column(row, 4)?,
                                last_registration_sync: optional_timestamp_column(row, 5)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(state)
            })
            .await
            .map_err(Into::into)
    }

    async fn save_sync_state(&self, state: &SyncState) -> Result<(), DbError> {
        let state = state.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO sync_state
                    (organization_id, last_full_sync, last_incremental_sync,
                     last_contact_sync, last_event_sync, last_registration_sync)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    rusqlite::params![
                        state.organization_id,
                        state.last_full_sync.map(format_timestamp),
                        state.last_incremental_sync.map(format_timestamp),
                        state.last_contact_sync.map(format_timestamp),
                        state.last_event_sync.map(format_timestamp),
                        state.last_registration_sync.map(format_timestamp)
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), DbError> {
        let entry = entry.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO audit_log
                    (run_id, mode, action, entity_type, local_id, source_id, details, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                    rusqlite::params![
                        entry.run_id,
                        entry.mode,
                        entry.action.as_str(),
                        entry.entity_type.as_str(),
                        entry.local_id,
                        entry.source_id,
                        entry.details.to_string(),
                        format_timestamp(entry.created_at)
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn list_audit(&self, run_id: &str) -> Result<Vec<AuditEntry>, DbError> {
        let run_id = run_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT run_id, mode, action, entity_type, local_id, source_id, details, created_at
                    FROM audit_log
                    WHERE run_id = ?1
                    ORDER BY id
                    "#,
                )?;
                let entries = stmt
                    .query_map([&run_id], audit_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await
            .map_err(Into::into)
    }

    // =========================================================================
    // Integrity
    // =========================================================================

    async fn counts(&self) -> Result<StoreCounts, DbError> {
        self.conn
            .call(|conn| {
                let counts = conn.query_row(
                    r#"
                    SELECT
                        (SELECT COUNT(*) FROM members),
                        (SELECT COUNT(*) FROM events),
                        (SELECT COUNT(*) FROM registrations),
                        (SELECT COUNT(*) FROM id_mappings WHERE entity_type = 'member'),
                        (SELECT COUNT(*) FROM id_mappings WHERE entity_type = 'event'),
                        (SELECT COUNT(*) FROM id_mappings WHERE entity_type = 'registration')
                    "#,
                    [],
                    |row| {
                        Ok(StoreCounts {
                            members: row.get::<_, i64>(0)? as u64,
                            events: row.get::<_, i64>(1)? as u64,
                            registrations: row.get::<_, i64>(2)? as u64,
                            member_mappings: row.get::<_, i64>(3)? as u64,
                            event_mappings: row.get::<_, i64>(4)? as u64,
                            registration_mappings: row.get::<_, i64>(5)? as u64,
                        })
                    },
                )?;
                Ok(counts)
            })
            .await
            .map_err(Into::into)
    }

    async fn find_orphan_registrations(&self) -> Result<Vec<OrphanRegistration>, DbError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT r.id, r.event_id, r.member_id, e.id IS NULL, m.id IS NULL
                    FROM registrations r
                    LEFT JOIN events e ON e.id = r.event_id
                    LEFT JOIN members m ON m.id = r.member_id
                    WHERE e.id IS NULL OR m.id IS NULL
                    ORDER BY r.id
                    "#,
                )?;
                let orphans = stmt
                    .query_map([], |row| {
                        Ok(OrphanRegistration {
                            registration_id: row.get(0)?,
                            event_id: row.get(1)?,
                            member_id: row.get(2)?,
                            missing_event: row.get::<_, i64>(3)? != 0,
                            missing_member: row.get::<_, i64>(4)? != 0,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(orphans)
            })
            .await
            .map_err(Into::into)
    }
}
