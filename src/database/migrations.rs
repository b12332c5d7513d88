//! Database migrations for membership-sync
//!
//! This module contains SQL migrations for the SQLite database schema.
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with millisecond
//! precision so that lexical and chronological order agree.

/// SQL statement to create the database schema
pub const CREATE_SCHEMA: &str = r#"
-- Allowed member status codes
CREATE TABLE IF NOT EXISTS member_statuses (
    code TEXT PRIMARY KEY,
    description TEXT
);

-- Members
CREATE TABLE IF NOT EXISTS members (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    phone TEXT,
    status_code TEXT NOT NULL,
    membership_level TEXT,
    join_date TEXT NOT NULL,
    renewal_due TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_members_status ON members(status_code);

-- Events
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    category TEXT NOT NULL,
    location TEXT,
    start_at TEXT NOT NULL,
    end_at TEXT,
    capacity INTEGER,
    chair_member_id INTEGER,
    registration_enabled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_at);

-- Registrations (integrity with members/events is verified after each run)
CREATE TABLE IF NOT EXISTS registrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL,
    member_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    registration_type TEXT,
    registered_at TEXT NOT NULL,
    waitlist_position INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(event_id, member_id)
);

-- Source id to local id mappings
CREATE TABLE IF NOT EXISTS id_mappings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    source_id INTEGER NOT NULL,
    local_id INTEGER NOT NULL,
    synced_at TEXT NOT NULL,
    UNIQUE(entity_type, source_id),
    UNIQUE(entity_type, local_id)
);

CREATE INDEX IF NOT EXISTS idx_id_mappings_synced ON id_mappings(synced_at);

-- Per-organization sync timestamps
CREATE TABLE IF NOT EXISTS sync_state (
    organization_id TEXT PRIMARY KEY,
    last_full_sync TEXT,
    last_incremental_sync TEXT,
    last_contact_sync TEXT,
    last_event_sync TEXT,
    last_registration_sync TEXT
);

-- Append-only audit log
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    mode TEXT NOT NULL,
    action TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    local_id INTEGER,
    source_id INTEGER,
    details TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_run ON audit_log(run_id);
"#;

/// Seed rows for the required member status codes
pub const SEED_MEMBER_STATUSES: &str = r#"
INSERT OR IGNORE INTO member_statuses (code, description) VALUES
    ('active', 'Current, paid-up member'),
    ('lapsed', 'Membership expired'),
    ('pending', 'Awaiting approval or payment'),
    ('suspended', 'Suspended by an administrator'),
    ('archived', 'Contact without a membership');
"#;

/// Tables the sync engine cannot run without
pub const REQUIRED_TABLES: &[&str] = &[
    "members",
    "events",
    "registrations",
    "id_mappings",
    "sync_state",
    "audit_log",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemberStatus;

    #[test]
    fn test_schema_applies_twice() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_SCHEMA).unwrap();
        conn.execute_batch(CREATE_SCHEMA).unwrap();
        conn.execute_batch(SEED_MEMBER_STATUSES).unwrap();
        conn.execute_batch(SEED_MEMBER_STATUSES).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM member_statuses", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MemberStatus::ALL.len() as i64);
    }

    #[test]
    fn test_required_tables_exist_after_migration() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_SCHEMA).unwrap();

        for table in REQUIRED_TABLES {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_mapping_uniqueness_enforced() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO id_mappings (entity_type, source_id, local_id, synced_at) VALUES ('member', 1, 10, 'x')",
            [],
        )
        .unwrap();

        let same_source = conn.execute(
            "INSERT INTO id_mappings (entity_type, source_id, local_id, synced_at) VALUES ('member', 1, 11, 'x')",
            [],
        );
        let same_local = conn.execute(
            "INSERT INTO id_mappings (entity_type, source_id, local_id, synced_at) VALUES ('member', 2, 10, 'x')",
            [],
        );
        let other_type = conn.execute(
            "INSERT INTO id_mappings (entity_type, source_id, local_id, synced_at) VALUES ('event', 1, 10, 'x')",
            [],
        );

        assert!(same_source.is_err());
        assert!(same_local.is_err());
        assert!(other_type.is_ok());
    }
}
