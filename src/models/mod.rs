//! Domain models for membership-sync
//!
//! Source API records, local store entities and the bookkeeping records
//! (id mappings, sync state, audit entries) that connect the two.

pub mod local;
pub mod mapping;
pub mod source;

// Re-export commonly used types
pub use local::{
    Event, EventCategory, EventInput, Member, MemberInput, MemberStatus, Registration,
    RegistrationInput, RegistrationStatus, WaitlistPosition, WAITLIST_POSITION_UNKNOWN,
};
pub use mapping::{
    AuditAction, AuditEntry, EntityType, IdMapping, OrphanRegistration, StoreCounts, SyncMode,
    SyncState,
};
pub use source::{
    AccountInfo, ApiContact, ApiEvent, ApiRegistration, ContactFieldDef, EventDetails,
    FieldValue, MembershipLevel, ObjectRef,
};
