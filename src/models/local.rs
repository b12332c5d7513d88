//! Local store entities and the input shapes produced by the transformer

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stored value for a waitlisted registration whose position is unknown
pub const WAITLIST_POSITION_UNKNOWN: i64 = -1;

/// Local membership status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    /// Paid up
    Active,
    /// Membership expired
    Lapsed,
    /// New, renewal or level change awaiting approval or payment
    Pending,
    /// Suspended by an administrator
    Suspended,
    /// Contact without a membership
    Archived,
}

impl MemberStatus {
    /// Every status code the local store must know about
    pub const ALL: [MemberStatus; 5] = [
        MemberStatus::Active,
        MemberStatus::Lapsed,
        MemberStatus::Pending,
        MemberStatus::Suspended,
        MemberStatus::Archived,
    ];

    /// Status code as stored
    pub fn code(&self) -> &'static str {
        match self {
            MemberStatus::Active => "active",
            MemberStatus::Lapsed => "lapsed",
            MemberStatus::Pending => "pending",
            MemberStatus::Suspended => "suspended",
            MemberStatus::Archived => "archived",
        }
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemberStatus::ALL
            .into_iter()
            .find(|status| status.code() == s)
            .ok_or_else(|| format!("Invalid member status: {}", s))
    }
}

/// Event category derived from organizer or tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Business or board meeting
    Meeting,
    /// Social gathering
    Social,
    /// Class, workshop or lecture
    Education,
    /// Volunteer activity
    Volunteer,
    /// Fundraising event
    Fundraiser,
    /// Anything else
    Other,
}

impl EventCategory {
    /// Category code as stored
    pub fn code(&self) -> &'static str {
        match self {
            EventCategory::Meeting => "meeting",
            EventCategory::Social => "social",
            EventCategory::Education => "education",
            EventCategory::Volunteer => "volunteer",
            EventCategory::Fundraiser => "fundraiser",
            EventCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meeting" => Ok(EventCategory::Meeting),
            "social" => Ok(EventCategory::Social),
            "education" => Ok(EventCategory::Education),
            "volunteer" => Ok(EventCategory::Volunteer),
            "fundraiser" => Ok(EventCategory::Fundraiser),
            "other" => Ok(EventCategory::Other),
            _ => Err(format!("Invalid event category: {}", s)),
        }
    }
}

/// Local registration status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Confirmed seat
    Registered,
    /// On the waitlist
    Waitlisted,
    /// Cancelled by registrant or organizer
    Cancelled,
    /// Checked in at the event
    Attended,
}

impl RegistrationStatus {
    /// Status code as stored
    pub fn code(&self) -> &'static str {
        match self {
            RegistrationStatus::Registered => "registered",
            RegistrationStatus::Waitlisted => "waitlisted",
            RegistrationStatus::Cancelled => "cancelled",
            RegistrationStatus::Attended => "attended",
        }
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(RegistrationStatus::Registered),
            "waitlisted" => Ok(RegistrationStatus::Waitlisted),
            "cancelled" => Ok(RegistrationStatus::Cancelled),
            "attended" => Ok(RegistrationStatus::Attended),
            _ => Err(format!("Invalid registration status: {}", s)),
        }
    }
}

/// Position of a waitlisted registration
///
/// The source API usually omits the position; `Unknown` records that rather
/// than guessing a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistPosition {
    /// Waitlisted, position not reported
    Unknown,
    /// Reported position (1-based)
    Position(u32),
}

impl WaitlistPosition {
    /// Encode for storage
    pub fn to_stored(self) -> i64 {
        match self {
            WaitlistPosition::Unknown => WAITLIST_POSITION_UNKNOWN,
            WaitlistPosition::Position(p) => i64::from(p),
        }
    }

    /// Decode from storage; negative or out-of-range values are `Unknown`
    pub fn from_stored(value: i64) -> Self {
        match u32::try_from(value) {
            Ok(p) if p > 0 => WaitlistPosition::Position(p),
            _ => WaitlistPosition::Unknown,
        }
    }
}

/// Member fields written by the sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInput {
    /// Normalized (trimmed, lowercased) email; natural key
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Phone number
    pub phone: Option<String>,
    /// Status code
    pub status: MemberStatus,
    /// Membership level name
    pub membership_level: Option<String>,
    /// Join date
    pub join_date: NaiveDate,
    /// Whether `join_date` was read from the source rather than defaulted to today
    #[serde(default)]
    pub join_date_from_source: bool,
    /// Renewal due date
    pub renewal_due: Option<NaiveDate>,
}

impl MemberInput {
    /// Names of the fields that differ from the stored member
    ///
    /// A defaulted join date never counts as a change; a join date read from
    /// the source replaces whatever is stored.
    pub fn changed_fields(&self, existing: &Member) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.email != existing.email {
            changed.push("email");
        }
        if self.first_name != existing.first_name {
            changed.push("first_name");
        }
        if self.last_name != existing.last_name {
            changed.push("last_name");
        }
        if self.phone != existing.phone {
            changed.push("phone");
        }
        if self.status != existing.status {
            changed.push("status");
        }
        if self.membership_level != existing.membership_level {
            changed.push("membership_level");
        }
        if self.join_date_from_source && self.join_date != existing.join_date {
            changed.push("join_date");
        }
        if self.renewal_due != existing.renewal_due {
            changed.push("renewal_due");
        }
        changed
    }
}

/// Stored member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Local id
    pub id: i64,
    /// Normalized email
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Phone number
    pub phone: Option<String>,
    /// Status code
    pub status: MemberStatus,
    /// Membership level name
    pub membership_level: Option<String>,
    /// Join date
    pub join_date: NaiveDate,
    /// Renewal due date
    pub renewal_due: Option<NaiveDate>,
    /// Row creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time
    pub updated_at: Option<DateTime<Utc>>,
}

/// Event fields written by the sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    /// Title
    pub title: String,
    /// Plain-text description
    pub description: Option<String>,
    /// Derived category
    pub category: EventCategory,
    /// Location
    pub location: Option<String>,
    /// Start
    pub start_at: DateTime<Utc>,
    /// End
    pub end_at: Option<DateTime<Utc>>,
    /// Capacity
    pub capacity: Option<u32>,
    /// Local member id of the event chair
    pub chair_member_id: Option<i64>,
    /// Whether registration is open
    pub registration_enabled: bool,
}

impl EventInput {
    /// Names of the fields that differ from the stored event
    pub fn changed_fields(&self, existing: &Event) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.title != existing.title {
            changed.push("title");
        }
        if self.description != existing.description {
            changed.push("description");
        }
        if self.category != existing.category {
            changed.push("category");
        }
        if self.location != existing.location {
            changed.push("location");
        }
        if self.start_at != existing.start_at {
            changed.push("start_at");
        }
        if self.end_at != existing.end_at {
            changed.push("end_at");
        }
        if self.capacity != existing.capacity {
            changed.push("capacity");
        }
        if self.chair_member_id != existing.chair_member_id {
            changed.push("chair_member_id");
        }
        if self.registration_enabled != existing.registration_enabled {
            changed.push("registration_enabled");
        }
        changed
    }
}

/// Stored event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Local id
    pub id: i64,
    /// Title
    pub title: String,
    /// Plain-text description
    pub description: Option<String>,
    /// Category
    pub category: EventCategory,
    /// Location
    pub location: Option<String>,
    /// Start
    pub start_at: DateTime<Utc>,
    /// End
    pub end_at: Option<DateTime<Utc>>,
    /// Capacity
    pub capacity: Option<u32>,
    /// Local member id of the event chair
    pub chair_member_id: Option<i64>,
    /// Whether registration is open
    pub registration_enabled: bool,
}

/// Registration fields written by the sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationInput {
    /// Local event id
    pub event_id: i64,
    /// Local member id
    pub member_id: i64,
    /// Status
    pub status: RegistrationStatus,
    /// Registration type name
    pub registration_type: Option<String>,
    /// Registration time
    pub registered_at: DateTime<Utc>,
    /// Waitlist position, only for waitlisted registrations
    pub waitlist_position: Option<WaitlistPosition>,
}

impl RegistrationInput {
    /// Names of the mutable fields that differ from the stored registration
    pub fn changed_fields(&self, existing: &Registration) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.status != existing.status {
            changed.push("status");
        }
        if self.registration_type != existing.registration_type {
            changed.push("registration_type");
        }
        if self.waitlist_position != existing.waitlist_position {
            changed.push("waitlist_position");
        }
        changed
    }
}

/// Stored registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Local id
    pub id: i64,
    /// Local event id
    pub event_id: i64,
    /// Local member id
    pub member_id: i64,
    /// Status
    pub status: RegistrationStatus,
    /// Registration type name
    pub registration_type: Option<String>,
    /// Registration time
    pub registered_at: DateTime<Utc>,
    /// Waitlist position
    pub waitlist_position: Option<WaitlistPosition>,
}
