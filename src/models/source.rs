//! Records as returned by the source membership API
//!
//! Field names follow the API's PascalCase JSON. Everything that the API may
//! omit is optional so that a single malformed record fails in the transformer,
//! not during deserialization of a whole page.

use serde::{Deserialize, Serialize};

/// Reference to another source object by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectRef {
    /// Source id
    pub id: i64,

    /// Display name, when embedded
    #[serde(default)]
    pub name: Option<String>,

    /// Email, when embedded (event organizers)
    #[serde(default)]
    pub email: Option<String>,
}

impl ObjectRef {
    /// Create a bare reference
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: None,
            email: None,
        }
    }
}

/// A custom or system field value attached to a contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FieldValue {
    /// Field display name
    pub field_name: String,

    /// System code for built-in fields
    #[serde(default)]
    pub system_code: Option<String>,

    /// Raw value; strings, numbers, objects or null
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A contact (member or prospect)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiContact {
    /// Source id
    pub id: i64,

    /// Given name
    #[serde(default)]
    pub first_name: Option<String>,

    /// Family name
    #[serde(default)]
    pub last_name: Option<String>,

    /// Primary email
    #[serde(default)]
    pub email: Option<String>,

    /// Membership status (`Active`, `Lapsed`, `PendingNew`, ...)
    #[serde(default)]
    pub status: Option<String>,

    /// Membership level reference
    #[serde(default)]
    pub membership_level: Option<ObjectRef>,

    /// Last profile modification timestamp
    #[serde(default)]
    pub profile_last_updated: Option<String>,

    /// Custom and system field values
    #[serde(default)]
    pub field_values: Vec<FieldValue>,
}

impl ApiContact {
    /// Look up a field value by system code first, then by display name
    pub fn field(&self, system_code: &str, field_name: &str) -> Option<&serde_json::Value> {
        self.field_values
            .iter()
            .find(|f| f.system_code.as_deref() == Some(system_code))
            .or_else(|| {
                self.field_values
                    .iter()
                    .find(|f| f.field_name.eq_ignore_ascii_case(field_name))
            })
            .map(|f| &f.value)
            .filter(|v| !v.is_null())
    }
}

/// Extra event details returned with an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventDetails {
    /// Description with markup
    #[serde(default)]
    pub description_html: Option<String>,

    /// Organizer contact
    #[serde(default)]
    pub organizer: Option<ObjectRef>,
}

/// An event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiEvent {
    /// Source id
    pub id: i64,

    /// Title
    #[serde(default)]
    pub name: Option<String>,

    /// Start timestamp
    #[serde(default)]
    pub start_date: Option<String>,

    /// End timestamp
    #[serde(default)]
    pub end_date: Option<String>,

    /// Free-text location
    #[serde(default)]
    pub location: Option<String>,

    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Whether online registration is open
    #[serde(default)]
    pub registration_enabled: bool,

    /// Capacity
    #[serde(default)]
    pub registrations_limit: Option<u32>,

    /// Description and organizer
    #[serde(default)]
    pub details: Option<EventDetails>,
}

/// A registration of a contact for an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiRegistration {
    /// Source id
    pub id: i64,

    /// Event reference
    pub event: ObjectRef,

    /// Registrant reference
    pub contact: ObjectRef,

    /// Registration type (ticket kind)
    #[serde(default)]
    pub registration_type: Option<ObjectRef>,

    /// Free-form status (`Cancelled`, ...)
    #[serde(default)]
    pub status: Option<String>,

    /// Whether the registrant checked in
    #[serde(default)]
    pub is_checked_in: bool,

    /// Whether the registrant is on the waitlist
    #[serde(default)]
    pub on_waitlist: bool,

    /// Waitlist position, rarely present
    #[serde(default)]
    pub waitlist_position: Option<u32>,

    /// Registration timestamp
    #[serde(default)]
    pub registration_date: Option<String>,
}

/// A membership level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MembershipLevel {
    /// Source id
    pub id: i64,

    /// Level name
    pub name: String,

    /// Membership fee
    #[serde(default)]
    pub membership_fee: Option<f64>,
}

/// A contact field definition from the field schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactFieldDef {
    /// Display name
    pub field_name: String,

    /// System code, for built-in fields
    #[serde(default)]
    pub system_code: Option<String>,

    /// Field type name
    #[serde(default, rename = "Type")]
    pub field_type: Option<String>,
}

/// Account summary, used for connectivity checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountInfo {
    /// Account id
    pub id: i64,

    /// Organization name
    #[serde(default)]
    pub name: Option<String>,
}
