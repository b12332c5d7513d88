//! Pure mapping of source records to local store input shapes
//!
//! Transformers never touch the network or the store. Each record yields a
//! [`TransformResult`]: either the input shape or a typed error, plus any
//! non-fatal warnings about fallbacks that were applied.

pub mod contact;
pub mod event;
pub mod registration;

pub use contact::{map_member_status, transform_contact, ContactContext, ContactFieldMap};
pub use event::{derive_category, strip_markup, transform_event};
pub use registration::{map_registration_status, transform_registration};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::TransformError;

/// Outcome of transforming one source record
#[derive(Debug, Clone, PartialEq)]
pub struct TransformResult<T> {
    /// Transformed value or the reason the record was rejected
    pub outcome: Result<T, TransformError>,
    /// Fallbacks applied while transforming
    pub warnings: Vec<String>,
}

impl<T> TransformResult<T> {
    /// Successful transform
    pub fn ok(value: T, warnings: Vec<String>) -> Self {
        Self {
            outcome: Ok(value),
            warnings,
        }
    }

    /// Rejected record
    pub fn err(error: TransformError, warnings: Vec<String>) -> Self {
        Self {
            outcome: Err(error),
            warnings,
        }
    }

    /// True when the record produced a value
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Parse a source timestamp
///
/// Accepts RFC 3339 with offset, naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC)
/// and bare dates (midnight UTC).
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse a source date, keeping the calendar date as written
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.date())
}

/// Render a field value as trimmed text
///
/// Choice fields arrive as objects carrying a `Label`.
pub fn value_as_string(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Object(map) => map
            .get("Label")
            .or_else(|| map.get("Value"))
            .and_then(value_as_string)?,
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Trim an optional string, treating blank as absent
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
