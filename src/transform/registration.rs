//! Registration transform

use chrono::{DateTime, Utc};

use super::{non_blank, parse_datetime, TransformResult};
use crate::models::{ApiRegistration, RegistrationInput, RegistrationStatus, WaitlistPosition};

/// Derive the local registration status
///
/// Cancellation wins over check-in, and check-in wins over the waitlist flag.
pub fn map_registration_status(registration: &ApiRegistration) -> RegistrationStatus {
    let cancelled = registration
        .status
        .as_deref()
        .map(|s| {
            let s = s.trim().to_ascii_lowercase();
            s == "cancelled" || s == "canceled"
        })
        .unwrap_or(false);

    if cancelled {
        RegistrationStatus::Cancelled
    } else if registration.is_checked_in {
        RegistrationStatus::Attended
    } else if registration.on_waitlist {
        RegistrationStatus::Waitlisted
    } else {
        RegistrationStatus::Registered
    }
}

/// Transform a source registration for an already-resolved event and member
pub fn transform_registration(
    registration: &ApiRegistration,
    event_id: i64,
    member_id: i64,
    now: DateTime<Utc>,
) -> TransformResult<RegistrationInput> {
    let mut warnings = Vec::new();
    let status = map_registration_status(registration);

    let registered_at = match non_blank(registration.registration_date.as_deref()) {
        Some(raw) => parse_datetime(&raw).unwrap_or_else(|| {
            warnings.push(format!(
                "Unparseable registration date '{}', using current time",
                raw
            ));
            now
        }),
        None => {
            warnings.push("Missing registration date, using current time".to_string());
            now
        }
    };

    let waitlist_position = (status == RegistrationStatus::Waitlisted).then(|| {
        registration
            .waitlist_position
            .filter(|p| *p > 0)
            .map(WaitlistPosition::Position)
            .unwrap_or(WaitlistPosition::Unknown)
    });

    TransformResult::ok(
        RegistrationInput {
            event_id,
            member_id,
            status,
            registration_type: registration
                .registration_type
                .as_ref()
                .and_then(|t| non_blank(t.name.as_deref())),
            registered_at,
            waitlist_position,
        },
        warnings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    fn registration(value: serde_json::Value) -> ApiRegistration {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_status_precedence() {
        let cancelled = registration(json!({
            "Id": 1, "Event": {"Id": 1}, "Contact": {"Id": 1},
            "Status": "Canceled", "IsCheckedIn": true
        }));
        assert_eq!(map_registration_status(&cancelled), RegistrationStatus::Cancelled);

        let attended = registration(json!({
            "Id": 2, "Event": {"Id": 1}, "Contact": {"Id": 1},
            "IsCheckedIn": true, "OnWaitlist": true
        }));
        assert_eq!(map_registration_status(&attended), RegistrationStatus::Attended);

        let plain = registration(json!({"Id": 3, "Event": {"Id": 1}, "Contact": {"Id": 1}}));
        assert_eq!(map_registration_status(&plain), RegistrationStatus::Registered);
    }

    #[test]
    fn test_waitlist_position_unknown_when_absent() {
        let reg = registration(json!({
            "Id": 4, "Event": {"Id": 1}, "Contact": {"Id": 1},
            "OnWaitlist": true, "RegistrationDate": "2026-04-01T12:00:00Z"
        }));

        let result = transform_registration(&reg, 10, 20, now());
        let input = result.outcome.unwrap();

        assert!(result.warnings.is_empty());
        assert_eq!(input.status, RegistrationStatus::Waitlisted);
        assert_eq!(input.waitlist_position, Some(WaitlistPosition::Unknown));
        assert_eq!(input.event_id, 10);
        assert_eq!(input.member_id, 20);
    }

    #[test]
    fn test_waitlist_position_reported() {
        let reg = registration(json!({
            "Id": 5, "Event": {"Id": 1}, "Contact": {"Id": 1},
            "OnWaitlist": true, "WaitlistPosition": 3,
            "RegistrationDate": "2026-04-01T12:00:00Z"
        }));

        let input = transform_registration(&reg, 1, 1, now()).outcome.unwrap();
        assert_eq!(input.waitlist_position, Some(WaitlistPosition::Position(3)));
    }

    #[test]
    fn test_registered_has_no_position_and_date_fallback() {
        let reg = registration(json!({
            "Id": 6, "Event": {"Id": 1}, "Contact": {"Id": 1},
            "RegistrationType": {"Id": 2, "Name": "Member ticket"}
        }));

        let result = transform_registration(&reg, 1, 1, now());
        let input = result.outcome.unwrap();

        assert_eq!(input.waitlist_position, None);
        assert_eq!(input.registered_at, now());
        assert_eq!(input.registration_type.as_deref(), Some("Member ticket"));
        assert_eq!(result.warnings.len(), 1);
    }
}
