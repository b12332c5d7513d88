//! Contact → member transform

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::OnceLock;

use super::{non_blank, parse_date, value_as_string, TransformResult};
use crate::error::TransformError;
use crate::models::{ApiContact, ContactFieldDef, MemberInput, MemberStatus};

/// Where a value lives among a contact's field values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKey {
    /// System code
    pub system_code: String,
    /// Display name
    pub field_name: String,
}

impl FieldKey {
    fn new(system_code: &str, field_name: &str) -> Self {
        Self {
            system_code: system_code.to_string(),
            field_name: field_name.to_string(),
        }
    }
}

/// Field locations resolved from the contact field schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactFieldMap {
    /// Join date
    pub member_since: FieldKey,
    /// Renewal due date
    pub renewal_due: FieldKey,
    /// Phone number
    pub phone: FieldKey,
}

impl Default for ContactFieldMap {
    fn default() -> Self {
        Self {
            member_since: FieldKey::new("MemberSince", "Member since"),
            renewal_due: FieldKey::new("RenewalDue", "Renewal due"),
            phone: FieldKey::new("Phone", "Phone"),
        }
    }
}

impl ContactFieldMap {
    /// Resolve display names from the account's field schema
    pub fn from_schema(fields: &[ContactFieldDef]) -> Self {
        let mut map = Self::default();
        for key in [&mut map.member_since, &mut map.renewal_due, &mut map.phone] {
            if let Some(def) = fields
                .iter()
                .find(|f| f.system_code.as_deref() == Some(key.system_code.as_str()))
            {
                key.field_name = def.field_name.clone();
            }
        }
        map
    }
}

/// Lookups shared by every contact of a run
#[derive(Debug, Clone)]
pub struct ContactContext {
    /// Field locations
    pub fields: ContactFieldMap,
    /// Membership level names by source id
    pub levels: HashMap<i64, String>,
    /// Fallback timestamp for missing join dates
    pub now: DateTime<Utc>,
}

impl ContactContext {
    /// Context using default field names and no level lookup
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            fields: ContactFieldMap::default(),
            levels: HashMap::new(),
            now,
        }
    }
}

/// Map a source membership status to a local status code
///
/// Contacts with no membership status are archived. Unknown statuses become
/// `pending` and produce a warning.
pub fn map_member_status(status: Option<&str>) -> (MemberStatus, Option<String>) {
    let Some(raw) = status.map(str::trim).filter(|s| !s.is_empty()) else {
        return (MemberStatus::Archived, None);
    };

    let status = match raw.to_ascii_lowercase().as_str() {
        "active" => MemberStatus::Active,
        "lapsed" => MemberStatus::Lapsed,
        "pendingnew" | "pendingrenewal" | "pendingupgrade" | "pendinglevel" | "pending" => {
            MemberStatus::Pending
        }
        "suspended" => MemberStatus::Suspended,
        "archived" => MemberStatus::Archived,
        _ => {
            return (
                MemberStatus::Pending,
                Some(format!("Unknown membership status '{}', mapped to pending", raw)),
            )
        }
    };
    (status, None)
}

/// Normalize and validate an email address
pub fn normalize_email(raw: &str) -> Result<String, TransformError> {
    static EMAIL: OnceLock<regex_lite::Regex> = OnceLock::new();
    let re = EMAIL.get_or_init(|| {
        regex_lite::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email pattern")
    });

    let email = raw.trim().to_lowercase();
    if re.is_match(&email) {
        Ok(email)
    } else {
        Err(TransformError::InvalidEmail(raw.trim().to_string()))
    }
}

/// Transform a source contact into member fields
pub fn transform_contact(contact: &ApiContact, ctx: &ContactContext) -> TransformResult<MemberInput> {
    let mut warnings = Vec::new();

    let email = match non_blank(contact.email.as_deref()) {
        Some(raw) => match normalize_email(&raw) {
            Ok(email) => email,
            Err(e) => return TransformResult::err(e, warnings),
        },
        None => return TransformResult::err(TransformError::MissingField("email"), warnings),
    };
    let Some(first_name) = non_blank(contact.first_name.as_deref()) else {
        return TransformResult::err(TransformError::MissingField("first_name"), warnings);
    };
    let Some(last_name) = non_blank(contact.last_name.as_deref()) else {
        return TransformResult::err(TransformError::MissingField("last_name"), warnings);
    };

    let (status, status_warning) = map_member_status(contact.status.as_deref());
    warnings.extend(status_warning);

    let field_text = |key: &FieldKey| {
        contact
            .field(&key.system_code, &key.field_name)
            .and_then(value_as_string)
    };

    let (join_date, join_date_from_source) = match field_text(&ctx.fields.member_since) {
        Some(raw) => match parse_date(&raw) {
            Some(date) => (date, true),
            None => {
                warnings.push(format!(
                    "Unparseable join date '{}', using current date",
                    raw
                ));
                (ctx.now.date_naive(), false)
            }
        },
        None => {
            warnings.push("Missing join date, using current date".to_string());
            (ctx.now.date_naive(), false)
        }
    };

    let renewal_due = match field_text(&ctx.fields.renewal_due) {
        Some(raw) => {
            let parsed = parse_date(&raw);
            if parsed.is_none() {
                warnings.push(format!("Unparseable renewal date '{}', ignored", raw));
            }
            parsed
        }
        None => None,
    };

    let membership_level = contact.membership_level.as_ref().and_then(|level| {
        non_blank(level.name.as_deref()).or_else(|| ctx.levels.get(&level.id).cloned())
    });

    TransformResult::ok(
        MemberInput {
            email,
            first_name,
            last_name,
            phone: field_text(&ctx.fields.phone),
            status,
            membership_level,
            join_date,
            join_date_from_source,
            renewal_due,
        },
        warnings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    fn contact(value: serde_json::Value) -> ApiContact {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_full_contact() {
        let c = contact(json!({
            "Id": 1,
            "FirstName": " Ada ",
            "LastName": "Lovelace",
            "Email": "  Ada@Example.ORG ",
            "Status": "Active",
            "MembershipLevel": {"Id": 3, "Name": "Gold"},
            "FieldValues": [
                {"FieldName": "Member since", "SystemCode": "MemberSince", "Value": "2019-04-02T00:00:00-05:00"},
                {"FieldName": "Renewal due", "SystemCode": "RenewalDue", "Value": "2027-04-02"},
                {"FieldName": "Phone", "SystemCode": "Phone", "Value": "555-0100"}
            ]
        }));

        let result = transform_contact(&c, &ContactContext::new(now()));
        let member = result.outcome.unwrap();

        assert!(result.warnings.is_empty());
        assert_eq!(member.email, "ada@example.org");
        assert_eq!(member.first_name, "Ada");
        assert_eq!(member.status, MemberStatus::Active);
        assert_eq!(member.membership_level.as_deref(), Some("Gold"));
        assert_eq!(member.join_date, NaiveDate::from_ymd_opt(2019, 4, 2).unwrap());
        assert!(member.join_date_from_source);
        assert_eq!(member.renewal_due, NaiveDate::from_ymd_opt(2027, 4, 2));
        assert_eq!(member.phone.as_deref(), Some("555-0100"));
    }

    #[test]
    fn test_missing_join_date_falls_back_to_now() {
        let c = contact(json!({
            "Id": 2, "FirstName": "A", "LastName": "B", "Email": "a@b.co", "Status": "Lapsed"
        }));

        let result = transform_contact(&c, &ContactContext::new(now()));

        assert!(result.is_success());
        let member = result.outcome.as_ref().unwrap();
        assert_eq!(member.join_date, now().date_naive());
        assert!(!member.join_date_from_source);
        assert_eq!(result.warnings, vec!["Missing join date, using current date"]);
    }

    #[test]
    fn test_schema_renamed_join_date_field() {
        let schema = vec![ContactFieldDef {
            field_name: "Joined on".to_string(),
            system_code: Some("MemberSince".to_string()),
            field_type: Some("Date".to_string()),
        }];
        let mut ctx = ContactContext::new(now());
        ctx.fields = ContactFieldMap::from_schema(&schema);

        let c = contact(json!({
            "Id": 3, "FirstName": "A", "LastName": "B", "Email": "a@b.co",
            "FieldValues": [{"FieldName": "Joined on", "Value": "2001-09-09"}]
        }));

        let member = transform_contact(&c, &ctx).outcome.unwrap();
        assert_eq!(member.join_date, NaiveDate::from_ymd_opt(2001, 9, 9).unwrap());
        assert_eq!(ctx.fields.phone.field_name, "Phone");
    }

    #[test]
    fn test_level_resolved_by_id() {
        let mut ctx = ContactContext::new(now());
        ctx.levels.insert(9, "Student".to_string());

        let c = contact(json!({
            "Id": 4, "FirstName": "A", "LastName": "B", "Email": "a@b.co",
            "MembershipLevel": {"Id": 9}
        }));

        let member = transform_contact(&c, &ctx).outcome.unwrap();
        assert_eq!(member.membership_level.as_deref(), Some("Student"));
    }

    #[test]
    fn test_required_fields() {
        let ctx = ContactContext::new(now());

        let no_email = contact(json!({"Id": 5, "FirstName": "A", "LastName": "B"}));
        assert_eq!(
            transform_contact(&no_email, &ctx).outcome,
            Err(TransformError::MissingField("email"))
        );

        let blank_last = contact(json!({"Id": 6, "FirstName": "A", "LastName": "  ", "Email": "a@b.co"}));
        assert_eq!(
            transform_contact(&blank_last, &ctx).outcome,
            Err(TransformError::MissingField("last_name"))
        );

        let bad_email = contact(json!({"Id": 7, "FirstName": "A", "LastName": "B", "Email": "not-an-email"}));
        assert_eq!(
            transform_contact(&bad_email, &ctx).outcome,
            Err(TransformError::InvalidEmail("not-an-email".to_string()))
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_member_status(Some("Active")), (MemberStatus::Active, None));
        assert_eq!(map_member_status(Some("PendingRenewal")).0, MemberStatus::Pending);
        assert_eq!(map_member_status(Some("suspended")).0, MemberStatus::Suspended);
        assert_eq!(map_member_status(None), (MemberStatus::Archived, None));

        let (status, warning) = map_member_status(Some("Frozen"));
        assert_eq!(status, MemberStatus::Pending);
        assert!(warning.unwrap().contains("Frozen"));
    }

    #[test]
    fn test_unparseable_dates_warn() {
        let c = contact(json!({
            "Id": 8, "FirstName": "A", "LastName": "B", "Email": "a@b.co",
            "FieldValues": [
                {"FieldName": "Member since", "SystemCode": "MemberSince", "Value": "a while ago"},
                {"FieldName": "Renewal due", "SystemCode": "RenewalDue", "Value": "never"}
            ]
        }));

        let result = transform_contact(&c, &ContactContext::new(now()));
        let member = result.outcome.unwrap();

        assert_eq!(member.join_date, now().date_naive());
        assert!(!member.join_date_from_source);
        assert_eq!(member.renewal_due, None);
        assert_eq!(result.warnings.len(), 2);
    }
}
