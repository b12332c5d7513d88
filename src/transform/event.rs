//! Event transform: category heuristics and description cleanup

use std::sync::OnceLock;

use super::{non_blank, parse_datetime, TransformResult};
use crate::error::TransformError;
use crate::models::{ApiEvent, EventCategory, EventInput};

const ORGANIZER_HINTS: &[(&str, EventCategory)] = &[
    ("social", EventCategory::Social),
    ("education", EventCategory::Education),
    ("learning", EventCategory::Education),
    ("programs", EventCategory::Education),
    ("volunteer", EventCategory::Volunteer),
    ("fundrais", EventCategory::Fundraiser),
    ("development", EventCategory::Fundraiser),
    ("board", EventCategory::Meeting),
    ("secretary", EventCategory::Meeting),
    ("president", EventCategory::Meeting),
];

const TAG_HINTS: &[(&str, EventCategory)] = &[
    ("meeting", EventCategory::Meeting),
    ("board", EventCategory::Meeting),
    ("agm", EventCategory::Meeting),
    ("social", EventCategory::Social),
    ("party", EventCategory::Social),
    ("mixer", EventCategory::Social),
    ("class", EventCategory::Education),
    ("workshop", EventCategory::Education),
    ("lecture", EventCategory::Education),
    ("education", EventCategory::Education),
    ("volunteer", EventCategory::Volunteer),
    ("fundraiser", EventCategory::Fundraiser),
    ("fundraising", EventCategory::Fundraiser),
    ("gala", EventCategory::Fundraiser),
];

/// Derive a category from the organizer's mailbox, then from tags
pub fn derive_category(organizer_email: Option<&str>, tags: &[String]) -> EventCategory {
    if let Some(email) = organizer_email {
        let mailbox = email
            .trim()
            .split('@')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        if let Some((_, category)) = ORGANIZER_HINTS
            .iter()
            .find(|(hint, _)| mailbox.contains(hint))
        {
            return *category;
        }
    }

    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if let Some((_, category)) = TAG_HINTS.iter().find(|(hint, _)| tag == *hint) {
            return *category;
        }
    }

    EventCategory::Other
}

/// Reduce HTML to plain text
pub fn strip_markup(html: &str) -> String {
    static PATTERNS: OnceLock<[regex_lite::Regex; 4]> = OnceLock::new();
    let [hidden, breaks, tags, blank_lines] = PATTERNS.get_or_init(|| {
        [
            regex_lite::Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>")
                .expect("Invalid hidden-block pattern"),
            regex_lite::Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|tr)>")
                .expect("Invalid line-break pattern"),
            regex_lite::Regex::new(r"<[^>]*>").expect("Invalid tag pattern"),
            regex_lite::Regex::new(r"\n{3,}").expect("Invalid blank-line pattern"),
        ]
    });

    let text = hidden.replace_all(html, "");
    let text = breaks.replace_all(&text, "\n");
    let text = tags.replace_all(&text, "");
    let text = decode_entities(&text);

    let lines: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    blank_lines
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    static NUMERIC: OnceLock<regex_lite::Regex> = OnceLock::new();
    let numeric = NUMERIC.get_or_init(|| {
        regex_lite::Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("Invalid entity pattern")
    });

    let decoded = numeric.replace_all(text, |caps: &regex_lite::Captures| {
        let code = &caps[1];
        let value = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse().ok(),
        };
        value
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    decoded
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Transform a source event into event fields
///
/// `chair_member_id` is the local member id of the organizer, when the
/// organizer is a mapped contact.
pub fn transform_event(event: &ApiEvent, chair_member_id: Option<i64>) -> TransformResult<EventInput> {
    let mut warnings = Vec::new();

    let Some(title) = non_blank(event.name.as_deref()) else {
        return TransformResult::err(TransformError::MissingField("name"), warnings);
    };
    let Some(raw_start) = non_blank(event.start_date.as_deref()) else {
        return TransformResult::err(TransformError::MissingField("start_date"), warnings);
    };
    let Some(start_at) = parse_datetime(&raw_start) else {
        return TransformResult::err(
            TransformError::InvalidDate {
                field: "start_date",
                value: raw_start,
            },
            warnings,
        );
    };

    let end_at = match non_blank(event.end_date.as_deref()) {
        Some(raw) => match parse_datetime(&raw) {
            Some(end) if end >= start_at => Some(end),
            Some(_) => {
                warnings.push(format!("End date '{}' precedes start, ignored", raw));
                None
            }
            None => {
                warnings.push(format!("Unparseable end date '{}', ignored", raw));
                None
            }
        },
        None => None,
    };

    let details = event.details.as_ref();
    let organizer_email = details
        .and_then(|d| d.organizer.as_ref())
        .and_then(|o| o.email.as_deref());
    let description = details
        .and_then(|d| d.description_html.as_deref())
        .map(strip_markup)
        .filter(|s| !s.is_empty());

    TransformResult::ok(
        EventInput {
            title,
            description,
            category: derive_category(organizer_email, &event.tags),
            location: non_blank(event.location.as_deref()),
            start_at,
            end_at,
            capacity: event.registrations_limit.filter(|c| *c > 0),
            chair_member_id,
            registration_enabled: event.registration_enabled,
        },
        warnings,
    )
}
