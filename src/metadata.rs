//! Best-effort date and title extraction.
//!
//! Cursor's record schemas differ between record kinds and editor versions, so nothing
//! here deserializes into fixed types. Each field is resolved by walking an ordered rule
//! table over the raw JSON object; the first rule that produces a value wins, and a record
//! that matches no rule gets a sentinel instead of an error.

use chrono::{DateTime, Datelike, Local};
use serde_json::{Map, Value};

/// Display date for records where no rule matched.
pub const UNKNOWN_DATE: &str = "Unknown";

/// Maximum title length, in characters.
pub const TITLE_LIMIT: usize = 40;

/// Integers above this magnitude are milliseconds, not seconds.
pub const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

pub const SUMMARY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";
pub const TRANSCRIPT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATE_KEYS: [&str; 4] = ["createdAt", "timestamp", "date", "time"];
const TITLE_KEYS: [&str; 3] = ["title", "name", "subject"];

type Rule = fn(&Map<String, Value>) -> Option<String>;

const DATE_RULES: &[Rule] = &[top_level_date, first_message_date];
const TITLE_RULES: &[Rule] = &[named_title, first_message_title];

/// Parse decoded text as JSON, or `None` if it is not JSON.
pub fn parse_structured(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

pub fn extract_date(text: &str) -> String {
    extract_date_from(parse_structured(text).as_ref())
}

pub fn extract_title(text: &str) -> String {
    extract_title_from(parse_structured(text).as_ref())
}

/// Same as [`extract_date`] for an already-parsed value.
pub fn extract_date_from(structured: Option<&Value>) -> String {
    apply_rules(DATE_RULES, structured).unwrap_or_else(|| UNKNOWN_DATE.to_string())
}

/// Same as [`extract_title`] for an already-parsed value.
pub fn extract_title_from(structured: Option<&Value>) -> String {
    apply_rules(TITLE_RULES, structured).unwrap_or_default()
}

fn apply_rules(rules: &[Rule], structured: Option<&Value>) -> Option<String> {
    let obj = structured?.as_object()?;
    rules.iter().find_map(|rule| rule(obj))
}

// ---------------------------------------------------------------------------
// Date rules
// ---------------------------------------------------------------------------

fn top_level_date(obj: &Map<String, Value>) -> Option<String> {
    for key in DATE_KEYS {
        let Some(value) = obj.get(key).filter(|v| is_truthy(v)) else {
            continue;
        };
        if let Some(formatted) =
            coerce_timestamp(value).and_then(|ts| format_timestamp(ts, SUMMARY_DATE_FORMAT))
        {
            return Some(formatted);
        }
        if let Value::String(s) = value
            && s.chars().count() > 5
        {
            return Some(s.clone());
        }
    }
    None
}

fn first_message_date(obj: &Map<String, Value>) -> Option<String> {
    let ts = first_message(obj)?.get("timestamp")?;
    format_timestamp(coerce_timestamp(ts)?, SUMMARY_DATE_FORMAT)
}

// ---------------------------------------------------------------------------
// Title rules
// ---------------------------------------------------------------------------

fn named_title(obj: &Map<String, Value>) -> Option<String> {
    TITLE_KEYS.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => {
            Some(truncate_chars(s, TITLE_LIMIT).to_string())
        }
        _ => None,
    })
}

fn first_message_title(obj: &Map<String, Value>) -> Option<String> {
    let content = first_message(obj)?.get("content")?.as_str()?;
    let first_line = content.split('\n').next().unwrap_or_default();
    let mut title = truncate_chars(first_line, TITLE_LIMIT).to_string();
    if first_line.chars().count() > TITLE_LIMIT {
        title.push_str("...");
    }
    Some(title)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn first_message(obj: &Map<String, Value>) -> Option<&Map<String, Value>> {
    obj.get("messages")?.as_array()?.first()?.as_object()
}

/// Whether a JSON value counts as "present": not null, false, zero or empty.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Interpret a JSON value as an integer timestamp.
///
/// Accepts integers, floats (truncated toward zero), booleans and strings holding a
/// plain base-10 integer with optional surrounding whitespace.
pub fn coerce_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                    .map(|f| f.trunc() as i64)
            }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Format a Unix timestamp in local time, treating large magnitudes as milliseconds.
/// `None` when the instant falls outside years 1..=9999.
pub fn format_timestamp(ts: i64, fmt: &str) -> Option<String> {
    let utc = if ts.unsigned_abs() > MILLIS_THRESHOLD.unsigned_abs() {
        DateTime::from_timestamp_millis(ts)
    } else {
        DateTime::from_timestamp(ts, 0)
    }?;
    let local = utc.with_timezone(&Local);
    if !(1..=9999).contains(&local.year()) {
        return None;
    }
    Some(local.format(fmt).to_string())
}

fn truncate_chars(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
