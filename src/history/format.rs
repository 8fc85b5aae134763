//! Display helpers for snapshots and diffs.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::models::ScalarFieldDiff;

pub const UNKNOWN_SNAPSHOT_DATE: &str = "Unknown date";
pub const UNKNOWN_DATE_TIME: &str = "(unknown)";

/// Keys that name a list item, in order of preference.
pub const ITEM_NAME_KEYS: [&str; 6] = ["identifier", "source_id", "target_id", "name", "uuid", "id"];

// {YYYYmmddTHHMMSS.ffffffZ}-{token}{suffix}
static CACHE_ID_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{4})([0-9]{2})([0-9]{2})T([0-9]{2})([0-9]{2})([0-9]{2})\.([0-9]+)Z")
        .expect("snapshot date pattern is valid")
});

const DISPLAY_FORMAT: &str = "%b %-d, %Y, %-I:%M:%S %p";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Added,
    Removed,
    Updated,
}

impl DiffKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffKind::Added => "added",
            DiffKind::Removed => "removed",
            DiffKind::Updated => "updated",
        }
    }
}

/// Timestamp encoded in a snapshot id (only the last path segment is read).
pub fn parse_cache_date(cache_id: &str) -> Option<DateTime<Utc>> {
    let filename = cache_id.rsplit('/').next().unwrap_or(cache_id);
    let caps = CACHE_ID_DATE.captures(filename)?;
    let num = |i: usize| caps[i].parse::<u32>().ok();

    let frac: String = caps[7].chars().take(3).collect();
    let millis: u32 = format!("{:0<3}", frac).parse().ok()?;

    let date = NaiveDate::from_ymd_opt(caps[1].parse().ok()?, num(2)?, num(3)?)?;
    let naive = date.and_hms_milli_opt(num(4)?, num(5)?, num(6)?, millis)?;
    Some(Utc.from_utc_datetime(&naive))
}

fn display<Tz: TimeZone>(datetime: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    datetime.format(DISPLAY_FORMAT).to_string()
}

/// Local date/time of a snapshot, or "Unknown date".
pub fn format_cache_date_time(cache_id: &str) -> String {
    match parse_cache_date(cache_id) {
        Some(datetime) => display(datetime.with_timezone(&Local)),
        None => UNKNOWN_SNAPSHOT_DATE.to_string(),
    }
}

/// Local rendering of an RFC 3339 timestamp, or "(unknown)".
pub fn format_date_time(text: &str) -> String {
    match DateTime::parse_from_rfc3339(text) {
        Ok(datetime) => display(datetime.with_timezone(&Local)),
        Err(_) => UNKNOWN_DATE_TIME.to_string(),
    }
}

pub fn format_field_path(path: &str) -> String {
    path.split('.').collect::<Vec<_>>().join(" > ")
}

/// One-line rendering of a diff value. `None` is a missing value.
pub fn format_inline_value(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return "(missing)".to_string();
    };
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) if s.is_empty() => "(empty string)".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) if items.is_empty() => "(empty list)".to_string(),
        Value::Array(items) => format!("{} values", items.len()),
        Value::Object(map) => match preferred_key(map) {
            Some(key) => format!("{}: {}", key, format_inline_value(map.get(key))),
            None => format!("({} fields)", map.len()),
        },
    }
}

fn preferred_key(item: &Map<String, Value>) -> Option<&'static str> {
    ITEM_NAME_KEYS.iter().copied().find(|key| item.contains_key(*key))
}

/// Stable key of a list item for display purposes.
pub fn list_item_key(item: &Map<String, Value>) -> String {
    if let Some(key) = preferred_key(item) {
        return format!("{}-{}", key, format_inline_value(item.get(key)));
    }
    if item.is_empty() {
        return "empty-item".to_string();
    }
    item.iter()
        .map(|(key, value)| format!("{}:{}", key, format_inline_value(Some(value))))
        .collect::<Vec<_>>()
        .join("|")
}

pub fn scalar_diff_kind(diff: &ScalarFieldDiff) -> DiffKind {
    let missing = |v: &Option<Value>| matches!(v, None | Some(Value::Null));
    match (missing(&diff.before), missing(&diff.after)) {
        (true, false) => DiffKind::Added,
        (false, true) => DiffKind::Removed,
        (true, true) => {
            tracing::warn!("Diff for {} has neither before nor after value", diff.field_path);
            DiffKind::Updated
        }
        (false, false) => DiffKind::Updated,
    }
}

/// 1-based label of a snapshot in display order.
pub fn snapshot_label(index: usize) -> String {
    format!("Snapshot {}", index + 1)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn scalar(before: Option<Value>, after: Option<Value>) -> ScalarFieldDiff {
        ScalarFieldDiff {
            field_path: "model.name".to_string(),
            before,
            after,
        }
    }

    #[test]
    fn test_parse_cache_date() {
        let parsed = parse_cache_date("config/20240102T030405.123456Z-abc.json").unwrap();
        assert_eq!(
            parsed.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "2024-01-02T03:04:05.123Z"
        );

        let short = parse_cache_date("20240102T030405.5Z-abc.json").unwrap();
        assert_eq!(short.timestamp_subsec_millis(), 500);

        assert_eq!(parse_cache_date("not-a-snapshot.json"), None);
        assert_eq!(parse_cache_date("20241332T030405.1Z-abc.json"), None);
        assert_eq!(format_cache_date_time("garbage"), "Unknown date");

        // Non-ASCII digits are not part of a snapshot id
        let arabic_indic = "20240102T030405.\u{0661}\u{0662}Z-abc.json";
        assert_eq!(parse_cache_date(arabic_indic), None);
        assert_eq!(format_cache_date_time(arabic_indic), "Unknown date");
    }

    #[test]
    fn test_display_format() {
        let datetime = Utc.with_ymd_and_hms(2024, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(display(datetime), "Jan 2, 2024, 3:04:05 PM");
        assert_eq!(format_date_time("yesterday"), "(unknown)");
        assert_ne!(format_date_time("2024-01-02T15:04:05Z"), "(unknown)");
    }

    #[test]
    fn test_format_field_path() {
        assert_eq!(format_field_path("masterdata.smda.field"), "masterdata > smda > field");
        assert_eq!(format_field_path("name"), "name");
    }

    #[test]
    fn test_format_inline_value() {
        assert_eq!(format_inline_value(None), "(missing)");
        assert_eq!(format_inline_value(Some(&Value::Null)), "null");
        assert_eq!(format_inline_value(Some(&json!(""))), "(empty string)");
        assert_eq!(format_inline_value(Some(&json!("drogon"))), "drogon");
        assert_eq!(format_inline_value(Some(&json!(1.5))), "1.5");
        assert_eq!(format_inline_value(Some(&json!(false))), "false");
        assert_eq!(format_inline_value(Some(&json!([]))), "(empty list)");
        assert_eq!(format_inline_value(Some(&json!([1, 2]))), "2 values");
        assert_eq!(
            format_inline_value(Some(&json!({"uuid": "u-1", "name": "Viking"}))),
            "name: Viking"
        );
        assert_eq!(format_inline_value(Some(&json!({"a": 1, "b": 2}))), "(2 fields)");
    }

    #[test]
    fn test_list_item_key() {
        let item = |v: Value| v.as_object().cloned().unwrap();
        assert_eq!(
            list_item_key(&item(json!({"name": "x", "identifier": "TopVolantis"}))),
            "identifier-TopVolantis"
        );
        assert_eq!(list_item_key(&item(json!({"a": 1, "b": ""}))), "a:1|b:(empty string)");
        assert_eq!(list_item_key(&Map::new()), "empty-item");
    }

    #[test]
    fn test_scalar_diff_kind() {
        assert_eq!(scalar_diff_kind(&scalar(None, Some(json!(1)))), DiffKind::Added);
        assert_eq!(scalar_diff_kind(&scalar(Some(Value::Null), Some(json!(1)))), DiffKind::Added);
        assert_eq!(scalar_diff_kind(&scalar(Some(json!(1)), None)), DiffKind::Removed);
        assert_eq!(scalar_diff_kind(&scalar(Some(json!(1)), Some(json!(2)))), DiffKind::Updated);
        assert_eq!(scalar_diff_kind(&scalar(None, Some(Value::Null))), DiffKind::Updated);
    }

    #[test]
    fn test_snapshot_label() {
        assert_eq!(snapshot_label(0), "Snapshot 1");
        assert_eq!(snapshot_label(9), "Snapshot 10");
    }
}
