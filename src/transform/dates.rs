//! Date normalization
//!
//! The v2 API answers with RFC 2822 dates (`Mon, 31 Dec 2018 23:59:35 +0000`)
//! on most resources and `2019-01-01 00:00:10 +0000` on a few others. Both
//! are rewritten to `2018-12-31T23:59:35.000000Z`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

/// Output format for every normalized date
pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Offset-carrying formats besides RFC 2822 / RFC 3339
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%dT%H:%M:%S%z"];

/// Naive formats, read as UTC
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse any date-time text the API (or a config file) is known to produce
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Format a timestamp in the canonical output format
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format(CANONICAL_DATETIME_FORMAT).to_string()
}

/// Rewrite the values of `date_fields` keys, at any depth
///
/// Empty, non-string and unparseable values are kept as they are.
pub fn normalize_dates(row: &Value, date_fields: &[&str]) -> Value {
    if date_fields.is_empty() {
        return row.clone();
    }
    normalize_node(row, date_fields)
}

fn normalize_node(value: &Value, date_fields: &[&str]) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                let child = if child.is_string() && date_fields.contains(&key.as_str()) {
                    normalize_value(child)
                } else {
                    normalize_node(child, date_fields)
                };
                out.insert(key.clone(), child);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| normalize_node(item, date_fields))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn normalize_value(value: &Value) -> Value {
    value
        .as_str()
        .and_then(parse_datetime)
        .map_or_else(|| value.clone(), |dt| Value::String(format_datetime(dt)))
}
