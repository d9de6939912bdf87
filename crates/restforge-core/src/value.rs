// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Helpers over `serde_json::Value`, the common currency of records,
//! payloads and filter operands.
//!
//! Every stored value is a JSON value. Timestamps are stored as RFC 3339
//! strings in UTC with microsecond precision, so the helpers here know how to
//! compare two strings that both parse as instants.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::Value;

/// Condition value that stands for the empty string.
///
/// Empty strings are dropped from filter conditions; clients send this
/// sentinel when they really mean `""`.
pub const EMPTY_SENTINEL: &str = "$empty";

/// Whether a filter operand counts as "not supplied".
///
/// `null`, `""`, `[]` and `{}` are blank. `0` and `false` are not.
#[must_use]
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false
    }
}

/// Parse a timestamp in RFC 3339 or a naive ISO form (interpreted as UTC).
#[must_use]
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Parse a calendar date in `YYYY-MM-DD` form.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Canonical storage form of a timestamp.
#[must_use]
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time in canonical storage form.
#[must_use]
pub fn now() -> Value {
    Value::String(format_datetime(Utc::now()))
}

/// Drop sub-millisecond precision.
///
/// Clients usually round-trip timestamps through millisecond clocks, so
/// watermarks are compared at that resolution.
#[must_use]
pub fn truncate_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(3)
}

/// Read a value as a timestamp, accepting strings and unix seconds.
#[must_use]
pub fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_datetime(s),
        Value::Number(n) => {
            let secs = n.as_f64()?;
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
            DateTime::from_timestamp(whole, nanos)
        }
        _ => None
    }
}

/// Key used to index rows by primary key.
///
/// Numbers and numeric strings share a key, so the path segment `"7"`
/// addresses the row whose id is `7`.
#[must_use]
pub fn id_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string()
    }
}

/// Human-facing rendering: strings without quotes, everything else as JSON.
#[must_use]
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string()
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None
    }
}

/// Order two scalar values the way a database column would.
///
/// Returns `None` when the values are not comparable (e.g. an object against
/// a number, or anything against `null`).
#[must_use]
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(a), Value::String(b)) => {
            if let (Some(da), Some(db)) = (parse_datetime(a), parse_datetime(b)) {
                return Some(da.cmp(&db));
            }
            Some(a.cmp(b))
        }
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            let (a, b) = (as_number(left)?, as_number(right)?);
            a.partial_cmp(&b)
        }
        _ => None
    }
}

/// Equality with numeric and timestamp coercion.
#[must_use]
pub fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equals(x, y))
        }
        (Value::Object(_), _) | (_, Value::Object(_)) => left == right,
        _ => compare(left, right) == Some(Ordering::Equal)
    }
}

/// Total order used for sorting rows: nulls first, then [`compare`], then
/// the JSON text as a tie breaker for incomparable values.
#[must_use]
pub fn sort_order(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => compare(left, right).unwrap_or_else(|| left.to_string().cmp(&right.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn blank_values() {
        assert!(is_blank(&json!(null)));
        assert!(is_blank(&json!("")));
        assert!(is_blank(&json!([])));
        assert!(is_blank(&json!({})));
        assert!(!is_blank(&json!(0)));
        assert!(!is_blank(&json!(false)));
        assert!(!is_blank(&json!(EMPTY_SENTINEL)));
    }

    #[test]
    fn numeric_strings_compare_with_numbers() {
        assert!(equals(&json!(7), &json!("7")));
        assert!(equals(&json!(7), &json!(7.0)));
        assert_eq!(compare(&json!(2), &json!(10)), Some(Ordering::Less));
        assert!(!equals(&json!(null), &json!(0)));
    }

    #[test]
    fn timestamps_compare_as_instants() {
        let a = json!("2024-01-01T00:00:00Z");
        let b = json!("2024-01-01T00:00:00.000000Z");
        assert!(equals(&a, &b));
        let c = json!("2024-01-01T01:00:00+02:00");
        assert_eq!(compare(&c, &a), Some(Ordering::Less));
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let dt = parse_datetime("2024-05-06 07:08:09").unwrap();
        assert_eq!(format_datetime(dt), "2024-05-06T07:08:09.000000Z");
    }

    #[test]
    fn truncation_drops_micros() {
        let dt = parse_datetime("2024-05-06T07:08:09.123456Z").unwrap();
        assert_eq!(format_datetime(truncate_millis(dt)), "2024-05-06T07:08:09.123000Z");
    }

    #[test]
    fn id_keys_unify_numbers_and_strings() {
        assert_eq!(id_key(&json!(3)), id_key(&json!("3")));
    }

    #[test]
    fn sort_puts_nulls_first() {
        let mut values = vec![json!(3), json!(null), json!(1)];
        values.sort_by(sort_order);
        assert_eq!(values, vec![json!(null), json!(1), json!(3)]);
    }
}
