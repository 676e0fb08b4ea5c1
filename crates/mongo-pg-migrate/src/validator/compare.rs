//! Type-aware value comparison for the content-equality layer.
//!
//! The source and target serialize the same logical value differently:
//! timestamps differ in offset notation and sub-second precision, numbers
//! in integer/float representation, payload arrays sometimes in element
//! order. Comparison is by declared field kind, not by raw JSON equality.

use crate::plan::FieldKind;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Timestamps within this many seconds count as equal (precision loss in
/// the target's storage granularity).
const TIMESTAMP_TOLERANCE_SECS: i64 = 1;

/// Whether `expected` (re-transformed from the source) and `actual` (read
/// back from the target) represent the same value for a field of `kind`.
pub fn values_match(kind: FieldKind, expected: &Value, actual: &Value) -> bool {
    if expected.is_null() || actual.is_null() {
        return expected.is_null() && actual.is_null();
    }
    match kind {
        FieldKind::Timestamp => timestamps_match(expected, actual),
        FieldKind::Number => numbers_match(expected, actual),
        FieldKind::Uuid => uuids_match(expected, actual),
        FieldKind::Payload => payloads_match(expected, actual),
        FieldKind::Text | FieldKind::Enum { .. } => expected == actual,
        FieldKind::Boolean => expected.as_bool() == actual.as_bool(),
    }
}

fn parse_ts(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn timestamps_match(expected: &Value, actual: &Value) -> bool {
    match (parse_ts(expected), parse_ts(actual)) {
        (Some(a), Some(b)) => (a - b).num_seconds().abs() <= TIMESTAMP_TOLERANCE_SECS,
        _ => false,
    }
}

fn numbers_match(expected: &Value, actual: &Value) -> bool {
    match (expected.as_f64(), actual.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0),
        _ => false,
    }
}

fn uuids_match(expected: &Value, actual: &Value) -> bool {
    match (expected.as_str(), actual.as_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// Deep equality, except top-level arrays compare as multisets: the target
/// does not guarantee element order for stored JSON arrays.
fn payloads_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return false;
            }
            let mut remaining: Vec<&Value> = b.iter().collect();
            for item in a {
                match remaining.iter().position(|candidate| *candidate == item) {
                    Some(i) => {
                        remaining.swap_remove(i);
                    }
                    None => return false,
                }
            }
            true
        }
        _ => expected == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamps_tolerate_offset_notation_and_subseconds() {
        assert!(values_match(
            FieldKind::Timestamp,
            &json!("2024-03-01T12:00:00.000Z"),
            &json!("2024-03-01T12:00:00+00:00"),
        ));
        assert!(values_match(
            FieldKind::Timestamp,
            &json!("2024-03-01T12:00:00.900Z"),
            &json!("2024-03-01T12:00:00Z"),
        ));
        assert!(!values_match(
            FieldKind::Timestamp,
            &json!("2024-03-01T12:00:00Z"),
            &json!("2024-03-01T12:00:05Z"),
        ));
    }

    #[test]
    fn test_numbers_compare_across_representations() {
        assert!(values_match(FieldKind::Number, &json!(1), &json!(1.0)));
        assert!(values_match(FieldKind::Number, &json!(0), &json!(0.0)));
        assert!(!values_match(FieldKind::Number, &json!(1), &json!(2)));
        assert!(!values_match(FieldKind::Number, &json!(1), &json!("1")));
    }

    #[test]
    fn test_uuids_ignore_case() {
        let id = uuid::Uuid::new_v4().to_string();
        assert!(values_match(
            FieldKind::Uuid,
            &json!(id),
            &json!(id.to_uppercase()),
        ));
    }

    #[test]
    fn test_payload_arrays_ignore_order_but_not_multiplicity() {
        assert!(values_match(
            FieldKind::Payload,
            &json!(["a", "b", "b"]),
            &json!(["b", "a", "b"]),
        ));
        assert!(!values_match(
            FieldKind::Payload,
            &json!(["a", "b", "b"]),
            &json!(["a", "a", "b"]),
        ));
        // Nested structures still compare deeply.
        assert!(values_match(
            FieldKind::Payload,
            &json!({"tiers": [{"min": 1}]}),
            &json!({"tiers": [{"min": 1}]}),
        ));
    }

    #[test]
    fn test_null_only_matches_null() {
        assert!(values_match(FieldKind::Text, &Value::Null, &Value::Null));
        assert!(!values_match(FieldKind::Text, &Value::Null, &json!("x")));
        assert!(!values_match(FieldKind::Timestamp, &json!("2024-03-01T12:00:00Z"), &Value::Null));
    }
}
