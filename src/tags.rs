//! Tag Canonicalization
//!
//! Collapses a semi-structured, possibly-null, possibly-reordered tag
//! collection into one deterministic string per (resource, day). Two
//! collections that are set-equal as `(key, value)` pairs after dropping
//! null-keyed entries render byte-identically, whatever their original
//! order or duplication.
//!
//! Accepted shapes: a JSON array of `{"Key": .., "Value": ..}` objects
//! (member names matched case-insensitively), a JSON object treated as a
//! map, or a JSON string containing either. A string reading `null` in
//! any case counts as absent. Anything else present but unparseable is
//! recovered as an empty set and flagged, never an error.
//!
//! Rendering is `key=value` joined with `;`. Keys or values containing
//! `=` or `;` therefore render ambiguously (two different sets can
//! collide). Accepted limitation: no escaping, downstream consumers treat
//! fingerprints as content hashes, not parseable encodings.

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::warn;

/// Outcome of canonicalizing one tag collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTags {
    /// Sorted `key=value;...` rendering; empty string for an empty set.
    pub normalized: String,
    /// Tags were present but not parseable; recovered as an empty set.
    pub parse_failed: bool,
}

/// Canonicalize a tag collection. Pure and total over all inputs.
///
/// Null-keyed pairs are dropped; null values render as the empty string.
/// Pairs sort by `(key, value)` in byte order (key primary), and equal
/// pairs collapse to one occurrence.
pub fn canonicalize_tags(tags: &Value) -> CanonicalTags {
    let mut parse_failed = false;

    let pairs = match tags {
        Value::Null => BTreeSet::new(),
        Value::String(s) if s.trim().is_empty() => BTreeSet::new(),
        // CSV-derived exports render absent tags as a literal null string.
        Value::String(s) if s.trim().eq_ignore_ascii_case("null") => BTreeSet::new(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(inner) => pairs_from_structure(&inner).unwrap_or_else(|| {
                parse_failed = true;
                BTreeSet::new()
            }),
            Err(_) => {
                parse_failed = true;
                BTreeSet::new()
            }
        },
        other => pairs_from_structure(other).unwrap_or_else(|| {
            parse_failed = true;
            BTreeSet::new()
        }),
    };

    if parse_failed {
        warn!(tags = %truncate_for_log(tags), "unparseable tags field, treating as empty set");
    }

    let normalized = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(";");

    CanonicalTags {
        normalized,
        parse_failed,
    }
}

/// Extract `(key, value)` pairs from an already-parsed JSON structure.
/// `None` when the top-level shape is not a tag collection at all.
fn pairs_from_structure(value: &Value) -> Option<BTreeSet<(String, String)>> {
    match value {
        Value::Array(items) => {
            let mut pairs = BTreeSet::new();
            for item in items {
                let Value::Object(map) = item else {
                    // Element without key/value members; same as a null key.
                    continue;
                };
                let Some(key) = member_str(map, "key") else {
                    continue;
                };
                let val = member_value(map, "value");
                pairs.insert((key.to_string(), val));
            }
            Some(pairs)
        }
        Value::Object(map) => Some(
            map.iter()
                .map(|(k, v)| (k.clone(), coerce_value(v)))
                .collect(),
        ),
        _ => None,
    }
}

/// Case-insensitive member lookup returning a string payload, or `None`
/// for absent, null, or non-string members.
fn member_str<'a>(map: &'a serde_json::Map<String, Value>, name: &str) -> Option<&'a str> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.as_str())
}

fn member_value(map: &serde_json::Map<String, Value>, name: &str) -> String {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| coerce_value(v))
        .unwrap_or_default()
}

/// Null → empty string; strings pass through; scalar/nested values fall
/// back to their compact JSON text.
fn coerce_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_for_log(tags: &Value) -> String {
    let s = tags.to_string();
    if s.chars().count() > 120 {
        let mut out: String = s.chars().take(120).collect();
        out.push('…');
        out
    } else {
        s
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalized(tags: Value) -> String {
        canonicalize_tags(&tags).normalized
    }

    #[test]
    fn test_array_shape() {
        let tags = json!([
            {"Key": "env", "Value": "prod"},
            {"Key": "team", "Value": "ops"}
        ]);
        assert_eq!(normalized(tags), "env=prod;team=ops");
    }

    #[test]
    fn test_map_shape() {
        assert_eq!(
            normalized(json!({"env": "prod", "team": "ops"})),
            "env=prod;team=ops"
        );
    }

    #[test]
    fn test_string_encoded_json() {
        let tags = json!(r#"[{"Key": "env", "Value": "prod"}]"#);
        assert_eq!(normalized(tags), "env=prod");
        let map = json!(r#"{"env": "prod"}"#);
        assert_eq!(normalized(map), "env=prod");
    }

    #[test]
    fn test_null_value_renders_empty() {
        assert_eq!(normalized(json!([{"Key": "env", "Value": null}])), "env=");
        assert_eq!(normalized(json!([{"Key": "env"}])), "env=");
    }

    #[test]
    fn test_null_key_dropped() {
        let tags = json!([
            {"Key": null, "Value": "x"},
            {"Key": "a", "Value": "1"},
            {"Value": "orphan"}
        ]);
        assert_eq!(normalized(tags), "a=1");
    }

    #[test]
    fn test_member_names_case_insensitive() {
        let tags = json!([
            {"key": "a", "value": "1"},
            {"KEY": "b", "VALUE": "2"}
        ]);
        assert_eq!(normalized(tags), "a=1;b=2");
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(normalized(Value::Null), "");
        assert_eq!(normalized(json!([])), "");
        assert_eq!(normalized(json!({})), "");
        assert_eq!(normalized(json!("")), "");
        // None of these count as parse failures.
        assert!(!canonicalize_tags(&Value::Null).parse_failed);
        assert!(!canonicalize_tags(&json!("")).parse_failed);
    }

    #[test]
    fn test_stringified_null_is_absent() {
        // CSV-derived exports carry absent tags as the string "null".
        for tags in [json!("null"), json!("NULL"), json!(" Null ")] {
            let out = canonicalize_tags(&tags);
            assert_eq!(out.normalized, "", "input: {}", tags);
            assert!(!out.parse_failed, "input: {}", tags);
        }
    }

    #[test]
    fn test_unparseable_flagged_and_recovered() {
        for tags in [json!("not a json"), json!(42), json!(true), json!("{\"k\": ")] {
            let out = canonicalize_tags(&tags);
            assert_eq!(out.normalized, "", "input: {}", tags);
            assert!(out.parse_failed, "input: {}", tags);
        }
    }

    #[test]
    fn test_equal_pairs_collapse() {
        let tags = json!([
            {"Key": "a", "Value": "1"},
            {"Key": "a", "Value": "1"}
        ]);
        assert_eq!(normalized(tags), "a=1");
    }

    #[test]
    fn test_same_key_distinct_values_both_kept() {
        let tags = json!([
            {"Key": "a", "Value": "2"},
            {"Key": "a", "Value": "1"}
        ]);
        assert_eq!(normalized(tags), "a=1;a=2");
    }

    #[test]
    fn test_sort_is_byte_order_not_locale() {
        // Uppercase sorts before lowercase in byte order.
        let tags = json!({"apple": "1", "Zebra": "2"});
        assert_eq!(normalized(tags), "Zebra=2;apple=1");
    }

    #[test]
    fn test_non_string_values_coerced() {
        let tags = json!({"count": 3, "enabled": true});
        assert_eq!(normalized(tags), "count=3;enabled=true");
    }
}
