//! Tag Canonicalization Property Tests
//!
//! These tests verify the canonical tag string contract:
//! 1. Order independence: any input ordering → identical canonical string
//! 2. Shape equivalence: array / map / string-encoded forms → identical output
//! 3. Null handling: null values render as bare `key=`, null keys vanish
//! 4. Set semantics: duplicate pairs collapse, distinct values under one key survive
//! 5. Recovery: unparseable payloads degrade to the empty set, never abort

use crate::cost::CostAmount;
use crate::fingerprint::{derive_fingerprints, HashAlgorithm};
use crate::records::ResourcePerDay;
use crate::tags::canonicalize_tags;
use serde_json::{json, Value};

fn make_row(tags: Value) -> ResourcePerDay {
    ResourcePerDay {
        resource_id: "res-1".to_string(),
        resource_group: None,
        resource_name: Some("vm-a".to_string()),
        resource_type: Some("vm".to_string()),
        region_id: Some("eu-west-1".to_string()),
        region_name: None,
        sub_account_id: Some("sub-1".to_string()),
        sub_account_name: None,
        billing_account_id: None,
        billing_account_name: Some("acme".to_string()),
        provider_name: None,
        tags,
        total_effective_cost: CostAmount::ZERO,
        record_count: 1,
        year: 2025,
        month: 6,
        day: 1,
    }
}

// =============================================================================
// TEST 1: ORDER INDEPENDENCE - Any input ordering yields one canonical string
// =============================================================================

#[test]
fn test_array_order_does_not_matter() {
    let permutations = [
        json!([
            {"Key": "env", "Value": "prod"},
            {"Key": "team", "Value": "ops"},
            {"Key": "app", "Value": "billing"},
        ]),
        json!([
            {"Key": "team", "Value": "ops"},
            {"Key": "app", "Value": "billing"},
            {"Key": "env", "Value": "prod"},
        ]),
        json!([
            {"Key": "app", "Value": "billing"},
            {"Key": "env", "Value": "prod"},
            {"Key": "team", "Value": "ops"},
        ]),
    ];

    for perm in &permutations {
        let tags = canonicalize_tags(perm);
        assert_eq!(
            tags.normalized, "app=billing;env=prod;team=ops",
            "every permutation must canonicalize identically"
        );
        assert!(!tags.parse_failed);
    }
}

#[test]
fn test_map_key_order_does_not_matter() {
    // Parse from text so the input key order is actually exercised.
    let a: Value = serde_json::from_str(r#"{"env": "prod", "team": "ops"}"#).unwrap();
    let b: Value = serde_json::from_str(r#"{"team": "ops", "env": "prod"}"#).unwrap();

    assert_eq!(
        canonicalize_tags(&a).normalized,
        canonicalize_tags(&b).normalized
    );
    assert_eq!(canonicalize_tags(&a).normalized, "env=prod;team=ops");
}

#[test]
fn test_string_encoded_order_does_not_matter() {
    let a = json!(r#"[{"Key": "b", "Value": "2"}, {"Key": "a", "Value": "1"}]"#);
    let b = json!(r#"[{"Key": "a", "Value": "1"}, {"Key": "b", "Value": "2"}]"#);

    assert_eq!(canonicalize_tags(&a).normalized, "a=1;b=2");
    assert_eq!(canonicalize_tags(&b).normalized, "a=1;b=2");
}

#[test]
fn test_sort_is_byte_order_not_locale() {
    // Uppercase sorts before lowercase in byte order.
    let tags = json!({"apple": "1", "Zebra": "2"});
    assert_eq!(canonicalize_tags(&tags).normalized, "Zebra=2;apple=1");
}

// =============================================================================
// TEST 2: SHAPE EQUIVALENCE - Same pairs in any accepted shape agree
// =============================================================================

#[test]
fn test_all_shapes_canonicalize_identically() {
    let as_array = json!([
        {"Key": "env", "Value": "prod"},
        {"Key": "team", "Value": "ops"},
    ]);
    let as_map = json!({"env": "prod", "team": "ops"});
    let as_string = json!(r#"{"team": "ops", "env": "prod"}"#);

    let expected = "env=prod;team=ops";
    assert_eq!(canonicalize_tags(&as_array).normalized, expected);
    assert_eq!(canonicalize_tags(&as_map).normalized, expected);
    assert_eq!(canonicalize_tags(&as_string).normalized, expected);
}

#[test]
fn test_equivalent_shapes_produce_identical_fingerprints() {
    let row_array = make_row(json!([{"Key": "env", "Value": "prod"}]));
    let row_map = make_row(json!({"env": "prod"}));

    let tags_array = canonicalize_tags(&row_array.tags);
    let tags_map = canonicalize_tags(&row_map.tags);
    let fp_array = derive_fingerprints(&row_array, &tags_array.normalized, HashAlgorithm::Md5);
    let fp_map = derive_fingerprints(&row_map, &tags_map.normalized, HashAlgorithm::Md5);

    assert_eq!(fp_array.state_hash, fp_map.state_hash);
    assert_eq!(fp_array.full_state_hash, fp_map.full_state_hash);
}

// =============================================================================
// TEST 3: NULL HANDLING - Null values render bare, null keys vanish
// =============================================================================

#[test]
fn test_null_value_renders_bare_key() {
    let tags = json!([{"Key": "env", "Value": null}]);
    assert_eq!(canonicalize_tags(&tags).normalized, "env=");
}

#[test]
fn test_null_key_pair_is_dropped() {
    let tags = json!([
        {"Key": null, "Value": "orphan"},
        {"Key": "env", "Value": "prod"},
    ]);
    let result = canonicalize_tags(&tags);
    assert_eq!(result.normalized, "env=prod");
    assert!(!result.parse_failed, "null keys are data, not parse failures");
}

#[test]
fn test_all_pairs_null_keyed_yields_empty() {
    let tags = json!([{"Key": null, "Value": "a"}, {"Key": null, "Value": "b"}]);
    let result = canonicalize_tags(&tags);
    assert_eq!(result.normalized, "");
    assert!(!result.parse_failed);
}

// =============================================================================
// TEST 4: SET SEMANTICS - Duplicates collapse, distinct values survive
// =============================================================================

#[test]
fn test_duplicate_pairs_collapse_to_one() {
    let tags = json!([
        {"Key": "env", "Value": "prod"},
        {"Key": "env", "Value": "prod"},
        {"Key": "env", "Value": "prod"},
    ]);
    assert_eq!(canonicalize_tags(&tags).normalized, "env=prod");
}

#[test]
fn test_distinct_values_under_one_key_both_survive() {
    let tags = json!([
        {"Key": "env", "Value": "staging"},
        {"Key": "env", "Value": "prod"},
    ]);
    assert_eq!(canonicalize_tags(&tags).normalized, "env=prod;env=staging");
}

#[test]
fn test_duplicate_collapse_keeps_hashes_stable() {
    let once = make_row(json!([{"Key": "env", "Value": "prod"}]));
    let thrice = make_row(json!([
        {"Key": "env", "Value": "prod"},
        {"Key": "env", "Value": "prod"},
        {"Key": "env", "Value": "prod"},
    ]));

    let tags_once = canonicalize_tags(&once.tags);
    let tags_thrice = canonicalize_tags(&thrice.tags);
    let fp_once = derive_fingerprints(&once, &tags_once.normalized, HashAlgorithm::Md5);
    let fp_thrice = derive_fingerprints(&thrice, &tags_thrice.normalized, HashAlgorithm::Md5);

    assert_eq!(fp_once.state_hash, fp_thrice.state_hash);
}

// =============================================================================
// TEST 5: RECOVERY - Unparseable payloads degrade, never abort
// =============================================================================

#[test]
fn test_unparseable_string_recovers_to_empty_set() {
    let tags = json!("{{{{not json");
    let result = canonicalize_tags(&tags);
    assert_eq!(result.normalized, "");
    assert!(result.parse_failed);
}

#[test]
fn test_scalar_payload_recovers_to_empty_set() {
    for tags in [json!(42), json!(true), json!(1.5)] {
        let result = canonicalize_tags(&tags);
        assert_eq!(result.normalized, "");
        assert!(result.parse_failed, "scalar {:?} should count as a parse failure", tags);
    }
}

#[test]
fn test_recovered_row_matches_untagged_row() {
    // A row whose tags failed to parse fingerprints exactly like a row with
    // no tags at all; downstream sees one consistent state.
    let broken = make_row(json!("%%%"));
    let untagged = make_row(Value::Null);

    let tags_broken = canonicalize_tags(&broken.tags);
    let tags_untagged = canonicalize_tags(&untagged.tags);
    assert!(tags_broken.parse_failed);
    assert!(!tags_untagged.parse_failed);

    let fp_broken = derive_fingerprints(&broken, &tags_broken.normalized, HashAlgorithm::Md5);
    let fp_untagged =
        derive_fingerprints(&untagged, &tags_untagged.normalized, HashAlgorithm::Md5);
    assert_eq!(fp_broken.state_hash, fp_untagged.state_hash);
    assert_eq!(fp_broken.full_state_hash, fp_untagged.full_state_hash);
}
