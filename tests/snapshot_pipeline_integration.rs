//! Integration tests for the snapshot pipeline
//!
//! These tests drive the full path a `snapshot_run` invocation takes:
//! JSONL records are parsed with their FOCUS column names, inserted into a
//! file-backed store, processed into snapshots, and read back for
//! verification. Reruns must leave the store byte-identical.

use chrono::NaiveDate;
use focus_drift::{
    run_partitions, CostRecord, FailurePolicy, HashAlgorithm, PartitionKey, PipelineConfig,
    RunError, SnapshotStore,
};

fn sample_jsonl() -> Vec<String> {
    vec![
        // vm-1 has two charge lines on day 1 and one on day 2, stable tags.
        r#"{"ResourceId": "/subscriptions/s1/resourceGroups/Team-A/providers/vm-1",
            "ResourceName": "vm-1", "ResourceType": "vm", "RegionId": "eu-west-1",
            "SubAccountId": "sub-1", "BillingAccountName": "acme", "ProviderName": "azure",
            "Tags": [{"Key": "env", "Value": "prod"}, {"Key": "team", "Value": "ops"}],
            "EffectiveCost": "0.1", "year": 2025, "month": 6, "day": 1}"#,
        r#"{"ResourceId": "/subscriptions/s1/resourceGroups/Team-A/providers/vm-1",
            "ResourceName": "vm-1", "ResourceType": "vm", "RegionId": "eu-west-1",
            "SubAccountId": "sub-1", "BillingAccountName": "acme", "ProviderName": "azure",
            "Tags": {"team": "ops", "env": "prod"},
            "EffectiveCost": "0.2", "year": 2025, "month": 6, "day": 1}"#,
        r#"{"ResourceId": "/subscriptions/s1/resourceGroups/Team-A/providers/vm-1",
            "ResourceName": "vm-1", "ResourceType": "vm", "RegionId": "eu-west-1",
            "SubAccountId": "sub-1", "BillingAccountName": "acme", "ProviderName": "azure",
            "Tags": [{"Key": "env", "Value": "prod"}, {"Key": "team", "Value": "ops"}],
            "EffectiveCost": "0.5", "year": 2025, "month": 6, "day": 2}"#,
        // disk-1 changes its env tag between day 1 and day 2.
        r#"{"ResourceId": "disk-1", "ResourceName": "disk-1", "ResourceType": "disk",
            "RegionId": "eu-west-1", "Tags": {"env": "staging"},
            "EffectiveCost": 3, "year": 2025, "month": 6, "day": 1}"#,
        r#"{"ResourceId": "disk-1", "ResourceName": "disk-1", "ResourceType": "disk",
            "RegionId": "eu-west-1", "Tags": {"env": "prod"},
            "EffectiveCost": 3, "year": 2025, "month": 6, "day": 2}"#,
    ]
    .into_iter()
    .map(|s| s.to_string())
    .collect()
}

fn parse_records(lines: &[String]) -> Vec<CostRecord> {
    lines
        .iter()
        .map(|line| serde_json::from_str(line).expect("fixture line must parse"))
        .collect()
}

fn store_at(dir: &tempfile::TempDir) -> SnapshotStore {
    SnapshotStore::new(dir.path().join("snapshots.db")).expect("store must open")
}

fn run_all(store: &SnapshotStore, config: &PipelineConfig) -> focus_drift::RunReport {
    let partitions = store.list_partitions().unwrap();
    run_partitions(store, &partitions, config).unwrap()
}

#[test]
fn test_end_to_end_import_run_verify() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);

    store.insert_cost_records(&parse_records(&sample_jsonl())).unwrap();
    let report = run_all(&store, &PipelineConfig::default());

    assert_eq!(report.partitions_processed, 2);
    assert_eq!(report.records_read, 5);
    assert_eq!(report.groups_aggregated, 4);
    assert_eq!(report.snapshots_written, 4);
    assert_eq!(report.tag_parse_failures, 0);
    assert_eq!(report.date_errors, 0);

    let day1 = store.read_snapshots(PartitionKey::new(2025, 6, 1)).unwrap();
    assert_eq!(day1.len(), 2);

    // Byte-ordered by resource id: the "/subscriptions/..." path sorts
    // before "disk-1".
    let vm = &day1[0];
    let disk = &day1[1];
    assert!(vm.resource_id.ends_with("vm-1"));
    assert_eq!(disk.resource_id, "disk-1");

    // Two charge lines summed without float error.
    assert_eq!(vm.total_effective_cost, "0.3".parse().unwrap());
    assert_eq!(vm.normalized_tags_string, "env=prod;team=ops");
    assert_eq!(
        vm.snapshot_date,
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    );

    // Resource group comes from the id path, original casing kept.
    assert_eq!(vm.resource_group.as_deref(), Some("Team-A"));
    assert_eq!(disk.resource_group, None);

    // Default digest is MD5: 32 lowercase hex chars.
    for snapshot in &day1 {
        assert_eq!(snapshot.state_hash.len(), 32);
        assert_eq!(snapshot.full_state_hash.len(), 32);
        assert!(snapshot.state_hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

#[test]
fn test_reprocessing_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);
    store.insert_cost_records(&parse_records(&sample_jsonl())).unwrap();

    let first = run_all(&store, &PipelineConfig::default());
    let day1_first = store.read_snapshots(PartitionKey::new(2025, 6, 1)).unwrap();

    let second = run_all(&store, &PipelineConfig::default());
    let day1_second = store.read_snapshots(PartitionKey::new(2025, 6, 1)).unwrap();

    assert_eq!(first.snapshots_written, second.snapshots_written);
    assert_eq!(day1_first.len(), day1_second.len());
    for (a, b) in day1_first.iter().zip(day1_second.iter()) {
        assert_eq!(a.resource_id, b.resource_id);
        assert_eq!(a.state_hash, b.state_hash);
        assert_eq!(a.full_state_hash, b.full_state_hash);
        assert_eq!(a.total_effective_cost, b.total_effective_cost);
    }
}

#[test]
fn test_state_change_is_visible_across_days() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);
    store.insert_cost_records(&parse_records(&sample_jsonl())).unwrap();
    run_all(&store, &PipelineConfig::default());

    let day1 = store.read_snapshots(PartitionKey::new(2025, 6, 1)).unwrap();
    let day2 = store.read_snapshots(PartitionKey::new(2025, 6, 2)).unwrap();

    let disk1 = day1.iter().find(|s| s.resource_id == "disk-1").unwrap();
    let disk2 = day2.iter().find(|s| s.resource_id == "disk-1").unwrap();
    let vm1 = day1.iter().find(|s| s.resource_id.ends_with("vm-1")).unwrap();
    let vm2 = day2.iter().find(|s| s.resource_id.ends_with("vm-1")).unwrap();

    // disk-1 retagged between the two days.
    assert_eq!(disk1.normalized_tags_string, "env=staging");
    assert_eq!(disk2.normalized_tags_string, "env=prod");
    assert_ne!(disk1.state_hash, disk2.state_hash);

    // vm-1 unchanged: same hashes even though its daily cost moved.
    assert_ne!(vm1.total_effective_cost, vm2.total_effective_cost);
    assert_eq!(vm1.state_hash, vm2.state_hash);
    assert_eq!(vm1.full_state_hash, vm2.full_state_hash);

    // The store-level drift view agrees: one changed resource, none
    // appeared or disappeared.
    let drift = store
        .drift_between(PartitionKey::new(2025, 6, 1), PartitionKey::new(2025, 6, 2))
        .unwrap();
    assert_eq!(drift.changed, 1);
    assert_eq!(drift.added, 0);
    assert_eq!(drift.removed, 0);
}

#[test]
fn test_sha256_round_trips_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);
    store.insert_cost_records(&parse_records(&sample_jsonl())).unwrap();

    let config = PipelineConfig {
        hash_algorithm: HashAlgorithm::Sha256,
        ..PipelineConfig::default()
    };
    run_all(&store, &config);

    let day1 = store.read_snapshots(PartitionKey::new(2025, 6, 1)).unwrap();
    for snapshot in &day1 {
        assert_eq!(snapshot.state_hash.len(), 64);
        assert_eq!(snapshot.full_state_hash.len(), 64);
    }
}

#[test]
fn test_strict_mode_aborts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);

    let lines = vec![
        // Feb 30 does not exist; it sorts before the valid June partition.
        r#"{"ResourceId": "ghost", "EffectiveCost": "1",
            "year": 2025, "month": 2, "day": 30}"#
            .to_string(),
        r#"{"ResourceId": "real", "EffectiveCost": "1",
            "year": 2025, "month": 6, "day": 1}"#
            .to_string(),
    ];
    store.insert_cost_records(&parse_records(&lines)).unwrap();

    let partitions = store.list_partitions().unwrap();
    assert_eq!(partitions[0], PartitionKey::new(2025, 2, 30));

    let strict = PipelineConfig {
        failure_policy: FailurePolicy::Strict,
        ..PipelineConfig::default()
    };
    let err = run_partitions(&store, &partitions, &strict).unwrap_err();
    assert!(matches!(err, RunError::Pipeline(_)));

    // The run stopped on the first partition; nothing was written anywhere.
    assert!(store.read_snapshots(PartitionKey::new(2025, 6, 1)).unwrap().is_empty());

    // A lenient pass skips the impossible date and finishes the rest.
    let report = run_partitions(&store, &partitions, &PipelineConfig::default()).unwrap();
    assert_eq!(report.date_errors, 1);
    let june = store.read_snapshots(PartitionKey::new(2025, 6, 1)).unwrap();
    assert_eq!(june.len(), 1);
    assert_eq!(june[0].resource_id, "real");
}

#[test]
fn test_identical_configs_cluster_across_resources() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);

    // Two resources, same metadata and tags, different ids and costs.
    let lines = vec![
        r#"{"ResourceId": "vm-a", "ResourceName": "worker", "ResourceType": "vm",
            "RegionId": "eu-west-1", "SubAccountId": "sub-1",
            "BillingAccountName": "acme", "Tags": {"env": "prod"},
            "EffectiveCost": "1", "year": 2025, "month": 6, "day": 1}"#
            .to_string(),
        r#"{"ResourceId": "vm-b", "ResourceName": "worker", "ResourceType": "vm",
            "RegionId": "eu-west-1", "SubAccountId": "sub-1",
            "BillingAccountName": "acme", "Tags": {"env": "prod"},
            "EffectiveCost": "2", "year": 2025, "month": 6, "day": 1}"#
            .to_string(),
    ];
    store.insert_cost_records(&parse_records(&lines)).unwrap();
    run_all(&store, &PipelineConfig::default());

    let day1 = store.read_snapshots(PartitionKey::new(2025, 6, 1)).unwrap();
    assert_eq!(day1.len(), 2);
    assert_ne!(day1[0].state_hash, day1[1].state_hash);
    assert_eq!(day1[0].full_state_hash, day1[1].full_state_hash);
}
