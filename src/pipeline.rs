//! Snapshot Pipeline
//!
//! Drives the four stages over a set of raw records:
//!
//! ```text
//!  CostRecord* ──group by (resource, day)──► ResourcePerDay
//!                                                │
//!                              canonicalize tags │ derive fingerprints
//!                                                ▼
//!                                         ResourceSnapshot
//! ```
//!
//! Groups are independent, so they run in parallel; outputs keep the
//! stable group order (sorted by resource id and day), which makes a rerun
//! over identical input byte-identical. Row-local failures follow the
//! configured [`FailurePolicy`]; a cost-sum overflow is always fatal
//! because it means the input broke the upstream decimal contract.

use crate::aggregate::{aggregate_group, group_by_resource_day, AggregateError, AggregateOutcome};
use crate::fingerprint::{derive_fingerprints, HashAlgorithm};
use crate::records::{CostRecord, PartitionKey, ResourceSnapshot};
use crate::snapshot::{project_snapshot, DateConstructionError};
use crate::store::{SnapshotStore, StoreError};
use crate::tags::canonicalize_tags;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// How row-local failures propagate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Skip the failing row, count it, keep going.
    #[default]
    Lenient,
    /// First row failure aborts the run.
    Strict,
}

/// Pipeline configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineConfig {
    pub failure_policy: FailurePolicy,
    pub hash_algorithm: HashAlgorithm,
}

/// Per-run counters, merged across partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub partitions_processed: u64,
    pub records_read: u64,
    pub groups_aggregated: u64,
    pub snapshots_written: u64,
    pub tag_parse_failures: u64,
    pub metadata_disagreements: u64,
    pub date_errors: u64,
}

impl RunReport {
    /// Fold another report's counters into this one.
    /// `partitions_processed` is owned by the run driver and not merged.
    pub fn merge(&mut self, other: &RunReport) {
        self.records_read += other.records_read;
        self.groups_aggregated += other.groups_aggregated;
        self.snapshots_written += other.snapshots_written;
        self.tag_parse_failures += other.tag_parse_failures;
        self.metadata_disagreements += other.metadata_disagreements;
        self.date_errors += other.date_errors;
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partitions={} records={} groups={} snapshots={} tag_parse_failures={} metadata_disagreements={} date_errors={}",
            self.partitions_processed,
            self.records_read,
            self.groups_aggregated,
            self.snapshots_written,
            self.tag_parse_failures,
            self.metadata_disagreements,
            self.date_errors,
        )
    }
}

/// Snapshots plus the counters for one [`process_records`] call.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub snapshots: Vec<ResourceSnapshot>,
    pub report: RunReport,
}

/// Errors aborting a [`process_records`] call.
#[derive(Debug, Clone)]
pub enum PipelineError {
    Aggregate(AggregateError),
    Date(DateConstructionError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate(e) => write!(f, "aggregation failed: {}", e),
            Self::Date(e) => write!(f, "snapshot date construction failed: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<AggregateError> for PipelineError {
    fn from(e: AggregateError) -> Self {
        Self::Aggregate(e)
    }
}

/// Errors aborting a store-backed run.
#[derive(Debug)]
pub enum RunError {
    Store(StoreError),
    Pipeline(PipelineError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {}", e),
            Self::Pipeline(e) => write!(f, "pipeline error: {}", e),
        }
    }
}

impl std::error::Error for RunError {}

impl From<StoreError> for RunError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<PipelineError> for RunError {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

struct GroupOutcome {
    snapshot: Option<ResourceSnapshot>,
    tag_parse_failed: bool,
    metadata_disagreement: bool,
    date_error: bool,
}

fn process_group(
    group: &[CostRecord],
    config: &PipelineConfig,
) -> Result<GroupOutcome, PipelineError> {
    let AggregateOutcome {
        row,
        metadata_disagreement,
    } = aggregate_group(group)?;

    let tags = canonicalize_tags(&row.tags);
    let fingerprints = derive_fingerprints(&row, &tags.normalized, config.hash_algorithm);

    match project_snapshot(row, tags.normalized, fingerprints) {
        Ok(snapshot) => Ok(GroupOutcome {
            snapshot: Some(snapshot),
            tag_parse_failed: tags.parse_failed,
            metadata_disagreement,
            date_error: false,
        }),
        Err(e) => match config.failure_policy {
            FailurePolicy::Strict => Err(PipelineError::Date(e)),
            FailurePolicy::Lenient => {
                warn!(error = %e, "skipping row with invalid partition date");
                Ok(GroupOutcome {
                    snapshot: None,
                    tag_parse_failed: tags.parse_failed,
                    metadata_disagreement,
                    date_error: true,
                })
            }
        },
    }
}

/// Run all four stages over a record set (typically one partition's rows;
/// any mix groups correctly since rows carry their own partition key).
pub fn process_records(
    records: Vec<CostRecord>,
    config: &PipelineConfig,
) -> Result<ProcessOutput, PipelineError> {
    let records_read = records.len() as u64;
    let groups: Vec<Vec<CostRecord>> = group_by_resource_day(records).into_values().collect();

    let outcomes: Vec<GroupOutcome> = groups
        .par_iter()
        .map(|group| process_group(group, config))
        .collect::<Result<_, _>>()?;

    let mut report = RunReport {
        records_read,
        groups_aggregated: outcomes.len() as u64,
        ..RunReport::default()
    };
    let mut snapshots = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        if outcome.tag_parse_failed {
            report.tag_parse_failures += 1;
        }
        if outcome.metadata_disagreement {
            report.metadata_disagreements += 1;
        }
        if outcome.date_error {
            report.date_errors += 1;
        }
        if let Some(snapshot) = outcome.snapshot {
            snapshots.push(snapshot);
        }
    }
    report.snapshots_written = snapshots.len() as u64;

    Ok(ProcessOutput { snapshots, report })
}

/// Process partitions end to end against a store: read each partition's
/// records, run the stages, and replace that partition's snapshots in one
/// transaction. Empty partitions are skipped and logged, not counted.
pub fn run_partitions(
    store: &SnapshotStore,
    partitions: &[PartitionKey],
    config: &PipelineConfig,
) -> Result<RunReport, RunError> {
    let mut report = RunReport::default();
    for &partition in partitions {
        let records = store.read_cost_records(partition)?;
        if records.is_empty() {
            debug!(%partition, "no cost records for partition");
            continue;
        }
        let output = process_records(records, config)?;
        store.replace_snapshots(partition, &output.snapshots)?;
        report.merge(&output.report);
        report.partitions_processed += 1;
        info!(
            %partition,
            snapshots = output.snapshots.len(),
            date_errors = output.report.date_errors,
            "partition processed"
        );
    }
    info!(%report, "run complete");
    Ok(report)
}

// =============================================================================
// TESTS
// =============================================================================
