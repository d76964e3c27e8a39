//! Daily Resource Aggregator
//!
//! Collapses the cost line items sharing one `(resource_id, year, month,
//! day)` key into a single row: summed cost, one representative copy of the
//! slowly-varying metadata, and the raw tags carried forward.
//!
//! Representative selection is deterministic: the record whose metadata
//! tuple sorts lexicographically smallest wins. Metadata is expected to be
//! invariant within a group; when it is not, the group is flagged so the
//! run report can surface the disagreement as a data-quality signal.

use crate::cost::CostAmount;
use crate::records::{CostRecord, PartitionKey, ResourcePerDay};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Marker preceding the resource-group segment in hierarchical resource ids
/// (`…/resourceGroups/<name>/…`), matched case-insensitively.
const RESOURCE_GROUP_MARKER: &str = "resourcegroups/";

/// Derive the resource group from a hierarchical resource id: the path
/// segment following the marker, original casing preserved. `None` when the
/// id carries no marker or the segment is empty.
pub fn extract_resource_group(resource_id: &str) -> Option<String> {
    let lower = resource_id.to_ascii_lowercase();
    let start = lower.find(RESOURCE_GROUP_MARKER)? + RESOURCE_GROUP_MARKER.len();
    let rest = &resource_id[start..];
    let segment = match rest.find('/') {
        Some(end) => &rest[..end],
        None => rest,
    };
    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}

/// Stable comparison key over the slowly-varying metadata fields.
/// Tags and cost deliberately excluded: representative choice must not
/// depend on them.
type MetadataKey<'a> = (
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
);

fn metadata_key(record: &CostRecord) -> MetadataKey<'_> {
    (
        record.resource_name.as_deref(),
        record.resource_type.as_deref(),
        record.region_id.as_deref(),
        record.region_name.as_deref(),
        record.sub_account_id.as_deref(),
        record.sub_account_name.as_deref(),
        record.billing_account_id.as_deref(),
        record.billing_account_name.as_deref(),
        record.provider_name.as_deref(),
    )
}

/// Outcome of aggregating one resource/day group.
#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    pub row: ResourcePerDay,
    /// True when records in the group disagreed on metadata fields.
    pub metadata_disagreement: bool,
}

/// Errors from group aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    EmptyGroup,
    CostOverflow {
        resource_id: String,
        partition: PartitionKey,
    },
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyGroup => write!(f, "cannot aggregate an empty record group"),
            Self::CostOverflow {
                resource_id,
                partition,
            } => write!(
                f,
                "cost sum overflow for resource {:?} on {}",
                resource_id, partition
            ),
        }
    }
}

impl std::error::Error for AggregateError {}

/// Partition records into per-resource/day groups. BTreeMap keeps the
/// iteration order stable across runs.
pub fn group_by_resource_day(
    records: Vec<CostRecord>,
) -> BTreeMap<(String, PartitionKey), Vec<CostRecord>> {
    let mut groups: BTreeMap<(String, PartitionKey), Vec<CostRecord>> = BTreeMap::new();
    for record in records {
        let key = (record.resource_id.clone(), record.partition_key());
        groups.entry(key).or_default().push(record);
    }
    groups
}

/// Collapse one group (all records sharing a resource/day key) into a
/// single [`ResourcePerDay`].
pub fn aggregate_group(records: &[CostRecord]) -> Result<AggregateOutcome, AggregateError> {
    let mut total = CostAmount::ZERO;
    for record in records {
        total = total
            .checked_add(record.effective_cost)
            .ok_or_else(|| AggregateError::CostOverflow {
                resource_id: records[0].resource_id.clone(),
                partition: records[0].partition_key(),
            })?;
    }

    let representative = records
        .iter()
        .min_by(|a, b| metadata_key(a).cmp(&metadata_key(b)))
        .ok_or(AggregateError::EmptyGroup)?;

    let reference = metadata_key(representative);
    let metadata_disagreement = records.iter().any(|r| metadata_key(r) != reference);
    if metadata_disagreement {
        warn!(
            resource_id = %representative.resource_id,
            partition = %representative.partition_key(),
            records = records.len(),
            "metadata fields disagree within resource/day group"
        );
    }

    Ok(AggregateOutcome {
        row: ResourcePerDay {
            resource_id: representative.resource_id.clone(),
            resource_group: extract_resource_group(&representative.resource_id),
            resource_name: representative.resource_name.clone(),
            resource_type: representative.resource_type.clone(),
            region_id: representative.region_id.clone(),
            region_name: representative.region_name.clone(),
            sub_account_id: representative.sub_account_id.clone(),
            sub_account_name: representative.sub_account_name.clone(),
            billing_account_id: representative.billing_account_id.clone(),
            billing_account_name: representative.billing_account_name.clone(),
            provider_name: representative.provider_name.clone(),
            tags: representative.tags.clone(),
            total_effective_cost: total,
            record_count: records.len() as u64,
            year: representative.year,
            month: representative.month,
            day: representative.day,
        },
        metadata_disagreement,
    })
}

// =============================================================================
// TESTS
// =============================================================================
