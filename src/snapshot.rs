//! Snapshot Projection
//!
//! Final stage: rebuild the calendar date from the partition components and
//! assemble the row handed to downstream sinks. Strictly 1:1 with its
//! input; the only way a row fails is an invalid `(year, month, day)`
//! triple, which surfaces as [`DateConstructionError`] instead of being
//! clamped. A silently shifted snapshot date would break SCD continuity
//! downstream.

use crate::fingerprint::Fingerprints;
use crate::records::{PartitionKey, ResourcePerDay, ResourceSnapshot};
use chrono::NaiveDate;
use std::fmt;

/// Partition components that do not form a real calendar date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateConstructionError {
    pub resource_id: String,
    pub partition: PartitionKey,
}

impl fmt::Display for DateConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partition {} is not a valid calendar date (resource {:?})",
            self.partition, self.resource_id
        )
    }
}

impl std::error::Error for DateConstructionError {}

/// Project one aggregated row into its final snapshot.
pub fn project_snapshot(
    row: ResourcePerDay,
    normalized_tags: String,
    fingerprints: Fingerprints,
) -> Result<ResourceSnapshot, DateConstructionError> {
    let snapshot_date = NaiveDate::from_ymd_opt(row.year, row.month, row.day).ok_or_else(|| {
        DateConstructionError {
            resource_id: row.resource_id.clone(),
            partition: row.partition_key(),
        }
    })?;

    Ok(ResourceSnapshot {
        snapshot_date,
        resource_id: row.resource_id,
        resource_group: row.resource_group,
        resource_name: row.resource_name,
        resource_type: row.resource_type,
        region_id: row.region_id,
        region_name: row.region_name,
        sub_account_id: row.sub_account_id,
        sub_account_name: row.sub_account_name,
        billing_account_id: row.billing_account_id,
        billing_account_name: row.billing_account_name,
        provider_name: row.provider_name,
        tags: row.tags,
        normalized_tags_string: normalized_tags,
        total_effective_cost: row.total_effective_cost,
        state_hash: fingerprints.state_hash,
        full_state_hash: fingerprints.full_state_hash,
    })
}

// =============================================================================
// TESTS
// =============================================================================
