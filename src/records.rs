//! FOCUS Record Model
//!
//! Row types flowing through the engine: raw cost line items, the per-day
//! aggregate, and the final snapshot row handed to downstream sinks.
//! Raw records accept both snake_case and FOCUS PascalCase column names.

use crate::cost::CostAmount;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Partition key components carried by every raw record.
///
/// Plain integers, deliberately not a calendar date: invalid triples exist
/// in real partitions and must survive until the projector rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl PartitionKey {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        PartitionKey { year, month, day }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        use chrono::Datelike;
        PartitionKey {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for PartitionKey {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(PartitionKey::from_date)
    }
}

/// Raw cost line item, one per resource per charge line per day.
/// Multiple records may share the same `(resource_id, year, month, day)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    #[serde(default, alias = "ResourceId")]
    pub resource_id: String,
    /// Raw column as delivered by the feed. The aggregator derives the
    /// effective resource group from `resource_id` instead (see
    /// `aggregate::extract_resource_group`).
    #[serde(default, alias = "ResourceGroup")]
    pub resource_group: Option<String>,
    #[serde(default, alias = "ResourceName")]
    pub resource_name: Option<String>,
    #[serde(default, alias = "ResourceType")]
    pub resource_type: Option<String>,
    #[serde(default, alias = "RegionId")]
    pub region_id: Option<String>,
    #[serde(default, alias = "RegionName")]
    pub region_name: Option<String>,
    #[serde(default, alias = "SubAccountId")]
    pub sub_account_id: Option<String>,
    #[serde(default, alias = "SubAccountName")]
    pub sub_account_name: Option<String>,
    #[serde(default, alias = "BillingAccountId")]
    pub billing_account_id: Option<String>,
    #[serde(default, alias = "BillingAccountName")]
    pub billing_account_name: Option<String>,
    #[serde(default, alias = "ProviderName")]
    pub provider_name: Option<String>,
    /// Semi-structured tag collection; shape validated by the canonicalizer,
    /// not here.
    #[serde(default, alias = "Tags")]
    pub tags: Value,
    #[serde(default, alias = "EffectiveCost")]
    pub effective_cost: CostAmount,
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl CostRecord {
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.year, self.month, self.day)
    }
}

/// One row per resource per day: representative metadata plus the summed
/// cost over every line item in the group.
#[derive(Debug, Clone, Serialize)]
pub struct ResourcePerDay {
    pub resource_id: String,
    /// Derived from `resource_id` (path segment after `resourcegroups/`),
    /// absent when the id carries no such marker.
    pub resource_group: Option<String>,
    pub resource_name: Option<String>,
    pub resource_type: Option<String>,
    pub region_id: Option<String>,
    pub region_name: Option<String>,
    pub sub_account_id: Option<String>,
    pub sub_account_name: Option<String>,
    pub billing_account_id: Option<String>,
    pub billing_account_name: Option<String>,
    pub provider_name: Option<String>,
    pub tags: Value,
    pub total_effective_cost: CostAmount,
    /// Line items collapsed into this row.
    pub record_count: u64,
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl ResourcePerDay {
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.year, self.month, self.day)
    }
}

/// Final per-day snapshot row consumed by SCD/knowledge-graph sinks.
/// Keyed downstream by `(resource_id, snapshot_date)`; `full_state_hash`
/// alone keys cross-resource clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub snapshot_date: NaiveDate,
    pub resource_id: String,
    pub resource_group: Option<String>,
    pub resource_name: Option<String>,
    pub resource_type: Option<String>,
    pub region_id: Option<String>,
    pub region_name: Option<String>,
    pub sub_account_id: Option<String>,
    pub sub_account_name: Option<String>,
    pub billing_account_id: Option<String>,
    pub billing_account_name: Option<String>,
    pub provider_name: Option<String>,
    /// Raw tags, passed through untouched.
    pub tags: Value,
    pub normalized_tags_string: String,
    pub total_effective_cost: CostAmount,
    pub state_hash: String,
    pub full_state_hash: String,
}

// =============================================================================
// TESTS
// =============================================================================
