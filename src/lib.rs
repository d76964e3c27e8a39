//! FOCUS Resource Snapshot Engine
//!
//! Turns raw per-day cloud cost records (FOCUS-style columns) into one
//! deterministic state snapshot per resource per day, fingerprinted for
//! cheap change detection downstream.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         run_partitions                          │
//! │  (reads a partition, drives the stages, replaces its snapshots) │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!          ┌─────────────────────┼─────────────────────┐
//!          ▼                     ▼                     ▼
//! ┌──────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │ aggregate    │     │ tags             │     │ fingerprint  │
//! │ (group, sum, │────▶│ (canonical       │────▶│ (state_hash, │
//! │  representa- │     │  key=value;...)  │     │  full_state) │
//! │  tive pick)  │     └──────────────────┘     └──────┬───────┘
//! └──────────────┘                                     │
//!                                                      ▼
//!                                              ┌──────────────┐
//!                                              │ snapshot     │
//!                                              │ (calendar-   │
//!                                              │  date check) │
//!                                              └──────────────┘
//! ```
//!
//! # Determinism Guarantees
//!
//! - **Representative pick**: smallest metadata tuple wins, never input order
//! - **Tags**: set semantics, byte-ordered `(key, value)` rendering
//! - **Costs**: fixed-point decimal, no float summation
//! - **Output**: snapshots sorted by `(resource_id, day)`, reruns byte-identical

pub mod aggregate;
pub mod cost;
pub mod fingerprint;
pub mod pipeline;
pub mod records;
pub mod snapshot;
pub mod store;
pub mod tags;

#[cfg(test)]
mod canonicalize_tests;

// Re-exports for convenience
pub use aggregate::{
    aggregate_group, extract_resource_group, group_by_resource_day, AggregateError,
    AggregateOutcome,
};
pub use cost::{CostAmount, CostParseError, COST_FRACTIONAL_DIGITS, COST_SCALE};
pub use fingerprint::{
    derive_fingerprints, full_state_hash, state_hash, Fingerprints, HashAlgorithm,
    FIELD_DELIMITER,
};
pub use pipeline::{
    process_records, run_partitions, FailurePolicy, PipelineConfig, PipelineError,
    ProcessOutput, RunError, RunReport,
};
pub use records::{CostRecord, PartitionKey, ResourcePerDay, ResourceSnapshot};
pub use snapshot::{project_snapshot, DateConstructionError};
pub use store::{DriftSummary, PartitionSummary, SnapshotStore, StoreError};
pub use tags::{canonicalize_tags, CanonicalTags};
