//! Partitioned Cost Storage
//!
//! SQLite-backed storage for raw cost records and derived snapshots,
//! both partitioned by calendar day. Snapshot writes replace the whole
//! partition in one transaction so reruns never duplicate rows.
//!
//! # Schema Design
//!
//! ```sql
//! -- Raw input rows, many per resource per day
//! CREATE TABLE cost_records (
//!     resource_id TEXT NOT NULL,
//!     -- ... metadata columns ...
//!     tags TEXT,                    -- raw tag JSON, NULL when absent
//!     effective_cost TEXT NOT NULL, -- canonical decimal string
//!     year INTEGER NOT NULL,
//!     month INTEGER NOT NULL,
//!     day INTEGER NOT NULL
//! );
//!
//! -- One row per resource per day, replaced atomically per partition
//! CREATE TABLE resource_snapshots (
//!     resource_id TEXT NOT NULL,
//!     snapshot_date TEXT NOT NULL,  -- YYYY-MM-DD
//!     -- ... metadata, tags, hashes ...
//!     PRIMARY KEY (resource_id, snapshot_date)
//! ) WITHOUT ROWID;
//! ```

use crate::cost::CostAmount;
use crate::records::{CostRecord, PartitionKey, ResourceSnapshot};
use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Schema version for migrations.
/// Version history:
/// - v1: Initial schema
const SCHEMA_VERSION: u32 = 1;

/// Storage for cost records and resource snapshots.
pub struct SnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SnapshotStore {
    /// Open (or create) a store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        // Enable WAL mode for better concurrency
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        // Check schema version
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: Option<u32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match current_version {
            None => {
                self.create_schema_v1(&conn)?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    [SCHEMA_VERSION],
                )?;
                info!("Created snapshot store schema v{}", SCHEMA_VERSION);
            }
            Some(v) if v == SCHEMA_VERSION => {
                debug!("Snapshot store schema at v{}", SCHEMA_VERSION);
            }
            Some(v) => {
                warn!(
                    "Snapshot store schema version mismatch: expected {}, got {}",
                    SCHEMA_VERSION, v
                );
            }
        }

        Ok(())
    }

    fn create_schema_v1(&self, conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cost_records (
                resource_id TEXT NOT NULL,
                resource_group TEXT,
                resource_name TEXT,
                resource_type TEXT,
                region_id TEXT,
                region_name TEXT,
                sub_account_id TEXT,
                sub_account_name TEXT,
                billing_account_id TEXT,
                billing_account_name TEXT,
                provider_name TEXT,
                tags TEXT,
                effective_cost TEXT NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                day INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cost_records_partition
                ON cost_records(year, month, day);

            CREATE TABLE IF NOT EXISTS resource_snapshots (
                resource_id TEXT NOT NULL,
                snapshot_date TEXT NOT NULL,
                resource_group TEXT,
                resource_name TEXT,
                resource_type TEXT,
                region_id TEXT,
                region_name TEXT,
                sub_account_id TEXT,
                sub_account_name TEXT,
                billing_account_id TEXT,
                billing_account_name TEXT,
                provider_name TEXT,
                tags TEXT,
                normalized_tags_string TEXT NOT NULL,
                total_effective_cost TEXT NOT NULL,
                state_hash TEXT NOT NULL,
                full_state_hash TEXT NOT NULL,
                PRIMARY KEY (resource_id, snapshot_date)
            ) WITHOUT ROWID;

            CREATE INDEX IF NOT EXISTS idx_snapshots_date
                ON resource_snapshots(snapshot_date);

            CREATE INDEX IF NOT EXISTS idx_snapshots_full_state
                ON resource_snapshots(full_state_hash);
        "#,
        )?;

        Ok(())
    }

    /// Append raw cost records in one transaction. Returns the row count.
    pub fn insert_cost_records(&self, records: &[CostRecord]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r#"INSERT INTO cost_records (
                    resource_id, resource_group, resource_name, resource_type,
                    region_id, region_name, sub_account_id, sub_account_name,
                    billing_account_id, billing_account_name, provider_name,
                    tags, effective_cost, year, month, day
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )?;
            for record in records {
                stmt.execute(params![
                    record.resource_id,
                    record.resource_group,
                    record.resource_name,
                    record.resource_type,
                    record.region_id,
                    record.region_name,
                    record.sub_account_id,
                    record.sub_account_name,
                    record.billing_account_id,
                    record.billing_account_name,
                    record.provider_name,
                    tags_to_column(&record.tags)?,
                    record.effective_cost.to_string(),
                    record.year,
                    record.month,
                    record.day,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Inserted {} cost records", records.len());
        Ok(records.len())
    }

    /// Read every raw record in one partition, ordered by resource id.
    pub fn read_cost_records(&self, partition: PartitionKey) -> Result<Vec<CostRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            r#"SELECT resource_id, resource_group, resource_name, resource_type,
                      region_id, region_name, sub_account_id, sub_account_name,
                      billing_account_id, billing_account_name, provider_name,
                      tags, effective_cost, year, month, day
               FROM cost_records
               WHERE year = ? AND month = ? AND day = ?
               ORDER BY resource_id"#,
        )?;
        let rows = stmt.query_map(
            params![partition.year, partition.month, partition.day],
            |row| {
                Ok(RecordRow {
                    resource_id: row.get(0)?,
                    resource_group: row.get(1)?,
                    resource_name: row.get(2)?,
                    resource_type: row.get(3)?,
                    region_id: row.get(4)?,
                    region_name: row.get(5)?,
                    sub_account_id: row.get(6)?,
                    sub_account_name: row.get(7)?,
                    billing_account_id: row.get(8)?,
                    billing_account_name: row.get(9)?,
                    provider_name: row.get(10)?,
                    tags: row.get(11)?,
                    effective_cost: row.get(12)?,
                    year: row.get(13)?,
                    month: row.get(14)?,
                    day: row.get(15)?,
                })
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.decode()?);
        }
        Ok(records)
    }

    /// Distinct partitions present in `cost_records`, chronological.
    pub fn list_partitions(&self) -> Result<Vec<PartitionKey>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT year, month, day FROM cost_records ORDER BY year, month, day",
        )?;
        let keys = stmt
            .query_map([], |row| {
                Ok(PartitionKey::new(row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Replace one partition's snapshots: delete the old rows and insert the
    /// new set in a single transaction. Every snapshot must carry the
    /// partition's date.
    pub fn replace_snapshots(
        &self,
        partition: PartitionKey,
        snapshots: &[ResourceSnapshot],
    ) -> Result<(), StoreError> {
        for snapshot in snapshots {
            if PartitionKey::from_date(snapshot.snapshot_date) != partition {
                return Err(StoreError::PartitionMismatch {
                    expected: partition,
                    found: snapshot.snapshot_date,
                });
            }
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM resource_snapshots WHERE snapshot_date = ?",
            [partition.to_string()],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                r#"INSERT INTO resource_snapshots (
                    resource_id, snapshot_date, resource_group, resource_name,
                    resource_type, region_id, region_name, sub_account_id,
                    sub_account_name, billing_account_id, billing_account_name,
                    provider_name, tags, normalized_tags_string,
                    total_effective_cost, state_hash, full_state_hash
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )?;
            for snapshot in snapshots {
                stmt.execute(params![
                    snapshot.resource_id,
                    snapshot.snapshot_date.to_string(),
                    snapshot.resource_group,
                    snapshot.resource_name,
                    snapshot.resource_type,
                    snapshot.region_id,
                    snapshot.region_name,
                    snapshot.sub_account_id,
                    snapshot.sub_account_name,
                    snapshot.billing_account_id,
                    snapshot.billing_account_name,
                    snapshot.provider_name,
                    tags_to_column(&snapshot.tags)?,
                    snapshot.normalized_tags_string,
                    snapshot.total_effective_cost.to_string(),
                    snapshot.state_hash,
                    snapshot.full_state_hash,
                ])?;
            }
        }
        tx.commit()?;
        debug!(
            %partition,
            count = snapshots.len(),
            "replaced partition snapshots"
        );
        Ok(())
    }

    /// Read one partition's snapshots, ordered by resource id.
    pub fn read_snapshots(
        &self,
        partition: PartitionKey,
    ) -> Result<Vec<ResourceSnapshot>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            r#"SELECT resource_id, snapshot_date, resource_group, resource_name,
                      resource_type, region_id, region_name, sub_account_id,
                      sub_account_name, billing_account_id, billing_account_name,
                      provider_name, tags, normalized_tags_string,
                      total_effective_cost, state_hash, full_state_hash
               FROM resource_snapshots
               WHERE snapshot_date = ?
               ORDER BY resource_id"#,
        )?;
        let rows = stmt.query_map([partition.to_string()], |row| {
            Ok(SnapshotRow {
                resource_id: row.get(0)?,
                snapshot_date: row.get(1)?,
                resource_group: row.get(2)?,
                resource_name: row.get(3)?,
                resource_type: row.get(4)?,
                region_id: row.get(5)?,
                region_name: row.get(6)?,
                sub_account_id: row.get(7)?,
                sub_account_name: row.get(8)?,
                billing_account_id: row.get(9)?,
                billing_account_name: row.get(10)?,
                provider_name: row.get(11)?,
                tags: row.get(12)?,
                normalized_tags_string: row.get(13)?,
                total_effective_cost: row.get(14)?,
                state_hash: row.get(15)?,
                full_state_hash: row.get(16)?,
            })
        })?;

        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?.decode()?);
        }
        Ok(snapshots)
    }

    /// Compare two snapshot partitions by resource id: how many resources
    /// changed state, appeared, or disappeared between them.
    pub fn drift_between(
        &self,
        prev: PartitionKey,
        next: PartitionKey,
    ) -> Result<DriftSummary, StoreError> {
        let conn = self.conn.lock();
        let changed: i64 = conn.query_row(
            r#"SELECT COUNT(*)
               FROM resource_snapshots a
               JOIN resource_snapshots b ON b.resource_id = a.resource_id
               WHERE a.snapshot_date = ?1 AND b.snapshot_date = ?2
                 AND a.state_hash <> b.state_hash"#,
            params![prev.to_string(), next.to_string()],
            |row| row.get(0),
        )?;
        let added: i64 = conn.query_row(
            r#"SELECT COUNT(*)
               FROM resource_snapshots b
               WHERE b.snapshot_date = ?2
                 AND NOT EXISTS (
                     SELECT 1 FROM resource_snapshots a
                     WHERE a.snapshot_date = ?1 AND a.resource_id = b.resource_id
                 )"#,
            params![prev.to_string(), next.to_string()],
            |row| row.get(0),
        )?;
        let removed: i64 = conn.query_row(
            r#"SELECT COUNT(*)
               FROM resource_snapshots a
               WHERE a.snapshot_date = ?1
                 AND NOT EXISTS (
                     SELECT 1 FROM resource_snapshots b
                     WHERE b.snapshot_date = ?2 AND b.resource_id = a.resource_id
                 )"#,
            params![prev.to_string(), next.to_string()],
            |row| row.get(0),
        )?;
        Ok(DriftSummary {
            changed: changed as u64,
            added: added as u64,
            removed: removed as u64,
        })
    }

    /// Per-partition row counts across both tables, chronological.
    pub fn partition_summaries(&self) -> Result<Vec<PartitionSummary>, StoreError> {
        let conn = self.conn.lock();
        let mut map: BTreeMap<PartitionKey, (u64, u64)> = BTreeMap::new();

        {
            let mut stmt = conn.prepare_cached(
                "SELECT year, month, day, COUNT(*) FROM cost_records GROUP BY year, month, day",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    PartitionKey::new(row.get(0)?, row.get(1)?, row.get(2)?),
                    row.get::<_, i64>(3)?,
                ))
            })?;
            for row in rows {
                let (key, count) = row?;
                map.entry(key).or_default().0 = count as u64;
            }
        }

        {
            let mut stmt = conn.prepare_cached(
                "SELECT snapshot_date, COUNT(*) FROM resource_snapshots GROUP BY snapshot_date",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (date, count) = row?;
                let key = date
                    .parse::<PartitionKey>()
                    .map_err(|e| StoreError::InvalidRow(format!("bad snapshot_date {:?}: {}", date, e)))?;
                map.entry(key).or_default().1 = count as u64;
            }
        }

        Ok(map
            .into_iter()
            .map(|(partition, (cost_records, snapshots))| PartitionSummary {
                partition,
                cost_records,
                snapshots,
            })
            .collect())
    }
}

/// Row counts for one partition, from both tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSummary {
    pub partition: PartitionKey,
    pub cost_records: u64,
    pub snapshots: u64,
}

/// State drift between two snapshot partitions, keyed by resource id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftSummary {
    /// Resources present on both days whose `state_hash` moved.
    pub changed: u64,
    /// Resources present on the later day only.
    pub added: u64,
    /// Resources present on the earlier day only.
    pub removed: u64,
}

fn tags_to_column(tags: &Value) -> Result<Option<String>, StoreError> {
    if tags.is_null() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(tags)?))
    }
}

fn tags_from_column(text: Option<String>) -> Result<Value, StoreError> {
    match text {
        None => Ok(Value::Null),
        Some(text) => Ok(serde_json::from_str(&text)?),
    }
}

fn cost_from_column(text: &str) -> Result<CostAmount, StoreError> {
    text.parse()
        .map_err(|e| StoreError::InvalidRow(format!("bad stored cost {:?}: {}", text, e)))
}

fn date_from_column(text: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| StoreError::InvalidRow(format!("bad snapshot_date {:?}: {}", text, e)))
}

struct RecordRow {
    resource_id: String,
    resource_group: Option<String>,
    resource_name: Option<String>,
    resource_type: Option<String>,
    region_id: Option<String>,
    region_name: Option<String>,
    sub_account_id: Option<String>,
    sub_account_name: Option<String>,
    billing_account_id: Option<String>,
    billing_account_name: Option<String>,
    provider_name: Option<String>,
    tags: Option<String>,
    effective_cost: String,
    year: i32,
    month: u32,
    day: u32,
}

impl RecordRow {
    fn decode(self) -> Result<CostRecord, StoreError> {
        Ok(CostRecord {
            resource_id: self.resource_id,
            resource_group: self.resource_group,
            resource_name: self.resource_name,
            resource_type: self.resource_type,
            region_id: self.region_id,
            region_name: self.region_name,
            sub_account_id: self.sub_account_id,
            sub_account_name: self.sub_account_name,
            billing_account_id: self.billing_account_id,
            billing_account_name: self.billing_account_name,
            provider_name: self.provider_name,
            tags: tags_from_column(self.tags)?,
            effective_cost: cost_from_column(&self.effective_cost)?,
            year: self.year,
            month: self.month,
            day: self.day,
        })
    }
}

struct SnapshotRow {
    resource_id: String,
    snapshot_date: String,
    resource_group: Option<String>,
    resource_name: Option<String>,
    resource_type: Option<String>,
    region_id: Option<String>,
    region_name: Option<String>,
    sub_account_id: Option<String>,
    sub_account_name: Option<String>,
    billing_account_id: Option<String>,
    billing_account_name: Option<String>,
    provider_name: Option<String>,
    tags: Option<String>,
    normalized_tags_string: String,
    total_effective_cost: String,
    state_hash: String,
    full_state_hash: String,
}

impl SnapshotRow {
    fn decode(self) -> Result<ResourceSnapshot, StoreError> {
        Ok(ResourceSnapshot {
            snapshot_date: date_from_column(&self.snapshot_date)?,
            resource_id: self.resource_id,
            resource_group: self.resource_group,
            resource_name: self.resource_name,
            resource_type: self.resource_type,
            region_id: self.region_id,
            region_name: self.region_name,
            sub_account_id: self.sub_account_id,
            sub_account_name: self.sub_account_name,
            billing_account_id: self.billing_account_id,
            billing_account_name: self.billing_account_name,
            provider_name: self.provider_name,
            tags: tags_from_column(self.tags)?,
            normalized_tags_string: self.normalized_tags_string,
            total_effective_cost: cost_from_column(&self.total_effective_cost)?,
            state_hash: self.state_hash,
            full_state_hash: self.full_state_hash,
        })
    }
}

/// Errors from the snapshot store.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Serialization(serde_json::Error),
    InvalidRow(String),
    PartitionMismatch {
        expected: PartitionKey,
        found: NaiveDate,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "SQLite error: {}", e),
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
            Self::InvalidRow(e) => write!(f, "Invalid stored row: {}", e),
            Self::PartitionMismatch { expected, found } => write!(
                f,
                "Snapshot dated {} does not belong to partition {}",
                found, expected
            ),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}

// =============================================================================
// TESTS
// =============================================================================
