//! Snapshot Runner CLI
//!
//! Entrypoint for importing raw FOCUS cost records, running the daily
//! snapshot pipeline over stored partitions, and inspecting the store.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin snapshot_run -- import --db costs.db --input records.jsonl
//! cargo run --bin snapshot_run -- run --db costs.db --from 2025-06-01 --to 2025-06-30
//! cargo run --bin snapshot_run -- run --db costs.db --date 2025-06-01 --strict
//! cargo run --bin snapshot_run -- inspect --db costs.db
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 2: Configuration or validation error
//! - 3: Runtime error (database, I/O, pipeline abort)

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use focus_drift::{
    run_partitions, CostRecord, FailurePolicy, HashAlgorithm, PartitionKey, PipelineConfig,
    RunReport, SnapshotStore,
};
use std::fs;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// FOCUS resource snapshot runner
#[derive(Parser, Debug)]
#[command(name = "snapshot_run")]
#[command(about = "Build per-day resource state snapshots from FOCUS cost records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import cost records from a JSONL file into the store
    Import {
        /// Path to the SQLite store
        #[arg(short, long, env = "SNAPSHOT_DB")]
        db: PathBuf,

        /// Input file, one cost record JSON object per line
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Run the snapshot pipeline over stored partitions
    Run {
        /// Path to the SQLite store
        #[arg(short, long, env = "SNAPSHOT_DB")]
        db: PathBuf,

        /// Single partition date (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["from", "to"])]
        date: Option<PartitionKey>,

        /// First partition of a range, inclusive (YYYY-MM-DD)
        #[arg(long, requires = "to")]
        from: Option<PartitionKey>,

        /// Last partition of a range, inclusive (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<PartitionKey>,

        /// Abort on the first row-local failure instead of skipping
        #[arg(long)]
        strict: bool,

        /// Fingerprint digest: md5 or sha256
        #[arg(long, default_value = "md5")]
        hash_algorithm: HashAlgorithm,

        /// Write the run report as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show per-partition row counts and day-over-day state drift
    Inspect {
        /// Path to the SQLite store
        #[arg(short, long, env = "SNAPSHOT_DB")]
        db: PathBuf,
    },
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("focus_drift=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Import { db, input } => {
            if let Err(e) = cmd_import(&db, &input) {
                eprintln!("Error: {:#}", e);
                std::process::exit(3);
            }
        }
        Commands::Run {
            db,
            date,
            from,
            to,
            strict,
            hash_algorithm,
            output,
        } => {
            let requested = match resolve_requested_partitions(date, from, to) {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    std::process::exit(2);
                }
            };
            let config = PipelineConfig {
                failure_policy: if strict {
                    FailurePolicy::Strict
                } else {
                    FailurePolicy::Lenient
                },
                hash_algorithm,
            };
            if let Err(e) = cmd_run(&db, requested, &config, output.as_deref()) {
                eprintln!("Error: {:#}", e);
                std::process::exit(3);
            }
        }
        Commands::Inspect { db } => {
            if let Err(e) = cmd_inspect(&db) {
                eprintln!("Error: {:#}", e);
                std::process::exit(3);
            }
        }
    }
}

/// Explicit partition selection from the flags; `None` means every
/// partition present in the store.
fn resolve_requested_partitions(
    date: Option<PartitionKey>,
    from: Option<PartitionKey>,
    to: Option<PartitionKey>,
) -> Result<Option<Vec<PartitionKey>>> {
    if let Some(date) = date {
        return Ok(Some(vec![date]));
    }
    match (from, to) {
        (Some(from), Some(to)) => {
            // Parsed keys always come from real calendar dates.
            let start = NaiveDate::from_ymd_opt(from.year, from.month, from.day)
                .context("invalid --from date")?;
            let end = NaiveDate::from_ymd_opt(to.year, to.month, to.day)
                .context("invalid --to date")?;
            if start > end {
                bail!("--from {} is after --to {}", from, to);
            }
            let range: Vec<PartitionKey> = start
                .iter_days()
                .take_while(|d| *d <= end)
                .map(PartitionKey::from_date)
                .collect();
            Ok(Some(range))
        }
        _ => Ok(None),
    }
}

fn cmd_import(db: &Path, input: &Path) -> Result<()> {
    let file =
        File::open(input).with_context(|| format!("Failed to open input file: {:?}", input))?;
    let reader = BufReader::new(file);

    let mut records: Vec<CostRecord> = Vec::new();
    let mut skipped = 0usize;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", lineno + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<CostRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Skipping line {}: {}", lineno + 1, e);
                skipped += 1;
            }
        }
    }

    let store = SnapshotStore::new(db)
        .with_context(|| format!("Failed to open store: {:?}", db))?;
    let inserted = store
        .insert_cost_records(&records)
        .context("Failed to insert cost records")?;

    info!(inserted, skipped, "import finished");
    println!("Imported {} records ({} lines skipped)", inserted, skipped);
    Ok(())
}

fn cmd_run(
    db: &Path,
    requested: Option<Vec<PartitionKey>>,
    config: &PipelineConfig,
    output: Option<&Path>,
) -> Result<()> {
    let store = SnapshotStore::new(db)
        .with_context(|| format!("Failed to open store: {:?}", db))?;

    let partitions = match requested {
        Some(partitions) => partitions,
        None => store
            .list_partitions()
            .context("Failed to list partitions")?,
    };
    if partitions.is_empty() {
        println!("Nothing to do: store holds no cost records");
        return Ok(());
    }

    info!(
        partitions = partitions.len(),
        first = %partitions[0],
        last = %partitions[partitions.len() - 1],
        "starting snapshot run"
    );

    let report = run_partitions(&store, &partitions, config).context("Snapshot run failed")?;

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)
            .context("Failed to serialize run report")?;
        fs::write(path, json).with_context(|| format!("Failed to write report: {:?}", path))?;
        info!("Run report written to {:?}", path);
    }

    print_run_summary(&report);
    Ok(())
}

fn cmd_inspect(db: &Path) -> Result<()> {
    let store = SnapshotStore::new(db)
        .with_context(|| format!("Failed to open store: {:?}", db))?;
    let summaries = store
        .partition_summaries()
        .context("Failed to summarize partitions")?;

    println!("╔════════════════════════════════════════════════════════════════╗");
    println!("║                 FOCUS SNAPSHOT STORE INSPECTION                ║");
    println!("╚════════════════════════════════════════════════════════════════╝");
    println!();
    println!("Database: {:?}", db);
    println!();

    if summaries.is_empty() {
        println!("Store is empty.");
        return Ok(());
    }

    println!(
        "{:>12} {:>14} {:>11}",
        "Partition", "Cost Records", "Snapshots"
    );
    println!("{}", "-".repeat(40));
    let mut total_records = 0u64;
    let mut total_snapshots = 0u64;
    for summary in &summaries {
        println!(
            "{:>12} {:>14} {:>11}",
            summary.partition.to_string(),
            summary.cost_records,
            summary.snapshots
        );
        total_records += summary.cost_records;
        total_snapshots += summary.snapshots;
    }
    println!("{}", "-".repeat(40));
    println!(
        "{:>12} {:>14} {:>11}",
        "total", total_records, total_snapshots
    );

    let snapshot_days: Vec<_> = summaries.iter().filter(|s| s.snapshots > 0).collect();
    if snapshot_days.len() > 1 {
        println!();
        println!("Drift vs previous snapshot day:");
        println!(
            "{:>12} {:>9} {:>7} {:>9}",
            "Partition", "Changed", "Added", "Removed"
        );
        println!("{}", "-".repeat(40));
        for pair in snapshot_days.windows(2) {
            let drift = store
                .drift_between(pair[0].partition, pair[1].partition)
                .context("Failed to compute drift")?;
            println!(
                "{:>12} {:>9} {:>7} {:>9}",
                pair[1].partition.to_string(),
                drift.changed,
                drift.added,
                drift.removed
            );
        }
    }
    Ok(())
}

fn print_run_summary(report: &RunReport) {
    println!("\n{}", "=".repeat(70));
    println!("SNAPSHOT RUN SUMMARY");
    println!("{}", "=".repeat(70));
    println!("Partitions Processed:    {}", report.partitions_processed);
    println!("Records Read:            {}", report.records_read);
    println!("Groups Aggregated:       {}", report.groups_aggregated);
    println!("Snapshots Written:       {}", report.snapshots_written);
    println!("{}", "-".repeat(70));
    println!("Tag Parse Failures:      {}", report.tag_parse_failures);
    println!("Metadata Disagreements:  {}", report.metadata_disagreements);
    println!("Date Errors:             {}", report.date_errors);
    println!("{}", "=".repeat(70));
}
