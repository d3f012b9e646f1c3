//! Reconstructs account records from a captured key-value store operation
//! log and reports aggregate statistics about the log.
//!
//! The input is the operations CSV the store instrumentation writes
//! (`Operation,KeyHex,ValueHex,KeySize,ValueSize,Type`). Account-trie short
//! nodes that fully decode are written out as one account row each, next to
//! two filtered views of the log itself: all account-trie operations, and
//! the leaf-node subset used as the baseline for overhead comparisons.
//!
//! Example usage:
//! ```text
//! RUST_LOG=info leafscan leveldb_operations.csv -o results/
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueHint};
use log::info;
use trie_log_decoder::extract::{self, LogRecord};

mod report;

/// Extract account leaves from a store operation log.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Path to the operations CSV captured from the store.
    #[arg(value_hint = ValueHint::FilePath)]
    ops_csv: PathBuf,

    /// Directory to write the output CSVs into: `account_leaves.csv`,
    /// `mpt_operations.csv` and `baseline_leaf_operations.csv`.
    #[arg(long, short = 'o', value_hint = ValueHint::DirPath)]
    out_dir: Option<PathBuf>,

    /// How many leaves to show in the preview table.
    #[arg(long, default_value_t = 20)]
    preview: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Cli::parse();

    let records = read_records(&args.ops_csv)
        .with_context(|| format!("reading {}", args.ops_csv.display()))?;
    info!("Read {} operation records", records.len());

    report::print_operation_summary(&records);

    let mpt_records: Vec<&LogRecord> = records
        .iter()
        .filter(|r| r.namespace == extract::ACCOUNT_TRIE_NAMESPACE)
        .collect();
    let leaf_records: Vec<&LogRecord> = mpt_records
        .iter()
        .copied()
        .filter(|r| extract::is_leaf_record(r))
        .collect();
    info!(
        "{} of {} account-trie operations carry leaf nodes",
        leaf_records.len(),
        mpt_records.len()
    );

    report::print_baseline_comparison(
        &report::OpStats::collect(mpt_records.iter().copied()),
        &report::OpStats::collect(leaf_records.iter().copied()),
    );

    let extraction = extract::extract_leaves(&records)?;
    report::print_leaves(&extraction, args.preview);

    if let Some(dir) = &args.out_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;

        let leaves_path = dir.join("account_leaves.csv");
        report::write_leaves_csv(&leaves_path, &extraction.leaves)
            .with_context(|| format!("writing {}", leaves_path.display()))?;

        let mpt_path = dir.join("mpt_operations.csv");
        report::write_records_csv(&mpt_path, mpt_records.iter().copied())
            .with_context(|| format!("writing {}", mpt_path.display()))?;

        let baseline_path = dir.join("baseline_leaf_operations.csv");
        report::write_records_csv(&baseline_path, leaf_records.iter().copied())
            .with_context(|| format!("writing {}", baseline_path.display()))?;

        info!(
            "Wrote {} leaves and {} + {} filtered operations to {}",
            extraction.leaves.len(),
            mpt_records.len(),
            leaf_records.len(),
            dir.display()
        );
    }

    Ok(())
}

fn read_records(path: &Path) -> anyhow::Result<Vec<LogRecord>> {
    let mut reader = csv::Reader::from_path(path)?;

    reader
        .deserialize()
        .enumerate()
        .map(|(index, row)| row.with_context(|| format!("record {}", index)))
        .collect()
}
