//! Aggregate reporting over the operation log and the extracted leaves.

use std::path::Path;

use ethereum_types::U256;
use itertools::Itertools;
use trie_log_decoder::extract::{AccountLeaf, Extraction, LogRecord, Operation};

/// Per-operation counts and value-byte totals for one slice of the log.
///
/// Byte totals come from the log's own `ValueSize` column rather than from
/// re-decoding values, so they match what the store instrumentation saw.
/// Deletions carry no value, so only their count is tracked.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct OpStats {
    get_count: u64,
    put_count: u64,
    delete_count: u64,
    get_bytes: u64,
    put_bytes: u64,
}

impl OpStats {
    pub(crate) fn collect<'a>(records: impl IntoIterator<Item = &'a LogRecord>) -> Self {
        let mut stats = Self::default();

        for record in records {
            let bytes = record.value_size.unwrap_or(0);
            match record.operation {
                Operation::Get => {
                    stats.get_count += 1;
                    stats.get_bytes += bytes;
                }
                Operation::Put => {
                    stats.put_count += 1;
                    stats.put_bytes += bytes;
                }
                Operation::Delete => stats.delete_count += 1,
            }
        }

        stats
    }

    fn get_cell(&self) -> String {
        format!("{} ({}B)", self.get_count, self.get_bytes)
    }

    fn put_cell(&self) -> String {
        format!("{} ({}B)", self.put_count, self.put_bytes)
    }
}

/// Prints the per-namespace operation table: one row per namespace, GET and
/// PUT cells as `count (bytesB)`, DELETE as a bare count, plus a TOTAL row.
pub(crate) fn print_operation_summary(records: &[LogRecord]) {
    println!("Total operations: {}", records.len());

    println!("\nSummary by type:");
    println!(
        "{:<25} {:>20} {:>20} {:>10}",
        "Type", "GET", "PUT", "DELETE"
    );

    for namespace in records
        .iter()
        .map(|r| r.namespace.as_str())
        .sorted()
        .dedup()
    {
        let stats = OpStats::collect(records.iter().filter(|r| r.namespace == namespace));
        println!(
            "{:<25} {:>20} {:>20} {:>10}",
            namespace,
            stats.get_cell(),
            stats.put_cell(),
            stats.delete_count
        );
    }

    let total = OpStats::collect(records);
    println!(
        "{:<25} {:>20} {:>20} {:>10}",
        "TOTAL",
        total.get_cell(),
        total.put_cell(),
        total.delete_count
    );
}

/// Prints the account-trie traffic against its leaf-only baseline.
///
/// The baseline rows answer how much of the trie's store traffic touches
/// actual account data; the overhead rows express the inverse, how much
/// extra traffic the intermediate nodes cost relative to the leaves alone.
/// Deletions carry no value bytes, so their byte cells are `N/A`.
pub(crate) fn print_baseline_comparison(mpt: &OpStats, baseline: &OpStats) {
    println!("\nBaseline comparison (account trie vs leaf nodes only):");
    println!(
        "{:<36} {:>20} {:>20} {:>10}",
        "Metric", "GET", "PUT", "DELETE"
    );
    println!(
        "{:<36} {:>20} {:>20} {:>10}",
        "MPT (all account-trie ops)",
        mpt.get_cell(),
        mpt.put_cell(),
        mpt.delete_count
    );
    println!(
        "{:<36} {:>20} {:>20} {:>10}",
        "Baseline (leaf nodes)",
        baseline.get_cell(),
        baseline.put_cell(),
        baseline.delete_count
    );

    println!(
        "{:<36} {:>19}% {:>19}% {:>9}%",
        "Baseline % of MPT (count)",
        format!("{:.2}", share(baseline.get_count, mpt.get_count)),
        format!("{:.2}", share(baseline.put_count, mpt.put_count)),
        format!("{:.2}", share(baseline.delete_count, mpt.delete_count))
    );
    println!(
        "{:<36} {:>19}% {:>19}% {:>10}",
        "Baseline % of MPT (bytes)",
        format!("{:.2}", share(baseline.get_bytes, mpt.get_bytes)),
        format!("{:.2}", share(baseline.put_bytes, mpt.put_bytes)),
        "N/A"
    );
    println!(
        "{:<36} {:>19}% {:>19}% {:>9}%",
        "MPT overhead vs baseline (count)",
        format!("+{:.2}", overhead(mpt.get_count, baseline.get_count)),
        format!("+{:.2}", overhead(mpt.put_count, baseline.put_count)),
        format!("+{:.2}", overhead(mpt.delete_count, baseline.delete_count))
    );
    println!(
        "{:<36} {:>19}% {:>19}% {:>10}",
        "MPT overhead vs baseline (bytes)",
        format!("+{:.2}", overhead(mpt.get_bytes, baseline.get_bytes)),
        format!("+{:.2}", overhead(mpt.put_bytes, baseline.put_bytes)),
        "N/A"
    );
}

/// Prints the skip histogram, a preview of the leaves and leaf-level totals.
pub(crate) fn print_leaves(extraction: &Extraction, preview: usize) {
    let leaves = &extraction.leaves;
    println!("\nAccount leaves found: {}", leaves.len());

    if !extraction.skips.is_empty() {
        println!("\nSkipped records:");
        for (reason, count) in &extraction.skips {
            println!("  {:<20} {:>10}", reason.to_string(), count);
        }
    }

    if leaves.is_empty() {
        return;
    }

    println!();
    for leaf in leaves.iter().take(preview) {
        println!(
            "  0x{}  nonce={} balance={} op={}",
            hex::encode(&leaf.address_hash),
            leaf.nonce,
            leaf.balance,
            leaf.operation
        );
    }
    if leaves.len() > preview {
        println!("  ... and {} more", leaves.len() - preview);
    }

    let gets = leaves
        .iter()
        .filter(|l| l.operation == Operation::Get)
        .count();
    let puts = leaves
        .iter()
        .filter(|l| l.operation == Operation::Put)
        .count();
    println!("\nLeaf operations: GET {}, PUT {}", gets, puts);

    let total_balance = leaves
        .iter()
        .fold(U256::zero(), |acc, l| acc.saturating_add(l.balance));
    println!("Total balance in leaves: {} wei", total_balance);
}

/// Writes one CSV row per leaf, hashes and paths hex-rendered, integers in
/// decimal.
pub(crate) fn write_leaves_csv(path: &Path, leaves: &[AccountLeaf]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record([
        "AddressHash",
        "Nonce",
        "Balance",
        "StorageRoot",
        "CodeHash",
        "Path",
        "Operation",
    ])?;

    for leaf in leaves {
        writer.write_record([
            format!("0x{}", hex::encode(&leaf.address_hash)),
            leaf.nonce.to_string(),
            leaf.balance.to_string(),
            format!("{:#x}", leaf.storage_root),
            format!("{:#x}", leaf.code_hash),
            format!("0x{}", hex::encode(&leaf.path)),
            leaf.operation.to_string(),
        ])?;
    }

    writer.flush()?;

    Ok(())
}

/// Writes a filtered slice of the operation log back out in the input's own
/// column format, so downstream tooling can consume it like the capture.
pub(crate) fn write_records_csv<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a LogRecord>,
) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    for record in records {
        writer.serialize(record)?;
    }

    writer.flush()?;

    Ok(())
}

fn share(part: u64, whole: u64) -> f64 {
    match whole {
        0 => 0.0,
        _ => part as f64 * 100.0 / whole as f64,
    }
}

fn overhead(total: u64, baseline: u64) -> f64 {
    match baseline {
        0 => 0.0,
        _ => total.saturating_sub(baseline) as f64 * 100.0 / baseline as f64,
    }
}
