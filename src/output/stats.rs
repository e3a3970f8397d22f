//! Statistics from the linkwatch database
//!
//! This module provides functionality for extracting and displaying
//! database-wide statistics.

use crate::output::{OutputResult, TOP_FAILING_HOSTS};
use crate::storage::{BatchRecord, LinkTotals, SqliteStorage};

/// Database-wide statistics
#[derive(Debug, Clone)]
pub struct LinkStatistics {
    pub batches: u64,
    pub datasets: u64,
    pub runs: u64,

    /// Runs that still own unchecked links
    pub active_runs: u64,

    /// Link outcomes across all batches
    pub links: LinkTotals,

    /// (host, failed links), most failures first
    pub failing_hosts: Vec<(String, u64)>,

    pub latest_batch: Option<BatchRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(LinkStatistics)` - Successfully loaded statistics
/// * `Err(OutputError)` - Failed to query statistics
pub fn load_statistics(storage: &SqliteStorage) -> OutputResult<LinkStatistics> {
    Ok(LinkStatistics {
        batches: storage.count_batches()?,
        datasets: storage.count_datasets()?,
        runs: storage.count_runs()?,
        active_runs: storage.count_active_runs()?,
        links: storage.link_totals(None)?,
        failing_hosts: storage.failing_hosts(None, TOP_FAILING_HOSTS)?,
        latest_batch: storage.get_latest_batch()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &LinkStatistics) {
    println!("=== Link Statistics ===\n");

    println!("Overview:");
    println!("  Batches: {}", stats.batches);
    println!("  Datasets: {}", stats.datasets);
    println!("  Runs: {} ({} active)", stats.runs, stats.active_runs);
    println!();

    println!("Links:");
    println!("  Total: {}", stats.links.total);
    for (label, count) in [
        ("Reachable", stats.links.succeeded),
        ("Unreachable", stats.links.failed),
        ("Unchecked", stats.links.unchecked),
    ] {
        println!(
            "  {}: {} ({:.1}%)",
            label,
            count,
            percentage(count, stats.links.total)
        );
    }
    println!();

    if !stats.failing_hosts.is_empty() {
        println!("Hosts With Most Failures:");
        for (host, count) in &stats.failing_hosts {
            println!("  - {}: {}", host, count);
        }
        println!();
    }

    if let Some(batch) = &stats.latest_batch {
        println!("Latest Batch: #{} created {}", batch.id, batch.created_at);
        match &batch.counts {
            Some(counts) => println!(
                "  {} datasets seen, {} runs created, {} links created",
                counts.datasets_seen, counts.runs_created, counts.links_created
            ),
            None => println!("  Run creation did not finish"),
        }
    }
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64) * 100.0
}
