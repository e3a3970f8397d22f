//! Output module for batch reports and statistics
//!
//! This module handles:
//! - Collecting a batch summary from storage
//! - Rendering the summary as a markdown report
//! - Printing database statistics

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{load_statistics, print_statistics, LinkStatistics};

use crate::checker::CheckSummary;
use crate::storage::{BatchRecord, LinkTotals, SqliteStorage, StorageError};
use thiserror::Error;

/// Number of hosts listed in the failing hosts table
pub const TOP_FAILING_HOSTS: usize = 20;

/// Number of failed links listed in a report
pub const MAX_FAILED_LINKS: usize = 100;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A failed link as listed in a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLink {
    pub url: String,
    pub record_id: String,
    pub error: String,
}

/// Everything a batch report shows
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// The batch the report covers; None when no batch exists yet
    pub batch: Option<BatchRecord>,

    /// Link outcomes for the batch's runs
    pub links: LinkTotals,

    /// Counts from this invocation's checking phase, if it ran
    pub check: Option<CheckSummary>,

    /// (host, failed links), most failures first
    pub failing_hosts: Vec<(String, u64)>,

    pub failed_links: Vec<FailedLink>,
}

impl BatchSummary {
    /// Share of checked links that were reachable, as a percentage
    pub fn success_rate(&self) -> f64 {
        let checked = self.links.checked();
        if checked == 0 {
            return 0.0;
        }
        (self.links.succeeded as f64 / checked as f64) * 100.0
    }
}

/// Generates a batch summary from storage
///
/// # Arguments
///
/// * `storage` - The storage backend
/// * `batch_id` - Batch to report on; None reports on the latest batch
/// * `check` - Counts from a checking phase that just ran, if any
///
/// # Returns
///
/// * `Ok(BatchSummary)` - Successfully generated summary
/// * `Err(OutputError)` - Failed to query storage
pub fn generate_summary(
    storage: &SqliteStorage,
    batch_id: Option<i64>,
    check: Option<CheckSummary>,
) -> OutputResult<BatchSummary> {
    let batch = match batch_id {
        Some(id) => Some(storage.get_batch(id)?),
        None => storage.get_latest_batch()?,
    };

    let scope = match &batch {
        Some(batch) => Some(batch.id),
        None => {
            return Ok(BatchSummary {
                check,
                ..BatchSummary::default()
            })
        }
    };

    let failed_links = storage
        .failed_links(scope, MAX_FAILED_LINKS)?
        .into_iter()
        .map(|link| FailedLink {
            error: link.result.error().unwrap_or_default().to_string(),
            url: link.url,
            record_id: link.record_id,
        })
        .collect();

    Ok(BatchSummary {
        links: storage.link_totals(scope)?,
        failing_hosts: storage.failing_hosts(scope, TOP_FAILING_HOSTS)?,
        failed_links,
        batch,
        check,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let summary = BatchSummary {
            links: LinkTotals {
                total: 10,
                unchecked: 2,
                succeeded: 6,
                failed: 2,
            },
            ..BatchSummary::default()
        };
        assert!((summary.success_rate() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_rate_nothing_checked() {
        let summary = BatchSummary::default();
        assert_eq!(summary.success_rate(), 0.0);
    }

    #[test]
    fn test_summary_without_batches() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let summary = generate_summary(&storage, None, None).unwrap();
        assert!(summary.batch.is_none());
        assert_eq!(summary.links, LinkTotals::default());
    }

    #[test]
    fn test_summary_for_missing_batch() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let result = generate_summary(&storage, Some(3), None);
        assert!(matches!(
            result,
            Err(OutputError::Storage(StorageError::BatchNotFound(3)))
        ));
    }
}
