//! Storage traits and error types
//!
//! The checker talks to persistence through two narrow traits: [`LinkStore`]
//! for the checking phase and [`RunStore`] for the creation phase.

use crate::catalog::Dataset;
use crate::storage::{BatchCounts, LinkRecord, NewLink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence used by the checking phase
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Streams unchecked links, one per distinct URL
    ///
    /// The stream is lazy; dropping it stops reading.
    fn stream_unchecked(&self) -> BoxStream<'static, StorageResult<LinkRecord>>;

    /// Marks every unchecked link with this URL as checked
    ///
    /// # Arguments
    ///
    /// * `url` - The probed URL
    /// * `error` - None if the URL was reachable, otherwise the failure text
    ///
    /// # Returns
    ///
    /// The number of links updated
    async fn record_result(&self, url: &str, error: Option<&str>) -> StorageResult<u64>;
}

/// Persistence used by the creation phase
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Returns true if the dataset has a run with unchecked links
    async fn has_active_run(&self, dataset_id: &str) -> StorageResult<bool>;

    /// Inserts or refreshes dataset metadata
    async fn upsert_dataset(&self, dataset: &Dataset) -> StorageResult<()>;

    /// Creates a run for a dataset within a batch
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    async fn create_run(&self, dataset_id: &str, batch_id: i64) -> StorageResult<i64>;

    /// Inserts unchecked links for a run in one transaction
    ///
    /// # Returns
    ///
    /// The number of links inserted
    async fn create_links(&self, run_id: i64, links: &[NewLink]) -> StorageResult<u64>;

    /// Opens a batch
    ///
    /// # Arguments
    ///
    /// * `index_watermark` - Catalog index freshness at the start of the batch
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created batch
    async fn create_batch(
        &self,
        index_watermark: Option<DateTime<Utc>>,
        config_hash: &str,
    ) -> StorageResult<i64>;

    /// Writes the creation counters to a batch
    ///
    /// Counters can only be written once; a second write fails with
    /// [`StorageError::ConstraintViolation`].
    async fn finish_batch(&self, batch_id: i64, counts: &BatchCounts) -> StorageResult<()>;
}
