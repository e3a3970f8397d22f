//! Storage module for persisting batches, runs, and link outcomes
//!
//! This module handles all database operations for linkwatch, including:
//! - SQLite database initialization and schema management
//! - Batch bookkeeping and creation counters
//! - Run and link materialization
//! - Streaming unchecked links and recording outcomes

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{LinkStore, RunStore, StorageError, StorageResult};

use crate::state::{CheckingResult, LinkType};
use crate::LinkwatchError;

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(LinkwatchError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, LinkwatchError> {
    Ok(SqliteStorage::new(path)?)
}

/// Represents a link in the database
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRecord {
    pub id: i64,
    pub run_id: i64,
    pub record_id: String,
    pub link_type: LinkType,
    pub url: String,
    pub host: Option<String>,
    pub result: CheckingResult,
}

/// A link to be inserted for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub record_id: String,
    pub link_type: LinkType,
    pub url: String,
    pub host: Option<String>,
}

/// Dataset exclusion and creation counters for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub datasets_seen: u64,
    pub already_running: u64,
    pub not_indexed: u64,
    pub no_links: u64,
    pub runs_created: u64,
    pub links_created: u64,
}

/// Represents a batch
#[derive(Debug, Clone)]
pub struct BatchRecord {
    pub id: i64,
    pub created_at: String,
    pub config_hash: String,
    pub index_watermark: Option<String>,
    /// None until the creation phase has finished
    pub counts: Option<BatchCounts>,
    pub finished_at: Option<String>,
}

/// Link outcome totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkTotals {
    pub total: u64,
    pub unchecked: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl LinkTotals {
    pub fn checked(&self) -> u64 {
        self.succeeded + self.failed
    }
}
