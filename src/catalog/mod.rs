//! Catalog module for reading datasets and sampling their records
//!
//! The checker only needs a handful of read operations from the catalog,
//! captured by the [`Catalog`] trait. [`JsonCatalog`] serves them from a JSON
//! export on disk.

mod json;

pub use json::JsonCatalog;

use crate::state::LinkType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading the catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Metadata of a dataset that has an indexed snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: Option<String>,
    pub provider: Option<String>,
    pub country: Option<String>,
    pub indexed_at: DateTime<Utc>,
}

/// A catalog record and the URLs it references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,

    #[serde(default)]
    pub shown_at: Vec<String>,

    #[serde(default)]
    pub shown_by: Vec<String>,
}

impl Record {
    /// Returns the URLs of the given link type
    pub fn urls(&self, link_type: LinkType) -> &[String] {
        match link_type {
            LinkType::ShownAt => &self.shown_at,
            LinkType::ShownBy => &self.shown_by,
        }
    }

    /// Returns true if the record references at least one URL
    pub fn has_links(&self) -> bool {
        !self.shown_at.is_empty() || !self.shown_by.is_empty()
    }

    /// Total number of URLs across all link types
    pub fn link_count(&self) -> usize {
        self.shown_at.len() + self.shown_by.len()
    }
}

/// Read access to the catalog
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Lists every dataset id, lazily
    ///
    /// Ids may repeat; the creation phase processes each id once per batch.
    fn list_dataset_ids(&self) -> BoxStream<'static, CatalogResult<String>>;

    /// Gets a dataset's metadata
    ///
    /// Returns None when the dataset is unknown, unpublished, or has no
    /// indexed snapshot.
    async fn get_dataset(&self, id: &str) -> CatalogResult<Option<Dataset>>;

    /// Picks up to `n` records of the dataset at random, considering only
    /// records that reference at least one URL
    async fn sample_records_with_links(&self, id: &str, n: usize) -> CatalogResult<Vec<Record>>;

    /// Freshness of the catalog's index, if it has one
    async fn index_watermark(&self) -> CatalogResult<Option<DateTime<Utc>>>;
}
