//! JSON file catalog
//!
//! Reads a catalog export of the form:
//!
//! ```json
//! {
//!   "datasets": [
//!     {
//!       "id": "2048128",
//!       "name": "Photographs",
//!       "provider": "Example Archive",
//!       "country": "NL",
//!       "published": true,
//!       "indexed_at": "2024-05-01T00:00:00Z",
//!       "records": [
//!         { "id": "r1", "shown_at": ["https://..."], "shown_by": ["https://..."] }
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::catalog::{Catalog, CatalogError, CatalogResult, Dataset, Record};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use rand::seq::IndexedRandom;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Deserialize)]
struct DatasetEntry {
    id: String,

    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    provider: Option<String>,

    #[serde(default)]
    country: Option<String>,

    #[serde(default)]
    published: bool,

    #[serde(default)]
    indexed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    records: Vec<Record>,
}

impl DatasetEntry {
    /// Only published datasets with an indexed snapshot are eligible
    fn to_dataset(&self) -> Option<Dataset> {
        if !self.published {
            return None;
        }

        let indexed_at = self.indexed_at?;
        Some(Dataset {
            id: self.id.clone(),
            name: self.name.clone(),
            provider: self.provider.clone(),
            country: self.country.clone(),
            indexed_at,
        })
    }
}

/// Catalog backed by a JSON document loaded into memory
#[derive(Debug)]
pub struct JsonCatalog {
    order: Vec<String>,
    datasets: HashMap<String, DatasetEntry>,
}

impl JsonCatalog {
    /// Loads a catalog from a JSON file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the catalog export
    ///
    /// # Returns
    ///
    /// * `Ok(JsonCatalog)` - Successfully loaded catalog
    /// * `Err(CatalogError)` - The file could not be read or parsed
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let catalog = Self::from_json(&content)?;
        tracing::info!(
            path = %path.display(),
            datasets = catalog.order.len(),
            "Loaded catalog"
        );
        Ok(catalog)
    }

    /// Parses a catalog from a JSON string
    pub fn from_json(content: &str) -> CatalogResult<Self> {
        let document: CatalogDocument = serde_json::from_str(content)?;

        let mut order = Vec::with_capacity(document.datasets.len());
        let mut datasets = HashMap::with_capacity(document.datasets.len());
        for entry in document.datasets {
            if datasets.contains_key(&entry.id) {
                tracing::warn!(dataset = %entry.id, "Duplicate dataset id, keeping the last entry");
            } else {
                order.push(entry.id.clone());
            }
            datasets.insert(entry.id.clone(), entry);
        }

        Ok(Self { order, datasets })
    }

    /// Number of datasets in the document, eligible or not
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn sample(records: &[Record], n: usize) -> Vec<Record> {
    let candidates: Vec<&Record> = records.iter().filter(|r| r.has_links()).collect();
    let mut rng = rand::rng();
    candidates
        .choose_multiple(&mut rng, n)
        .map(|record| (*record).clone())
        .collect()
}

#[async_trait]
impl Catalog for JsonCatalog {
    fn list_dataset_ids(&self) -> BoxStream<'static, CatalogResult<String>> {
        stream::iter(self.order.clone().into_iter().map(Ok)).boxed()
    }

    async fn get_dataset(&self, id: &str) -> CatalogResult<Option<Dataset>> {
        Ok(self.datasets.get(id).and_then(DatasetEntry::to_dataset))
    }

    async fn sample_records_with_links(&self, id: &str, n: usize) -> CatalogResult<Vec<Record>> {
        let records = match self.datasets.get(id) {
            Some(entry) if entry.to_dataset().is_some() => sample(&entry.records, n),
            _ => Vec::new(),
        };
        Ok(records)
    }

    async fn index_watermark(&self) -> CatalogResult<Option<DateTime<Utc>>> {
        Ok(self
            .datasets
            .values()
            .filter_map(DatasetEntry::to_dataset)
            .map(|dataset| dataset.indexed_at)
            .max())
    }
}
