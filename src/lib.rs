//! Linkwatch: a polite link checker for catalog records
//!
//! This crate samples records from a dataset catalog into runs of links,
//! then checks every link in parallel while never probing the same host
//! twice at once and pausing between consecutive probes of a host.

pub mod catalog;
pub mod checker;
pub mod config;
pub mod engine;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for linkwatch operations
#[derive(Debug, Error)]
pub enum LinkwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] catalog::CatalogError),

    #[error("Parallel run failed: {0}")]
    Parallel(#[from] engine::ParallelError),

    #[error("Admission failed: {0}")]
    Admission(#[from] engine::AdmissionError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for linkwatch operations
pub type Result<T> = std::result::Result<T, LinkwatchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use checker::{run_batch, BatchMode, BatchOutcome};
pub use config::Config;
pub use state::{CheckingResult, LinkType};
pub use url::host_key;
