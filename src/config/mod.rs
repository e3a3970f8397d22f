//! Configuration module for linkwatch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use linkwatch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("linkwatch.toml")).unwrap();
//! println!("Checking with {} workers", config.checker.worker_count);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CatalogConfig, CheckerConfig, Config, CreationConfig, OutputConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
