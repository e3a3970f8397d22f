//! URL handling module for linkwatch
//!
//! Links are grouped by host key for admission control; the host itself is
//! stored alongside each link for reporting.

mod host;

pub use host::{extract_host, host_key};
