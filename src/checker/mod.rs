//! Checker module: run creation, link checking, and batch sequencing
//!
//! This module contains the orchestration logic, including:
//! - Sampling datasets into runs of unchecked links
//! - Checking links in parallel under per-host admission control
//! - Probing links over HTTP
//! - Sequencing a full batch and writing its report

mod batch;
mod link_check;
mod prober;
mod run_creation;

pub use batch::{run_batch, BatchMode, BatchOutcome};
pub use link_check::{CheckSummary, LinkCheckOrchestrator};
pub use prober::{build_http_client, HttpProber, ProbeError, Prober, MAX_REDIRECTS};
pub use run_creation::{CreationSummary, RunCreationOrchestrator};

use std::error::Error;

/// Renders an error and its chain of sources, one message per line
///
/// This is the text stored for a failed link.
pub fn flatten_error_chain(error: &(dyn Error + 'static)) -> String {
    let mut messages = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        messages.push(cause.to_string());
        source = cause.source();
    }
    messages.join("\n")
}
