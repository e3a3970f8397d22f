//! Markdown batch report generation
//!
//! This module renders a batch summary as a human-readable markdown report,
//! including creation counters, link outcomes, and the worst hosts.

use crate::output::{BatchSummary, OutputResult};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Writes a batch summary as a markdown report
///
/// # Arguments
///
/// * `summary` - The batch summary data
/// * `output_path` - Path where the markdown file should be written; missing
///   parent directories are created
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn generate_markdown_summary(summary: &BatchSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    tracing::info!(path = %output_path.display(), "Wrote batch report");
    Ok(())
}

/// Formats a batch summary as markdown
pub fn format_markdown_summary(summary: &BatchSummary) -> String {
    let mut md = String::new();

    md.push_str("# Link Check Report\n\n");

    let batch = match &summary.batch {
        Some(batch) => batch,
        None => {
            md.push_str("No batches have been run yet.\n");
            return md;
        }
    };

    md.push_str("## Batch Information\n\n");
    md.push_str(&format!("- **Batch ID**: {}\n", batch.id));
    md.push_str(&format!("- **Created**: {}\n", batch.created_at));
    if let Some(finished) = &batch.finished_at {
        md.push_str(&format!("- **Runs Created At**: {}\n", finished));
    }
    if let Some(watermark) = &batch.index_watermark {
        md.push_str(&format!("- **Index Watermark**: {}\n", watermark));
    }
    md.push_str(&format!("- **Config Hash**: {}\n\n", batch.config_hash));

    md.push_str("## Run Creation\n\n");
    match &batch.counts {
        Some(counts) => {
            md.push_str("| Datasets | Count |\n");
            md.push_str("|----------|-------|\n");
            md.push_str(&format!("| Seen | {} |\n", counts.datasets_seen));
            md.push_str(&format!("| Already running | {} |\n", counts.already_running));
            md.push_str(&format!("| Not indexed | {} |\n", counts.not_indexed));
            md.push_str(&format!("| No links | {} |\n", counts.no_links));
            md.push_str(&format!("| Runs created | {} |\n\n", counts.runs_created));
            md.push_str(&format!(
                "- **Links Created**: {}\n\n",
                counts.links_created
            ));
        }
        None => md.push_str("Run creation did not finish for this batch.\n\n"),
    }

    md.push_str("## Link Outcomes\n\n");
    md.push_str(&format!("- **Total Links**: {}\n", summary.links.total));
    md.push_str(&format!("- **Reachable**: {}\n", summary.links.succeeded));
    md.push_str(&format!("- **Unreachable**: {}\n", summary.links.failed));
    md.push_str(&format!("- **Unchecked**: {}\n", summary.links.unchecked));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    if let Some(check) = &summary.check {
        md.push_str(&format!(
            "This invocation probed {} URLs, {} of them unreachable.\n\n",
            check.checked, check.failed
        ));
    }

    if !summary.failing_hosts.is_empty() {
        md.push_str("## Hosts With Most Failures\n\n");
        md.push_str("| Host | Failed Links |\n");
        md.push_str("|------|--------------|\n");
        for (host, count) in &summary.failing_hosts {
            md.push_str(&format!("| {} | {} |\n", host, count));
        }
        md.push('\n');
    }

    if !summary.failed_links.is_empty() {
        md.push_str("## Failed Links\n\n");
        md.push_str("| URL | Record | Error |\n");
        md.push_str("|-----|--------|-------|\n");
        for link in &summary.failed_links {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                link.url,
                link.record_id,
                table_cell(&link.error)
            ));
        }
        if summary.links.failed > summary.failed_links.len() as u64 {
            md.push_str(&format!(
                "\n... and {} more\n",
                summary.links.failed - summary.failed_links.len() as u64
            ));
        }
        md.push('\n');
    }

    md
}

/// Keeps multi-line error chains inside one table cell
fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', "<br>")
}
