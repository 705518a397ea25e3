//! Markdown report of a crawl batch

use crate::crawler::{CrawlSummary, Protection};
use std::fs;
use std::path::Path;

/// Writes the markdown report of `summary` to `output_path`
pub fn write_crawl_summary(summary: &CrawlSummary, output_path: &Path) -> std::io::Result<()> {
    fs::write(output_path, format_crawl_summary(summary))
}

/// Formats a crawl summary as markdown
pub fn format_crawl_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Kage-Recon Crawl Summary\n\n");

    md.push_str("## Overview\n\n");
    md.push_str(&format!("- **Attempted**: {}\n", summary.attempted));
    md.push_str(&format!("- **Succeeded**: {}\n", summary.succeeded));
    md.push_str(&format!("- **Failed**: {}\n", summary.failed()));
    md.push_str(&format!("- **Skipped**: {}\n\n", summary.skipped.len()));

    if !summary.runs.is_empty() {
        md.push_str("## Runs\n\n");
        md.push_str("| Target | Run | State | Protection | Transport | Attempts | Resources |\n");
        md.push_str("|--------|-----|-------|------------|-----------|----------|-----------|\n");
        for run in &summary.runs {
            let protection = match &run.protection {
                Some(Protection::Protected(_)) => "protected",
                Some(Protection::Unprotected) => "unprotected",
                Some(Protection::Undetermined(_)) => "undetermined",
                None => "-",
            };
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                run.target,
                run.run_id,
                run.state,
                protection,
                run.transport.as_deref().unwrap_or("-"),
                run.attempts,
                run.resources
            ));
        }
        md.push('\n');

        let classified: Vec<_> = summary
            .runs
            .iter()
            .filter_map(|run| run.summary.as_ref().map(|s| (run, s)))
            .collect();
        if !classified.is_empty() {
            md.push_str("## Inventories\n\n");
            md.push_str("| Target | Title | Forms | Links | Images | Scripts | Styles |\n");
            md.push_str("|--------|-------|-------|-------|--------|---------|--------|\n");
            for (run, inventory) in classified {
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {} | {} | {} |\n",
                    run.target,
                    inventory.title.as_deref().unwrap_or("-").replace('|', "\\|"),
                    inventory.forms,
                    inventory.links,
                    inventory.images,
                    inventory.scripts,
                    inventory.styles
                ));
            }
            md.push('\n');
        }
    }

    if !summary.unresolved.is_empty() {
        md.push_str("## Unresolved Domains\n\n");
        for entry in &summary.unresolved {
            md.push_str(&format!("- **{}**: {}\n", entry.domain, entry.reason));
        }
        md.push('\n');
    }

    if !summary.skipped.is_empty() {
        md.push_str("## Skipped Domains\n\n");
        for entry in &summary.skipped {
            md.push_str(&format!("- `{}`: {}\n", entry.domain, entry.reason));
        }
        md.push('\n');
    }

    md
}
