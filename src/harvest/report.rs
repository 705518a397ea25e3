//! Human-readable harvest report

use crate::harvest::params::sanitize;
use std::collections::BTreeSet;
use std::fmt::Write;

/// Text stored when the candidate corpus has no parameterized URLs
pub const EMPTY_REPORT: &str = "no URLs found with query parameters";

/// Identifiers printed in the report header
#[derive(Debug, Clone)]
pub struct ReportHeader<'a> {
    pub target_id: i64,
    pub owner: &'a str,
    pub crawl_run_id: Option<i64>,
    pub domain: &'a str,
}

/// Renders the running report after a batch commit
///
/// Parameters are listed sorted and comma-separated, URLs one per line.
/// The whole text is sanitized before it is returned.
pub fn render_report(
    header: &ReportHeader<'_>,
    total_urls: u64,
    parameters: &BTreeSet<String>,
    urls: &[String],
) -> String {
    let mut text = String::new();

    let _ = writeln!(text, "Target ID: {}", header.target_id);
    let _ = writeln!(text, "Owner: {}", header.owner);
    match header.crawl_run_id {
        Some(id) => {
            let _ = writeln!(text, "Crawl run: {}", id);
        }
        None => {
            let _ = writeln!(text, "Crawl run: none");
        }
    }
    let _ = writeln!(text, "Domain: {}", header.domain);
    text.push('\n');
    let _ = writeln!(text, "URLs processed: {}", total_urls);
    let _ = writeln!(text, "Unique parameters: {}", parameters.len());
    text.push('\n');

    text.push_str("Parameters:\n");
    let names: Vec<&str> = parameters.iter().map(String::as_str).collect();
    text.push_str(&names.join(", "));
    text.push_str("\n\n");

    text.push_str("URLs:\n");
    text.push_str(&urls.join("\n"));

    sanitize(&text)
}

/// Report for a corpus without any parameterized URL
pub fn render_empty_report(header: &ReportHeader<'_>) -> String {
    sanitize(&format!("Domain: {}\n\n{}", header.domain, EMPTY_REPORT))
}
