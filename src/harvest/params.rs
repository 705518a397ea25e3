//! Query parameter extraction

use std::collections::BTreeSet;
use unicode_general_category::{get_general_category, GeneralCategory};

/// Strips non-printable characters, keeping newline, carriage return and tab
///
/// Non-printable means control, format, surrogate, private-use, unassigned,
/// and every separator except the ASCII space.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|&c| matches!(c, '\n' | '\r' | '\t') || is_printable(c))
        .collect()
}

fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    !matches!(
        get_general_category(c),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Surrogate
            | GeneralCategory::PrivateUse
            | GeneralCategory::Unassigned
            | GeneralCategory::SpaceSeparator
            | GeneralCategory::LineSeparator
            | GeneralCategory::ParagraphSeparator
    )
}

/// Returns parameter names of one URL, in order of appearance
///
/// The query is the text after the first `?` (up to any later `?`); each
/// `&`-separated piece contributes the text before its first `=`. Empty
/// names are discarded.
pub fn extract_parameter_names(url: &str) -> Vec<String> {
    let Some(query) = url.split('?').nth(1) else {
        return Vec::new();
    };

    query
        .split('&')
        .filter_map(|pair| pair.split('=').next())
        .map(sanitize)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Outcome of processing one batch of candidates
#[derive(Debug, Default)]
pub struct BatchExtraction {
    /// Sanitized URLs that carry a query string
    pub urls: Vec<String>,
    pub parameters: BTreeSet<String>,
}

/// Extracts parameters from a batch
///
/// A candidate that sanitizes to nothing is skipped without affecting the
/// rest of the batch.
pub fn process_batch(candidates: &[String]) -> BatchExtraction {
    let mut extraction = BatchExtraction::default();

    for candidate in candidates {
        let url = sanitize(candidate.trim());
        if url.is_empty() || !url.contains('?') {
            continue;
        }
        extraction.parameters.extend(extract_parameter_names(&url));
        extraction.urls.push(url);
    }

    extraction
}
