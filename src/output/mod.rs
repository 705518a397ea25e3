//! Output module for reports and statistics
//!
//! This module handles:
//! - Markdown summaries of crawl batches
//! - Store-wide statistics

mod markdown;
pub mod stats;

pub use markdown::{format_crawl_summary, write_crawl_summary};
pub use stats::{load_statistics, print_statistics, ReconStatistics};
