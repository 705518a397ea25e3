//! Query parameter harvesting over large URL corpora
//!
//! # Components
//!
//! - `CandidateSource`: where the corpus comes from (file, list, archive CDX)
//! - `ParameterHarvester`: sequential batches with a committed update per batch
//! - report rendering and text sanitization

mod harvester;
mod params;
mod report;
mod source;

pub use harvester::{HarvestContext, HarvestResult, ParameterHarvester, DEFAULT_BATCH_SIZE};
pub use params::{extract_parameter_names, process_batch, sanitize, BatchExtraction};
pub use report::{render_empty_report, render_report, ReportHeader, EMPTY_REPORT};
pub use source::{
    CandidateSource, ExclusionFilter, FileCandidates, StaticCandidates, WaybackCandidates,
};
