//! State module for run lifecycles
//!
//! # Components
//!
//! - `CrawlRunState`: created, fetching, parsing, then completed or failed
//! - `TargetStatus`: pending, active, done
//! - `HarvestStatus`: running, processing, then completed or error

mod harvest_state;
mod run_state;

pub use harvest_state::HarvestStatus;
pub use run_state::{CrawlRunState, TargetStatus};
