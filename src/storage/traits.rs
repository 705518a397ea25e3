//! Artifact store contract and error types

use crate::crawler::{DiscoveredResource, ResourceKind};
use crate::state::{CrawlRunState, HarvestStatus, TargetStatus};
use crate::storage::{
    CrawlRunRecord, HarvestRecord, HarvestUpdate, NewHarvest, ResourceRecord, TargetRecord,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Target not found: {0}")]
    TargetNotFound(i64),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Harvest run not found: {0}")]
    HarvestNotFound(i64),

    #[error("Invalid run transition: {from} -> {to}")]
    InvalidTransition {
        from: CrawlRunState,
        to: CrawlRunState,
    },

    #[error("Harvest run {0} is already terminal")]
    HarvestClosed(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Narrow read/write contract shared by the orchestrator and the harvester
///
/// Each run owns its own row; callers serialize access per store handle.
pub trait ArtifactStore {
    // ===== Targets =====

    /// Registers a target, returning the existing id if the
    /// (url, owner) pair is already known
    fn register_target(&mut self, url: &str, url_no_scheme: &str, owner: &str)
        -> StorageResult<i64>;

    fn get_target(&self, target_id: i64) -> StorageResult<TargetRecord>;

    fn find_target(&self, url: &str, owner: &str) -> StorageResult<Option<TargetRecord>>;

    fn update_target_status(&mut self, target_id: i64, status: TargetStatus) -> StorageResult<()>;

    // ===== Crawl runs =====

    /// Creates a run in the `created` state
    fn create_run(&mut self, target_id: i64, config_hash: &str) -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<CrawlRunRecord>;

    /// Most recent run for a target
    fn get_latest_run(&self, target_id: i64) -> StorageResult<Option<CrawlRunRecord>>;

    /// Moves a run to `state`, rejecting illegal transitions
    ///
    /// The completion timestamp is written once, on the first terminal
    /// transition; `error` is recorded alongside.
    fn update_run_state(
        &mut self,
        run_id: i64,
        state: CrawlRunState,
        error: Option<&str>,
    ) -> StorageResult<()>;

    /// Stores the inventory summary JSON for a run
    fn set_run_summary(&mut self, run_id: i64, summary: &str) -> StorageResult<()>;

    // ===== Resources =====

    /// Appends one resource at `position` within the run
    fn append_resource(
        &mut self,
        run_id: i64,
        resource: &DiscoveredResource,
        position: usize,
    ) -> StorageResult<i64>;

    /// Resources of a run in persistence order
    fn list_resources(&self, run_id: i64) -> StorageResult<Vec<ResourceRecord>>;

    // ===== Harvest runs =====

    /// Creates a harvest run in the `running` state
    fn create_harvest(&mut self, harvest: &NewHarvest<'_>) -> StorageResult<i64>;

    /// Commits a status/totals update and advances `updated_at`
    fn update_harvest(&mut self, harvest_id: i64, update: &HarvestUpdate<'_>) -> StorageResult<()>;

    fn get_harvest(&self, harvest_id: i64) -> StorageResult<HarvestRecord>;

    fn get_latest_harvest(&self, target_id: i64) -> StorageResult<Option<HarvestRecord>>;

    // ===== Statistics =====

    fn count_targets(&self) -> StorageResult<u64>;

    fn count_runs_by_state(&self, state: CrawlRunState) -> StorageResult<u64>;

    fn count_resources_by_kind(&self, kind: ResourceKind) -> StorageResult<u64>;

    fn count_harvests_by_status(&self, status: HarvestStatus) -> StorageResult<u64>;
}
