//! Storage module for persisting reconnaissance artifacts
//!
//! This module handles all database operations, including:
//! - Target registration and lifecycle
//! - Crawl runs and their resource inventories
//! - Harvest runs with incrementally committed totals

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ArtifactStore, StorageError, StorageResult};

use crate::crawler::ResourceKind;
use crate::state::{CrawlRunState, HarvestStatus, TargetStatus};
use crate::KageError;
use serde::Serialize;
use std::path::Path;

/// Opens (or creates) the artifact store at `path`
pub fn open_storage(path: &Path) -> Result<SqliteStorage, KageError> {
    SqliteStorage::new(path)
}

/// Represents a target in the database
#[derive(Debug, Clone, Serialize)]
pub struct TargetRecord {
    pub id: i64,
    pub url: String,
    pub url_no_scheme: String,
    pub owner: String,
    pub status: TargetStatus,
    pub created_at: String,
}

/// Represents a crawl run
#[derive(Debug, Clone, Serialize)]
pub struct CrawlRunRecord {
    pub id: i64,
    pub target_id: i64,
    pub state: CrawlRunState,
    pub config_hash: String,
    pub summary: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
}

/// Represents a persisted resource
#[derive(Debug, Clone, Serialize)]
pub struct ResourceRecord {
    pub id: i64,
    pub run_id: i64,
    pub kind: ResourceKind,
    /// Absolute URL, or the synthetic anchor of inline content
    pub url: String,
    pub inline: bool,
    pub method: Option<String>,
    pub content: Option<String>,
    pub payload: Option<String>,
    pub position: u32,
}

/// Represents a harvest run
#[derive(Debug, Clone, Serialize)]
pub struct HarvestRecord {
    pub id: i64,
    pub target_id: i64,
    pub owner: String,
    pub crawl_run_id: Option<i64>,
    pub exclude: String,
    pub concurrency: u32,
    pub status: HarvestStatus,
    pub total_urls: u64,
    pub unique_parameters: u64,
    pub report: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields of a harvest run fixed at creation
#[derive(Debug, Clone)]
pub struct NewHarvest<'a> {
    pub target_id: i64,
    pub owner: &'a str,
    pub crawl_run_id: Option<i64>,
    pub exclude: &'a str,
    pub concurrency: u32,
}

/// One committed harvest update
#[derive(Debug, Clone)]
pub struct HarvestUpdate<'a> {
    pub status: HarvestStatus,
    pub total_urls: u64,
    pub unique_parameters: u64,
    /// Replaces the stored report when present
    pub report: Option<&'a str>,
    pub error_message: Option<&'a str>,
}
