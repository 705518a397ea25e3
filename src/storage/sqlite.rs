//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ArtifactStore trait.

use crate::crawler::{DiscoveredResource, ResourceKind};
use crate::state::{CrawlRunState, HarvestStatus, TargetStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ArtifactStore, StorageError, StorageResult};
use crate::storage::{
    CrawlRunRecord, HarvestRecord, HarvestUpdate, NewHarvest, ResourceRecord, TargetRecord,
};
use crate::KageError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const TARGET_COLUMNS: &str = "id, url, url_no_scheme, owner, status, created_at";

const RUN_COLUMNS: &str =
    "id, target_id, state, config_hash, summary, created_at, completed_at, error_message";

const HARVEST_COLUMNS: &str = "id, target_id, owner, crawl_run_id, exclude, concurrency, status,
     total_urls, unique_parameters, report, error_message, created_at, updated_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database file and applies the schema
    pub fn new(path: &Path) -> Result<Self, KageError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, KageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count(&self, sql: &str, value: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, params![value], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn target_from_row(row: &Row<'_>) -> rusqlite::Result<TargetRecord> {
    Ok(TargetRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        url_no_scheme: row.get(2)?,
        owner: row.get(3)?,
        status: TargetStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(TargetStatus::Pending),
        created_at: row.get(5)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlRunRecord> {
    Ok(CrawlRunRecord {
        id: row.get(0)?,
        target_id: row.get(1)?,
        state: CrawlRunState::from_db_string(&row.get::<_, String>(2)?)
            .unwrap_or(CrawlRunState::Failed),
        config_hash: row.get(3)?,
        summary: row.get(4)?,
        created_at: row.get(5)?,
        completed_at: row.get(6)?,
        error_message: row.get(7)?,
    })
}

fn harvest_from_row(row: &Row<'_>) -> rusqlite::Result<HarvestRecord> {
    Ok(HarvestRecord {
        id: row.get(0)?,
        target_id: row.get(1)?,
        owner: row.get(2)?,
        crawl_run_id: row.get(3)?,
        exclude: row.get(4)?,
        concurrency: row.get(5)?,
        status: HarvestStatus::from_db_string(&row.get::<_, String>(6)?)
            .unwrap_or(HarvestStatus::Error),
        total_urls: row.get::<_, i64>(7)? as u64,
        unique_parameters: row.get::<_, i64>(8)? as u64,
        report: row.get(9)?,
        error_message: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl ArtifactStore for SqliteStorage {
    // ===== Targets =====

    fn register_target(
        &mut self,
        url: &str,
        url_no_scheme: &str,
        owner: &str,
    ) -> StorageResult<i64> {
        if let Some(existing) = self.find_target(url, owner)? {
            return Ok(existing.id);
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO targets (url, url_no_scheme, owner, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                url,
                url_no_scheme,
                owner,
                TargetStatus::Pending.to_db_string(),
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_target(&self, target_id: i64) -> StorageResult<TargetRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM targets WHERE id = ?1", TARGET_COLUMNS),
                params![target_id],
                target_from_row,
            )
            .optional()?
            .ok_or(StorageError::TargetNotFound(target_id))
    }

    fn find_target(&self, url: &str, owner: &str) -> StorageResult<Option<TargetRecord>> {
        let target = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM targets WHERE url = ?1 AND owner = ?2",
                    TARGET_COLUMNS
                ),
                params![url, owner],
                target_from_row,
            )
            .optional()?;
        Ok(target)
    }

    fn update_target_status(&mut self, target_id: i64, status: TargetStatus) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE targets SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), target_id],
        )?;
        if changed == 0 {
            return Err(StorageError::TargetNotFound(target_id));
        }
        Ok(())
    }

    // ===== Crawl runs =====

    fn create_run(&mut self, target_id: i64, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_runs (target_id, state, config_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                target_id,
                CrawlRunState::Created.to_db_string(),
                config_hash,
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<CrawlRunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM crawl_runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self, target_id: i64) -> StorageResult<Option<CrawlRunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM crawl_runs WHERE target_id = ?1 ORDER BY id DESC LIMIT 1",
                    RUN_COLUMNS
                ),
                params![target_id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn update_run_state(
        &mut self,
        run_id: i64,
        state: CrawlRunState,
        error: Option<&str>,
    ) -> StorageResult<()> {
        let current = self.get_run(run_id)?.state;
        if !current.can_transition_to(state) {
            return Err(StorageError::InvalidTransition {
                from: current,
                to: state,
            });
        }

        if state.is_terminal() {
            let now = Utc::now().to_rfc3339();
            self.conn.execute(
                "UPDATE crawl_runs SET state = ?1,
                 error_message = COALESCE(?2, error_message),
                 completed_at = CASE WHEN completed_at IS NULL THEN ?3 ELSE completed_at END
                 WHERE id = ?4",
                params![state.to_db_string(), error, now, run_id],
            )?;
        } else {
            self.conn.execute(
                "UPDATE crawl_runs SET state = ?1 WHERE id = ?2",
                params![state.to_db_string(), run_id],
            )?;
        }
        Ok(())
    }

    fn set_run_summary(&mut self, run_id: i64, summary: &str) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE crawl_runs SET summary = ?1 WHERE id = ?2",
            params![summary, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Resources =====

    fn append_resource(
        &mut self,
        run_id: i64,
        resource: &DiscoveredResource,
        position: usize,
    ) -> StorageResult<i64> {
        let payload = resource.payload()?;
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO resources
             (run_id, kind, url, inline, method, content, payload, position, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run_id,
                resource.kind().to_db_string(),
                resource.url(),
                resource.is_inline(),
                resource.method(),
                resource.content(),
                payload,
                position as i64,
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_resources(&self, run_id: i64) -> StorageResult<Vec<ResourceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, kind, url, inline, method, content, payload, position
             FROM resources WHERE run_id = ?1 ORDER BY position, id",
        )?;

        let resources = stmt
            .query_map(params![run_id], |row| {
                Ok(ResourceRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    kind: ResourceKind::from_db_string(&row.get::<_, String>(2)?)
                        .unwrap_or(ResourceKind::Html),
                    url: row.get(3)?,
                    inline: row.get(4)?,
                    method: row.get(5)?,
                    content: row.get(6)?,
                    payload: row.get(7)?,
                    position: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(resources)
    }

    // ===== Harvest runs =====

    fn create_harvest(&mut self, harvest: &NewHarvest<'_>) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO harvest_runs
             (target_id, owner, crawl_run_id, exclude, concurrency, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                harvest.target_id,
                harvest.owner,
                harvest.crawl_run_id,
                harvest.exclude,
                harvest.concurrency,
                HarvestStatus::Running.to_db_string(),
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_harvest(&mut self, harvest_id: i64, update: &HarvestUpdate<'_>) -> StorageResult<()> {
        if self.get_harvest(harvest_id)?.status.is_terminal() {
            return Err(StorageError::HarvestClosed(harvest_id));
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE harvest_runs SET status = ?1, total_urls = ?2, unique_parameters = ?3,
             report = COALESCE(?4, report), error_message = COALESCE(?5, error_message),
             updated_at = ?6
             WHERE id = ?7",
            params![
                update.status.to_db_string(),
                update.total_urls as i64,
                update.unique_parameters as i64,
                update.report,
                update.error_message,
                now,
                harvest_id
            ],
        )?;
        Ok(())
    }

    fn get_harvest(&self, harvest_id: i64) -> StorageResult<HarvestRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM harvest_runs WHERE id = ?1", HARVEST_COLUMNS),
                params![harvest_id],
                harvest_from_row,
            )
            .optional()?
            .ok_or(StorageError::HarvestNotFound(harvest_id))
    }

    fn get_latest_harvest(&self, target_id: i64) -> StorageResult<Option<HarvestRecord>> {
        let harvest = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM harvest_runs WHERE target_id = ?1 ORDER BY id DESC LIMIT 1",
                    HARVEST_COLUMNS
                ),
                params![target_id],
                harvest_from_row,
            )
            .optional()?;
        Ok(harvest)
    }

    // ===== Statistics =====

    fn count_targets(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM targets", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_runs_by_state(&self, state: CrawlRunState) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM crawl_runs WHERE state = ?1",
            state.to_db_string(),
        )
    }

    fn count_resources_by_kind(&self, kind: ResourceKind) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM resources WHERE kind = ?1",
            kind.to_db_string(),
        )
    }

    fn count_harvests_by_status(&self, status: HarvestStatus) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM harvest_runs WHERE status = ?1",
            status.to_db_string(),
        )
    }
}
