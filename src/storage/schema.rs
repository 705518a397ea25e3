//! Database schema for the artifact store

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Hosts under reconnaissance
CREATE TABLE IF NOT EXISTS targets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    url_no_scheme TEXT NOT NULL,
    owner TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(url, owner)
);

-- One crawl attempt per row
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL REFERENCES targets(id),
    state TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    summary TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_runs_target ON crawl_runs(target_id);
CREATE INDEX IF NOT EXISTS idx_crawl_runs_state ON crawl_runs(state);

-- Classified resources, kept in document order per run
CREATE TABLE IF NOT EXISTS resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES crawl_runs(id),
    kind TEXT NOT NULL,
    url TEXT NOT NULL,
    inline INTEGER NOT NULL DEFAULT 0,
    method TEXT,
    content TEXT,
    payload TEXT,
    position INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_resources_run ON resources(run_id, position);
CREATE INDEX IF NOT EXISTS idx_resources_kind ON resources(kind);

-- Parameter discovery passes
CREATE TABLE IF NOT EXISTS harvest_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL REFERENCES targets(id),
    owner TEXT NOT NULL,
    crawl_run_id INTEGER REFERENCES crawl_runs(id),
    exclude TEXT NOT NULL DEFAULT '',
    concurrency INTEGER NOT NULL,
    status TEXT NOT NULL,
    total_urls INTEGER NOT NULL DEFAULT 0,
    unique_parameters INTEGER NOT NULL DEFAULT 0,
    report TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_harvest_runs_target ON harvest_runs(target_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
