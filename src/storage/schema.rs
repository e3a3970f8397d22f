//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the linkwatch database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per invocation of the creation phase
CREATE TABLE IF NOT EXISTS batches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    index_watermark TEXT,
    datasets_seen INTEGER,
    already_running INTEGER,
    not_indexed INTEGER,
    no_links INTEGER,
    runs_created INTEGER,
    links_created INTEGER,
    finished_at TEXT
);

-- Dataset metadata, refreshed whenever a run is created
CREATE TABLE IF NOT EXISTS datasets (
    id TEXT PRIMARY KEY,
    name TEXT,
    provider TEXT,
    country TEXT,
    indexed_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- A sampling of one dataset within a batch
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dataset_id TEXT NOT NULL REFERENCES datasets(id),
    batch_id INTEGER NOT NULL REFERENCES batches(id),
    started_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_dataset ON runs(dataset_id);
CREATE INDEX IF NOT EXISTS idx_runs_batch ON runs(batch_id);

-- Links sampled by a run; checked_at stays NULL until probed
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    record_id TEXT NOT NULL,
    link_type TEXT NOT NULL,
    url TEXT NOT NULL,
    host TEXT,
    error TEXT,
    checked_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_links_checked ON links(checked_at);
CREATE INDEX IF NOT EXISTS idx_links_url ON links(url);
CREATE INDEX IF NOT EXISTS idx_links_run ON links(run_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
