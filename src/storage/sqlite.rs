//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::catalog::Dataset;
use crate::state::{CheckingResult, LinkType};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{LinkStore, RunStore, StorageError, StorageResult};
use crate::storage::{BatchCounts, BatchRecord, LinkRecord, LinkTotals, NewLink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Number of links fetched per query while streaming unchecked links
const PAGE_SIZE: i64 = 256;

const LINK_COLUMNS: &str =
    "l.id, l.run_id, l.record_id, l.link_type, l.url, l.host, l.error, l.checked_at";

const BATCH_COLUMNS: &str = "id, created_at, config_hash, index_watermark, datasets_seen, \
     already_running, not_indexed, no_links, runs_created, links_created, finished_at";

/// SQLite storage backend
///
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
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

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        lock_connection(&self.conn)
    }

    /// Runs a write on the blocking pool so lock contention and disk I/O
    /// stay off the async workers
    async fn with_connection<T, F>(&self, write: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock_connection(&conn)?;
            write(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Database(format!("storage task failed: {}", e)))?
    }

    // ===== Batch Queries =====

    /// Gets a batch by ID
    pub fn get_batch(&self, batch_id: i64) -> StorageResult<BatchRecord> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM batches WHERE id = ?1", BATCH_COLUMNS),
            params![batch_id],
            batch_from_row,
        )
        .optional()?
        .ok_or(StorageError::BatchNotFound(batch_id))
    }

    /// Gets the most recent batch
    pub fn get_latest_batch(&self) -> StorageResult<Option<BatchRecord>> {
        let conn = self.lock()?;
        let batch = conn
            .query_row(
                &format!("SELECT {} FROM batches ORDER BY id DESC LIMIT 1", BATCH_COLUMNS),
                [],
                batch_from_row,
            )
            .optional()?;
        Ok(batch)
    }

    // ===== Link Queries =====

    /// Gets all links of a run, in creation order
    pub fn links_for_run(&self, run_id: i64) -> StorageResult<Vec<LinkRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM links l WHERE l.run_id = ?1 ORDER BY l.id",
            LINK_COLUMNS
        ))?;

        let links = stmt
            .query_map(params![run_id], link_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    /// Gets failed links, optionally limited to one batch
    pub fn failed_links(
        &self,
        batch_id: Option<i64>,
        limit: usize,
    ) -> StorageResult<Vec<LinkRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM links l JOIN runs r ON r.id = l.run_id
             WHERE l.error IS NOT NULL AND l.checked_at IS NOT NULL
               AND (?1 IS NULL OR r.batch_id = ?1)
             ORDER BY l.id LIMIT ?2",
            LINK_COLUMNS
        ))?;

        let links = stmt
            .query_map(params![batch_id, limit as i64], link_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    // ===== Statistics =====

    /// Counts links by outcome, optionally limited to one batch
    pub fn link_totals(&self, batch_id: Option<i64>) -> StorageResult<LinkTotals> {
        let conn = self.lock()?;
        let totals = conn.query_row(
            "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN l.checked_at IS NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN l.checked_at IS NOT NULL AND l.error IS NULL
                    THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN l.checked_at IS NOT NULL AND l.error IS NOT NULL
                    THEN 1 ELSE 0 END), 0)
             FROM links l JOIN runs r ON r.id = l.run_id
             WHERE (?1 IS NULL OR r.batch_id = ?1)",
            params![batch_id],
            |row| {
                Ok(LinkTotals {
                    total: row.get::<_, i64>(0)? as u64,
                    unchecked: row.get::<_, i64>(1)? as u64,
                    succeeded: row.get::<_, i64>(2)? as u64,
                    failed: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(totals)
    }

    /// Gets the hosts with the most failed links
    ///
    /// Returns (host, failed link count) pairs, most failures first.
    pub fn failing_hosts(
        &self,
        batch_id: Option<i64>,
        limit: usize,
    ) -> StorageResult<Vec<(String, u64)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT COALESCE(l.host, '(unknown)') AS h, COUNT(*) AS count
             FROM links l JOIN runs r ON r.id = l.run_id
             WHERE l.error IS NOT NULL AND l.checked_at IS NOT NULL
               AND (?1 IS NULL OR r.batch_id = ?1)
             GROUP BY h ORDER BY count DESC, h LIMIT ?2",
        )?;

        let hosts = stmt
            .query_map(params![batch_id, limit as i64], |row| {
                Ok((row.get(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hosts)
    }

    /// Gets total dataset count
    pub fn count_datasets(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM datasets")
    }

    /// Gets total run count
    pub fn count_runs(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM runs")
    }

    /// Counts runs that still own unchecked links
    pub fn count_active_runs(&self) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(DISTINCT run_id) FROM links WHERE checked_at IS NULL",
        )
    }

    /// Gets total batch count
    pub fn count_batches(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM batches")
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn lock_connection(conn: &Mutex<Connection>) -> StorageResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<LinkRecord> {
    let link_type: String = row.get(3)?;
    let link_type = LinkType::from_db_string(&link_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown link type: {}", link_type).into(),
        )
    })?;

    Ok(LinkRecord {
        id: row.get(0)?,
        run_id: row.get(1)?,
        record_id: row.get(2)?,
        link_type,
        url: row.get(4)?,
        host: row.get(5)?,
        result: CheckingResult::from_columns(row.get(6)?, parse_timestamp(row.get(7)?)),
    })
}

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<BatchRecord> {
    let runs_created: Option<i64> = row.get(8)?;
    let counts = match runs_created {
        Some(runs_created) => {
            let counter = |idx: usize| -> rusqlite::Result<u64> {
                Ok(row.get::<_, Option<i64>>(idx)?.unwrap_or(0) as u64)
            };
            Some(BatchCounts {
                datasets_seen: counter(4)?,
                already_running: counter(5)?,
                not_indexed: counter(6)?,
                no_links: counter(7)?,
                runs_created: runs_created as u64,
                links_created: counter(9)?,
            })
        }
        None => None,
    };

    Ok(BatchRecord {
        id: row.get(0)?,
        created_at: row.get(1)?,
        config_hash: row.get(2)?,
        index_watermark: row.get(3)?,
        counts,
        finished_at: row.get(10)?,
    })
}

/// Keyset cursor over distinct unchecked URLs
struct UncheckedCursor {
    conn: Arc<Mutex<Connection>>,
    after: i64,
    buffered: VecDeque<LinkRecord>,
    done: bool,
}

impl UncheckedCursor {
    /// Loads the next page; yields the lowest-id unchecked link per URL
    fn fetch_page(&mut self) -> StorageResult<()> {
        let conn = lock_connection(&self.conn)?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM links l
             WHERE l.checked_at IS NULL AND l.id > ?1
               AND NOT EXISTS (
                   SELECT 1 FROM links d
                   WHERE d.url = l.url AND d.checked_at IS NULL AND d.id < l.id
               )
             ORDER BY l.id LIMIT ?2",
            LINK_COLUMNS
        ))?;

        let page = stmt
            .query_map(params![self.after, PAGE_SIZE], link_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        if (page.len() as i64) < PAGE_SIZE {
            self.done = true;
        }
        if let Some(last) = page.last() {
            self.after = last.id;
        }
        self.buffered.extend(page);
        Ok(())
    }
}

#[async_trait]
impl LinkStore for SqliteStorage {
    fn stream_unchecked(&self) -> BoxStream<'static, StorageResult<LinkRecord>> {
        let cursor = UncheckedCursor {
            conn: Arc::clone(&self.conn),
            after: 0,
            buffered: VecDeque::new(),
            done: false,
        };

        stream::unfold(cursor, |mut cursor| async move {
            loop {
                if let Some(link) = cursor.buffered.pop_front() {
                    return Some((Ok(link), cursor));
                }
                if cursor.done {
                    return None;
                }
                if let Err(e) = cursor.fetch_page() {
                    cursor.done = true;
                    return Some((Err(e), cursor));
                }
            }
        })
        .boxed()
    }

    async fn record_result(&self, url: &str, error: Option<&str>) -> StorageResult<u64> {
        let now = Utc::now().to_rfc3339();
        let url = url.to_string();
        let error = error.map(str::to_string);
        self.with_connection(move |conn| {
            let updated = conn.execute(
                "UPDATE links SET error = ?1, checked_at = ?2
                 WHERE url = ?3 AND checked_at IS NULL",
                params![error, now, url],
            )?;
            Ok(updated as u64)
        })
        .await
    }
}

#[async_trait]
impl RunStore for SqliteStorage {
    async fn has_active_run(&self, dataset_id: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let active: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM runs r JOIN links l ON l.run_id = r.id
                WHERE r.dataset_id = ?1 AND l.checked_at IS NULL
             )",
            params![dataset_id],
            |row| row.get(0),
        )?;
        Ok(active)
    }

    async fn upsert_dataset(&self, dataset: &Dataset) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO datasets (id, name, provider, country, indexed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                provider = excluded.provider,
                country = excluded.country,
                indexed_at = excluded.indexed_at,
                updated_at = excluded.updated_at",
            params![
                dataset.id,
                dataset.name,
                dataset.provider,
                dataset.country,
                dataset.indexed_at.to_rfc3339(),
                now
            ],
        )?;
        Ok(())
    }

    async fn create_run(&self, dataset_id: &str, batch_id: i64) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs (dataset_id, batch_id, started_at) VALUES (?1, ?2, ?3)",
            params![dataset_id, batch_id, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn create_links(&self, run_id: i64, links: &[NewLink]) -> StorageResult<u64> {
        let links = links.to_vec();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO links (run_id, record_id, link_type, url, host)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for link in &links {
                    stmt.execute(params![
                        run_id,
                        link.record_id,
                        link.link_type.to_db_string(),
                        link.url,
                        link.host
                    ])?;
                }
            }
            tx.commit()?;
            Ok(links.len() as u64)
        })
        .await
    }

    async fn create_batch(
        &self,
        index_watermark: Option<DateTime<Utc>>,
        config_hash: &str,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO batches (created_at, config_hash, index_watermark) VALUES (?1, ?2, ?3)",
            params![now, config_hash, index_watermark.map(|w| w.to_rfc3339())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn finish_batch(&self, batch_id: i64, counts: &BatchCounts) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE batches SET datasets_seen = ?1, already_running = ?2, not_indexed = ?3,
                no_links = ?4, runs_created = ?5, links_created = ?6, finished_at = ?7
             WHERE id = ?8 AND finished_at IS NULL",
            params![
                counts.datasets_seen as i64,
                counts.already_running as i64,
                counts.not_indexed as i64,
                counts.no_links as i64,
                counts.runs_created as i64,
                counts.links_created as i64,
                now,
                batch_id
            ],
        )?;

        if updated == 1 {
            return Ok(());
        }

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM batches WHERE id = ?1)",
            params![batch_id],
            |row| row.get(0),
        )?;
        if exists {
            Err(StorageError::ConstraintViolation(format!(
                "counters for batch {} were already written",
                batch_id
            )))
        } else {
            Err(StorageError::BatchNotFound(batch_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn dataset(id: &str) -> Dataset {
        Dataset {
            id: id.to_string(),
            name: Some("Test dataset".to_string()),
            provider: None,
            country: None,
            indexed_at: Utc::now(),
        }
    }

    fn link(record_id: &str, link_type: LinkType, url: &str) -> NewLink {
        NewLink {
            record_id: record_id.to_string(),
            link_type,
            url: url.to_string(),
            host: crate::url::extract_host(url),
        }
    }

    async fn run_with_links(storage: &SqliteStorage, dataset_id: &str, links: &[NewLink]) -> i64 {
        let batch_id = storage.create_batch(None, "hash").await.unwrap();
        storage.upsert_dataset(&dataset(dataset_id)).await.unwrap();
        let run_id = storage.create_run(dataset_id, batch_id).await.unwrap();
        storage.create_links(run_id, links).await.unwrap();
        run_id
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[tokio::test]
    async fn test_create_batch() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let watermark = Utc::now();
        let batch_id = storage.create_batch(Some(watermark), "abc").await.unwrap();
        assert!(batch_id > 0);

        let batch = storage.get_batch(batch_id).unwrap();
        assert_eq!(batch.config_hash, "abc");
        assert_eq!(batch.index_watermark, Some(watermark.to_rfc3339()));
        assert!(batch.counts.is_none());
        assert!(batch.finished_at.is_none());
    }

    #[tokio::test]
    async fn test_finish_batch_writes_counters_once() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let batch_id = storage.create_batch(None, "abc").await.unwrap();
        let counts = BatchCounts {
            datasets_seen: 4,
            already_running: 1,
            not_indexed: 1,
            no_links: 0,
            runs_created: 2,
            links_created: 7,
        };

        storage.finish_batch(batch_id, &counts).await.unwrap();
        let batch = storage.get_batch(batch_id).unwrap();
        assert_eq!(batch.counts, Some(counts));
        assert!(batch.finished_at.is_some());

        let second = storage.finish_batch(batch_id, &BatchCounts::default()).await;
        assert!(matches!(second, Err(StorageError::ConstraintViolation(_))));
        assert_eq!(storage.get_batch(batch_id).unwrap().counts, Some(counts));
    }

    #[tokio::test]
    async fn test_finish_missing_batch() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.finish_batch(99, &BatchCounts::default()).await;
        assert!(matches!(result, Err(StorageError::BatchNotFound(99))));
    }

    #[test]
    fn test_get_missing_batch() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(storage.get_batch(7), Err(StorageError::BatchNotFound(7))));
        assert!(storage.get_latest_batch().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_dataset_refreshes_metadata() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let mut ds = dataset("ds-1");
        storage.upsert_dataset(&ds).await.unwrap();

        ds.name = Some("Renamed".to_string());
        storage.upsert_dataset(&ds).await.unwrap();

        assert_eq!(storage.count_datasets().unwrap(), 1);
        let conn = storage.lock().unwrap();
        let name: String = conn
            .query_row("SELECT name FROM datasets WHERE id = 'ds-1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "Renamed");
    }

    #[tokio::test]
    async fn test_active_run_until_all_links_checked() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let links = vec![
            link("r1", LinkType::ShownAt, "https://a.example/1"),
            link("r1", LinkType::ShownBy, "https://b.example/1.jpg"),
        ];
        run_with_links(&storage, "ds-1", &links).await;

        assert!(storage.has_active_run("ds-1").await.unwrap());
        assert!(!storage.has_active_run("ds-2").await.unwrap());

        storage.record_result("https://a.example/1", None).await.unwrap();
        assert!(storage.has_active_run("ds-1").await.unwrap());

        storage
            .record_result("https://b.example/1.jpg", Some("HTTP 404"))
            .await
            .unwrap();
        assert!(!storage.has_active_run("ds-1").await.unwrap());
        assert_eq!(storage.count_active_runs().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_links_stores_unchecked() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let links = vec![
            link("r1", LinkType::ShownAt, "https://a.example/1"),
            link("r2", LinkType::ShownBy, "https://B.example/2.jpg"),
        ];
        let run_id = run_with_links(&storage, "ds-1", &links).await;

        let stored = storage.links_for_run(run_id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].link_type, LinkType::ShownAt);
        assert_eq!(stored[1].host.as_deref(), Some("b.example"));
        assert!(stored.iter().all(|l| l.result == CheckingResult::Unchecked));
    }

    #[tokio::test]
    async fn test_stream_yields_each_url_once() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let links = vec![
            link("r1", LinkType::ShownAt, "https://a.example/same"),
            link("r1", LinkType::ShownBy, "https://a.example/same"),
            link("r2", LinkType::ShownAt, "https://a.example/other"),
        ];
        let run_id = run_with_links(&storage, "ds-1", &links).await;

        let streamed: Vec<LinkRecord> = storage.stream_unchecked().try_collect().await.unwrap();
        let urls: Vec<&str> = streamed.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/same", "https://a.example/other"]);

        let updated = storage
            .record_result("https://a.example/same", Some("timed out"))
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let stored = storage.links_for_run(run_id).unwrap();
        assert!(stored[0].result.is_failure());
        assert!(stored[1].result.is_failure());
        assert!(!stored[2].result.is_checked());
    }

    #[tokio::test]
    async fn test_record_result_is_write_once() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let links = vec![link("r1", LinkType::ShownAt, "https://a.example/1")];
        let run_id = run_with_links(&storage, "ds-1", &links).await;

        assert_eq!(storage.record_result("https://a.example/1", None).await.unwrap(), 1);
        assert_eq!(
            storage.record_result("https://a.example/1", Some("late")).await.unwrap(),
            0
        );

        let stored = storage.links_for_run(run_id).unwrap();
        assert!(stored[0].result.is_checked());
        assert!(!stored[0].result.is_failure());
    }

    #[tokio::test]
    async fn test_stream_spans_multiple_pages() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let links: Vec<NewLink> = (0..600)
            .map(|i| link("r", LinkType::ShownAt, &format!("https://h{}.example/{}", i % 7, i)))
            .collect();
        run_with_links(&storage, "ds-1", &links).await;

        let streamed: Vec<LinkRecord> = storage.stream_unchecked().try_collect().await.unwrap();
        assert_eq!(streamed.len(), 600);
        assert!(streamed.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_stream_drained_by_more_workers_than_links() {
        use crate::engine::ParallelRunner;
        use crate::LinkwatchError;
        use tokio_util::sync::CancellationToken;

        let storage = SqliteStorage::new_in_memory().unwrap();
        let links = vec![
            link("r1", LinkType::ShownAt, "https://a.example/1"),
            link("r2", LinkType::ShownAt, "https://b.example/2"),
            link("r3", LinkType::ShownBy, "https://c.example/3"),
        ];
        run_with_links(&storage, "ds-1", &links).await;

        let runner = ParallelRunner::new(8, CancellationToken::new());
        let store = storage.clone();
        let result: Result<(), LinkwatchError> = runner
            .run(
                storage.stream_unchecked().map_err(LinkwatchError::from),
                move |link: LinkRecord| {
                    let store = store.clone();
                    async move {
                        store.record_result(&link.url, None).await?;
                        Ok(())
                    }
                },
            )
            .await;

        assert!(result.is_ok(), "unexpected error: {:?}", result);
        assert_eq!(storage.link_totals(None).unwrap().succeeded, 3);
        assert_eq!(storage.count_active_runs().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stream_skips_checked_links() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let links = vec![
            link("r1", LinkType::ShownAt, "https://a.example/1"),
            link("r2", LinkType::ShownAt, "https://a.example/2"),
        ];
        run_with_links(&storage, "ds-1", &links).await;
        storage.record_result("https://a.example/1", None).await.unwrap();

        let streamed: Vec<LinkRecord> = storage.stream_unchecked().try_collect().await.unwrap();
        assert_eq!(streamed.len(), 1);
        assert_eq!(streamed[0].url, "https://a.example/2");
    }

    #[tokio::test]
    async fn test_link_totals_and_failing_hosts() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let links = vec![
            link("r1", LinkType::ShownAt, "https://a.example/1"),
            link("r2", LinkType::ShownAt, "https://a.example/2"),
            link("r3", LinkType::ShownAt, "https://b.example/3"),
            link("r4", LinkType::ShownAt, "https://c.example/4"),
        ];
        run_with_links(&storage, "ds-1", &links).await;

        storage.record_result("https://a.example/1", Some("HTTP 500")).await.unwrap();
        storage.record_result("https://a.example/2", Some("HTTP 500")).await.unwrap();
        storage.record_result("https://b.example/3", None).await.unwrap();

        let totals = storage.link_totals(None).unwrap();
        assert_eq!(
            totals,
            LinkTotals {
                total: 4,
                unchecked: 1,
                succeeded: 1,
                failed: 2,
            }
        );
        assert_eq!(totals.checked(), 3);

        let hosts = storage.failing_hosts(None, 10).unwrap();
        assert_eq!(hosts, vec![("a.example".to_string(), 2)]);

        let failed = storage.failed_links(None, 10).unwrap();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].result.error(), Some("HTTP 500"));
    }

    #[tokio::test]
    async fn test_link_totals_scoped_to_batch() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let first = [link("r1", LinkType::ShownAt, "https://a.example/1")];
        let second = [link("r2", LinkType::ShownAt, "https://a.example/2")];
        run_with_links(&storage, "ds-1", &first).await;
        run_with_links(&storage, "ds-2", &second).await;

        let latest = storage.get_latest_batch().unwrap().unwrap();
        assert_eq!(storage.link_totals(Some(latest.id)).unwrap().total, 1);
        assert_eq!(storage.link_totals(None).unwrap().total, 2);
        assert_eq!(storage.count_batches().unwrap(), 2);
        assert_eq!(storage.count_runs().unwrap(), 2);
    }
}
