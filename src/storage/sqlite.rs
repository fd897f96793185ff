// SQLite storage backend
// Author: kelexine (https://github.com/kelexine)
//
// One row per entry plus a small key/value table for the counters that cannot
// be derived from the rows alone. Filtering, ordering and limiting for `list`
// are pushed into SQL instead of materializing every row. The entry count and
// on-disk size are always derived fresh (`COUNT(*)`, file metadata) so they
// cannot drift from the actual table contents.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::storage::entry::{CacheEntry, CacheStats, StatsPatch};
use crate::storage::snapshot::{CacheSnapshot, ImportStrategy, SnapshotMeta};
use crate::storage::{
    BackendKind, ClearOptions, InitOutcome, ListOptions, SortBy, StorageBackend, SQLITE_STORE_FILE,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    hash TEXT PRIMARY KEY,
    prompt TEXT NOT NULL,
    response TEXT NOT NULL,
    model TEXT NOT NULL,
    created INTEGER NOT NULL,
    hits INTEGER NOT NULL DEFAULT 0,
    tokens INTEGER NOT NULL,
    expires INTEGER,
    tags TEXT
);

CREATE INDEX IF NOT EXISTS idx_entries_model ON entries(model);
CREATE INDEX IF NOT EXISTS idx_entries_created ON entries(created);

CREATE TABLE IF NOT EXISTS stats (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;

const ENTRY_COLUMNS: &str = "hash, prompt, response, model, created, hits, tokens, expires, tags";

/// Storage backend persisting to a `cache.db` SQLite database.
pub struct SqliteBackend {
    path: PathBuf,
}

impl SqliteBackend {
    /// Create a handle for the store inside `dir`. Nothing is touched on disk
    /// until `init` or the first operation.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(SQLITE_STORE_FILE),
        }
    }

    /// Path of the database file.
    pub fn store_path(&self) -> &Path {
        &self.path
    }

    /// Open the database without creating it. A missing file, or a present
    /// file that is not a database with our schema (truncated, foreign),
    /// surfaces as `NotInitialized`.
    fn open(&self) -> Result<Connection> {
        if !self.path.exists() {
            return Err(StoreError::NotInitialized);
        }

        let conn = match Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        ) {
            Ok(conn) => conn,
            Err(err) => {
                warn!("cache database unreadable, treating as uninitialized: {}", err);
                return Err(StoreError::NotInitialized);
            }
        };

        if let Err(err) = conn.prepare("SELECT hash FROM entries LIMIT 1") {
            warn!("cache database unusable, treating as uninitialized: {}", err);
            return Err(StoreError::NotInitialized);
        }

        Ok(conn)
    }

    /// Byte length of the database file.
    fn disk_size(&self) -> u64 {
        fs::metadata(&self.path).map(|meta| meta.len()).unwrap_or(0)
    }

    fn stats_with(&self, conn: &Connection) -> Result<CacheStats> {
        let total_entries: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(CacheStats {
            total_entries: total_entries.max(0) as u64,
            total_hits: stat_value(conn, "total_hits")?,
            total_saved: stat_value(conn, "total_saved")?,
            cache_size: self.disk_size(),
        })
    }
}

fn stat_value(conn: &Connection, key: &str) -> Result<u64> {
    let value: Option<i64> = conn
        .query_row("SELECT value FROM stats WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    Ok(value.unwrap_or(0).max(0) as u64)
}

fn set_stat(conn: &Connection, key: &str, value: u64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO stats (key, value) VALUES (?1, ?2)",
        params![key, value as i64],
    )?;
    Ok(())
}

/// Hit count and response byte length of one row, the two numbers the
/// aggregate counters are built from.
fn row_contribution(conn: &Connection, hash: &str) -> Result<Option<(u64, u64)>> {
    let row = conn
        .query_row(
            "SELECT hits, response FROM entries WHERE hash = ?1",
            params![hash],
            |row| {
                let hits: i64 = row.get(0)?;
                let response: String = row.get(1)?;
                Ok((hits.max(0) as u64, response.len() as u64))
            },
        )
        .optional()?;
    Ok(row)
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    let created: i64 = row.get("created")?;
    let expires: Option<i64> = row.get("expires")?;
    let tags: Option<String> = row.get("tags")?;
    Ok(CacheEntry {
        prompt: row.get("prompt")?,
        response: row.get("response")?,
        model: row.get("model")?,
        created: DateTime::from_timestamp_millis(created).unwrap_or_default(),
        hits: row.get::<_, i64>("hits")?.max(0) as u64,
        tokens: row.get::<_, i64>("tokens")?.max(0) as u64,
        expires: expires.and_then(DateTime::from_timestamp_millis),
        tags: tags.and_then(|raw| serde_json::from_str(&raw).ok()),
    })
}

fn row_to_pair(row: &Row<'_>) -> rusqlite::Result<(String, CacheEntry)> {
    Ok((row.get("hash")?, row_to_entry(row)?))
}

fn insert_entry(conn: &Connection, hash: &str, entry: &CacheEntry) -> Result<()> {
    let tags = entry.tags.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT OR REPLACE INTO entries (hash, prompt, response, model, created, hits, tokens, expires, tags) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            hash,
            entry.prompt,
            entry.response,
            entry.model,
            entry.created.timestamp_millis(),
            entry.hits as i64,
            entry.tokens as i64,
            entry.expires.map(|at| at.timestamp_millis()),
            tags,
        ],
    )?;
    Ok(())
}

impl StorageBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn init(&mut self) -> Result<InitOutcome> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        match self.open() {
            Ok(_) => Ok(InitOutcome::AlreadyExists),
            Err(StoreError::NotInitialized) => {
                // An unusable leftover file gets replaced, same as a corrupt
                // JSON document would be.
                if self.path.exists() {
                    fs::remove_file(&self.path)?;
                }
                let conn = Connection::open(&self.path)?;
                conn.execute_batch(SCHEMA)?;
                conn.execute(
                    "INSERT INTO stats (key, value) VALUES ('created', ?1), ('total_hits', 0), ('total_saved', 0)",
                    params![Utc::now().timestamp_millis()],
                )?;
                debug!("created SQLite store at {}", self.path.display());
                Ok(InitOutcome::Created)
            }
            Err(err) => Err(err),
        }
    }

    fn get(&self, hash: &str) -> Result<Option<CacheEntry>> {
        let conn = self.open()?;
        let entry = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE hash = ?1"),
                params![hash],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn set(&mut self, hash: &str, entry: CacheEntry) -> Result<bool> {
        let conn = self.open()?;
        let exists: bool = conn
            .query_row("SELECT 1 FROM entries WHERE hash = ?1", params![hash], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        insert_entry(&conn, hash, &entry)?;
        debug!(hash, is_new = !exists, "stored entry");
        Ok(!exists)
    }

    fn delete(&mut self, hash: &str) -> Result<bool> {
        let conn = self.open()?;
        match row_contribution(&conn, hash)? {
            Some((hits, response_bytes)) => {
                conn.execute("DELETE FROM entries WHERE hash = ?1", params![hash])?;
                let total_hits = stat_value(&conn, "total_hits")?.saturating_sub(hits);
                set_stat(&conn, "total_hits", total_hits)?;
                let total_saved =
                    stat_value(&conn, "total_saved")?.saturating_sub(hits * response_bytes);
                set_stat(&conn, "total_saved", total_saved)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list(&self, options: &ListOptions) -> Result<Vec<(String, CacheEntry)>> {
        let conn = self.open()?;
        let order = match options.sort {
            SortBy::Created => "created DESC, hash ASC",
            SortBy::Hits => "hits DESC, hash ASC",
        };
        // SQLite treats LIMIT -1 as unbounded.
        let limit = options.limit.map(|limit| limit as i64).unwrap_or(-1);

        let rows = match options.model.as_deref() {
            Some(model) => {
                let sql = format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries WHERE model = ?1 ORDER BY {order} LIMIT ?2"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mapped = stmt.query_map(params![model, limit], row_to_pair)?;
                mapped.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let sql =
                    format!("SELECT {ENTRY_COLUMNS} FROM entries ORDER BY {order} LIMIT ?1");
                let mut stmt = conn.prepare(&sql)?;
                let mapped = stmt.query_map(params![limit], row_to_pair)?;
                mapped.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        Ok(rows)
    }

    fn stats(&self) -> Result<CacheStats> {
        let conn = self.open()?;
        self.stats_with(&conn)
    }

    fn update_stats(&mut self, patch: &StatsPatch) -> Result<()> {
        let conn = self.open()?;
        // Entry count and store size are derived on read, not stored.
        if let Some(total_hits) = patch.total_hits {
            set_stat(&conn, "total_hits", total_hits)?;
        }
        if let Some(total_saved) = patch.total_saved {
            set_stat(&conn, "total_saved", total_saved)?;
        }
        Ok(())
    }

    fn clear(&mut self, options: &ClearOptions) -> Result<u64> {
        let conn = self.open()?;

        let removed = match options.cutoff() {
            None => {
                let removed = conn.execute("DELETE FROM entries", [])? as u64;
                set_stat(&conn, "total_hits", 0)?;
                set_stat(&conn, "total_saved", 0)?;
                removed
            }
            Some(cutoff) => {
                let cutoff_ms = cutoff.timestamp_millis();
                let mut removed_hits = 0u64;
                let mut removed_saved = 0u64;
                {
                    let mut stmt =
                        conn.prepare("SELECT hits, response FROM entries WHERE created < ?1")?;
                    let rows = stmt.query_map(params![cutoff_ms], |row| {
                        let hits: i64 = row.get(0)?;
                        let response: String = row.get(1)?;
                        Ok((hits.max(0) as u64, response.len() as u64))
                    })?;
                    for row in rows {
                        let (hits, response_bytes) = row?;
                        removed_hits += hits;
                        removed_saved += hits * response_bytes;
                    }
                }
                let removed =
                    conn.execute("DELETE FROM entries WHERE created < ?1", params![cutoff_ms])?
                        as u64;
                let total_hits = stat_value(&conn, "total_hits")?.saturating_sub(removed_hits);
                set_stat(&conn, "total_hits", total_hits)?;
                let total_saved = stat_value(&conn, "total_saved")?.saturating_sub(removed_saved);
                set_stat(&conn, "total_saved", total_saved)?;
                removed
            }
        };

        debug!(removed, "cleared entries");
        Ok(removed)
    }

    fn export_data(&self) -> Result<CacheSnapshot> {
        let conn = self.open()?;

        let mut entries = BTreeMap::new();
        let mut stmt = conn.prepare(&format!("SELECT {ENTRY_COLUMNS} FROM entries"))?;
        let rows = stmt.query_map([], row_to_pair)?;
        for row in rows {
            let (hash, entry) = row?;
            entries.insert(hash, entry);
        }

        let stats = self.stats_with(&conn)?;
        let created = stat_value(&conn, "created")?;
        Ok(CacheSnapshot {
            entries,
            stats,
            meta: SnapshotMeta {
                backend: BackendKind::Sqlite,
                created: DateTime::from_timestamp_millis(created as i64).unwrap_or_default(),
            },
        })
    }

    fn import_data(&mut self, snapshot: &CacheSnapshot, strategy: ImportStrategy) -> Result<u64> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        let mut total_hits = stat_value(&tx, "total_hits")?;
        let mut total_saved = stat_value(&tx, "total_saved")?;
        let mut imported = 0u64;

        for (hash, incoming) in &snapshot.entries {
            if let Some((old_hits, old_bytes)) = row_contribution(&tx, hash)? {
                if !strategy.overwrites() {
                    continue;
                }
                total_hits = total_hits.saturating_sub(old_hits);
                total_saved = total_saved.saturating_sub(old_hits * old_bytes);
            }
            insert_entry(&tx, hash, incoming)?;
            total_hits += incoming.hits;
            total_saved += incoming.saved_bytes();
            imported += 1;
        }

        set_stat(&tx, "total_hits", total_hits)?;
        set_stat(&tx, "total_saved", total_saved)?;
        tx.commit()?;

        debug!(imported, strategy = %strategy, "imported snapshot");
        Ok(imported)
    }
}
