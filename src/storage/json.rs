// Flat-file JSON storage backend
// Author: kelexine (https://github.com/kelexine)
//
// The durable representation is a single document (the snapshot format from
// `storage::snapshot`) holding every entry, the aggregate stats and the store
// metadata. Every mutation loads the whole document, changes it in memory and
// rewrites it in full; there are no partial writes and no append log. A write
// that fails partway can corrupt the document, so the rule below treats a
// corrupt store as uninitialized instead of crashing the process.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::storage::entry::{CacheEntry, CacheStats, StatsPatch};
use crate::storage::snapshot::{CacheSnapshot, ImportStrategy};
use crate::storage::{
    BackendKind, ClearOptions, InitOutcome, ListOptions, SortBy, StorageBackend, JSON_STORE_FILE,
};

/// Storage backend persisting to a single `cache.json` document.
pub struct JsonBackend {
    path: PathBuf,
}

impl JsonBackend {
    /// Create a handle for the store inside `dir`. Nothing is touched on disk
    /// until `init` or the first operation.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(JSON_STORE_FILE),
        }
    }

    /// Path of the store document.
    pub fn store_path(&self) -> &Path {
        &self.path
    }

    /// Load the whole document. A missing, unreadable or corrupt document
    /// surfaces as `NotInitialized` so callers can prompt for `init` instead
    /// of crashing on somebody's half-written file.
    fn load(&self) -> Result<CacheSnapshot> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotInitialized)
            }
            Err(err) => {
                warn!("cache store unreadable, treating as uninitialized: {}", err);
                return Err(StoreError::NotInitialized);
            }
        };

        match serde_json::from_str(&raw) {
            Ok(document) => Ok(document),
            Err(err) => {
                warn!("cache store corrupt, treating as uninitialized: {}", err);
                Err(StoreError::NotInitialized)
            }
        }
    }

    /// Rewrite the whole document. I/O failures (disk full, permissions)
    /// propagate to the caller.
    fn write(&self, document: &CacheSnapshot) -> Result<()> {
        let raw = serde_json::to_string_pretty(document)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }

    /// Byte length of the persisted document.
    fn disk_size(&self) -> u64 {
        fs::metadata(&self.path).map(|meta| meta.len()).unwrap_or(0)
    }
}

impl StorageBackend for JsonBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Json
    }

    fn init(&mut self) -> Result<InitOutcome> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        match self.load() {
            Ok(_) => Ok(InitOutcome::AlreadyExists),
            Err(StoreError::NotInitialized) => {
                let document =
                    CacheSnapshot::new(BTreeMap::new(), CacheStats::default(), BackendKind::Json);
                self.write(&document)?;
                debug!("created JSON store at {}", self.path.display());
                Ok(InitOutcome::Created)
            }
            Err(err) => Err(err),
        }
    }

    fn get(&self, hash: &str) -> Result<Option<CacheEntry>> {
        Ok(self.load()?.entries.get(hash).cloned())
    }

    fn set(&mut self, hash: &str, entry: CacheEntry) -> Result<bool> {
        let mut document = self.load()?;
        let is_new = !document.entries.contains_key(hash);
        document.entries.insert(hash.to_string(), entry);
        document.stats.total_entries = document.entries.len() as u64;
        self.write(&document)?;
        debug!(hash, is_new, "stored entry");
        Ok(is_new)
    }

    fn delete(&mut self, hash: &str) -> Result<bool> {
        let mut document = self.load()?;
        match document.entries.remove(hash) {
            Some(old) => {
                document.stats.total_entries = document.entries.len() as u64;
                document.stats.total_hits = document.stats.total_hits.saturating_sub(old.hits);
                document.stats.total_saved =
                    document.stats.total_saved.saturating_sub(old.saved_bytes());
                self.write(&document)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list(&self, options: &ListOptions) -> Result<Vec<(String, CacheEntry)>> {
        let document = self.load()?;
        let mut rows: Vec<(String, CacheEntry)> = document
            .entries
            .into_iter()
            .filter(|(_, entry)| {
                options
                    .model
                    .as_deref()
                    .map_or(true, |model| entry.model == model)
            })
            .collect();

        match options.sort {
            SortBy::Created => rows.sort_by(|a, b| b.1.created.cmp(&a.1.created)),
            SortBy::Hits => rows.sort_by(|a, b| b.1.hits.cmp(&a.1.hits)),
        }

        if let Some(limit) = options.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    fn stats(&self) -> Result<CacheStats> {
        let document = self.load()?;
        let mut stats = document.stats;
        stats.cache_size = self.disk_size();
        Ok(stats)
    }

    fn update_stats(&mut self, patch: &StatsPatch) -> Result<()> {
        let mut document = self.load()?;
        document.stats.apply(patch);
        self.write(&document)
    }

    fn clear(&mut self, options: &ClearOptions) -> Result<u64> {
        let mut document = self.load()?;

        let removed = match options.cutoff() {
            None => {
                let removed = document.entries.len() as u64;
                document.entries.clear();
                document.stats.total_entries = 0;
                document.stats.total_hits = 0;
                document.stats.total_saved = 0;
                removed
            }
            Some(cutoff) => {
                let mut removed_hits = 0u64;
                let mut removed_saved = 0u64;
                let before = document.entries.len();
                document.entries.retain(|_, entry| {
                    let stale = entry.created < cutoff;
                    if stale {
                        removed_hits += entry.hits;
                        removed_saved += entry.saved_bytes();
                    }
                    !stale
                });
                let removed = (before - document.entries.len()) as u64;
                document.stats.total_entries = document.entries.len() as u64;
                document.stats.total_hits =
                    document.stats.total_hits.saturating_sub(removed_hits);
                document.stats.total_saved =
                    document.stats.total_saved.saturating_sub(removed_saved);
                removed
            }
        };

        self.write(&document)?;
        debug!(removed, "cleared entries");
        Ok(removed)
    }

    fn export_data(&self) -> Result<CacheSnapshot> {
        let mut document = self.load()?;
        document.stats.cache_size = self.disk_size();
        Ok(document)
    }

    fn import_data(&mut self, snapshot: &CacheSnapshot, strategy: ImportStrategy) -> Result<u64> {
        let mut document = self.load()?;
        let mut imported = 0u64;

        for (hash, incoming) in &snapshot.entries {
            if let Some(existing) = document.entries.get(hash) {
                if !strategy.overwrites() {
                    continue;
                }
                document.stats.total_hits =
                    document.stats.total_hits.saturating_sub(existing.hits);
                document.stats.total_saved =
                    document.stats.total_saved.saturating_sub(existing.saved_bytes());
            }
            document.stats.total_hits += incoming.hits;
            document.stats.total_saved += incoming.saved_bytes();
            document.entries.insert(hash.clone(), incoming.clone());
            imported += 1;
        }

        document.stats.total_entries = document.entries.len() as u64;
        self.write(&document)?;
        debug!(imported, strategy = %strategy, "imported snapshot");
        Ok(imported)
    }
}
