// Storage backend abstraction: durable, keyed storage of cache entries
// Author: kelexine (https://github.com/kelexine)

pub mod entry;
pub mod json;
pub mod resolver;
pub mod snapshot;
pub mod sqlite;

pub use entry::{estimate_tokens, CacheEntry, CacheStats, StatsPatch};
pub use json::JsonBackend;
pub use resolver::{create_backend, detect_backend, open_backend};
pub use snapshot::{CacheSnapshot, ImportStrategy, SnapshotMeta};
pub use sqlite::SqliteBackend;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// File name of the flat-document store inside a cache directory. Doubles as
/// the backend marker consumed by the resolver.
pub const JSON_STORE_FILE: &str = "cache.json";

/// File name of the SQLite store inside a cache directory. Takes precedence
/// over the flat-document marker during detection.
pub const SQLITE_STORE_FILE: &str = "cache.db";

/// The closed set of storage backend implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Single JSON document, rewritten whole on every mutation.
    Json,
    /// Embedded SQLite database with per-row updates.
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Json => "json",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Json
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    /// Selecting an unimplemented backend identifier is a configuration error,
    /// not a silent fallback.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(BackendKind::Json),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(StoreError::InvalidBackend(other.to_string())),
        }
    }
}

/// Result of an `init` call. An already-initialized location is informational,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// A new store was created.
    Created,
    /// The location already held an initialized store.
    AlreadyExists,
}

impl InitOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, InitOutcome::Created)
    }
}

/// Sort order for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Most recently created first (the default).
    #[default]
    Created,
    /// Highest hit count first.
    Hits,
}

/// Filtering, ordering and capping for `list`.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only entries for this model.
    pub model: Option<String>,
    /// Sort field, always descending.
    pub sort: SortBy,
    /// Maximum number of rows returned.
    pub limit: Option<usize>,
}

/// Scope of a `clear` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearOptions {
    /// Only remove entries created more than this many days ago. `None`
    /// removes everything.
    pub older_than_days: Option<u32>,
}

impl ClearOptions {
    /// Absolute cutoff derived from `older_than_days`, if any.
    pub fn cutoff(&self) -> Option<DateTime<Utc>> {
        self.older_than_days
            .map(|days| Utc::now() - Duration::days(i64::from(days)))
    }
}

/// Backend-agnostic contract for durable, keyed storage of cache entries.
///
/// Implementations are synchronous and single-writer: every operation either
/// completes or fails before the caller proceeds. A corrupt or unreadable
/// store surfaces as [`StoreError::NotInitialized`] on reads; `init` and `set`
/// propagate real I/O failures instead.
pub trait StorageBackend: Send {
    /// Which concrete implementation this is.
    fn kind(&self) -> BackendKind;

    /// Create the persisted structures if absent. Idempotent by detection.
    fn init(&mut self) -> Result<InitOutcome>;

    /// Look up an entry by hash. A miss is `Ok(None)`, never an error.
    fn get(&self, hash: &str) -> Result<Option<CacheEntry>>;

    /// Upsert an entry. Returns `true` when the key was newly created; the
    /// aggregate entry counter is updated in the same write.
    fn set(&mut self, hash: &str, entry: CacheEntry) -> Result<bool>;

    /// Remove an entry. Returns whether a record existed and was removed.
    fn delete(&mut self, hash: &str) -> Result<bool>;

    /// List entries, filtered/sorted/capped per `options`. Default order is
    /// most-recently-created first.
    fn list(&self, options: &ListOptions) -> Result<Vec<(String, CacheEntry)>>;

    /// Current stats snapshot, including the persisted store's byte size.
    fn stats(&self) -> Result<CacheStats>;

    /// Merge-overwrite stats fields computed by the caller.
    fn update_stats(&mut self, patch: &StatsPatch) -> Result<()>;

    /// Delete all entries, or only those older than the cutoff. Returns the
    /// number removed; aggregate stats shrink by the removed entries' share.
    fn clear(&mut self, options: &ClearOptions) -> Result<u64>;

    /// Snapshot every entry plus stats and metadata.
    fn export_data(&self) -> Result<CacheSnapshot>;

    /// Merge entries from a snapshot. Returns how many were actually written.
    fn import_data(&mut self, snapshot: &CacheSnapshot, strategy: ImportStrategy) -> Result<u64>;
}
