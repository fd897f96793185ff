// Backend-agnostic snapshot format for export/import
// Author: kelexine (https://github.com/kelexine)
//
// Both backends exchange the same JSON document, so a snapshot exported from
// the flat-file store can be imported into the SQLite store and vice versa.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::storage::entry::{CacheEntry, CacheStats};
use crate::storage::BackendKind;

/// Full snapshot of a cache: every entry, the aggregate stats, and backend
/// metadata. This is the canonical interchange format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Entries keyed by their 12-hex hash. A `BTreeMap` keeps key order
    /// stable, which makes imports deterministic.
    pub entries: BTreeMap<String, CacheEntry>,

    /// Aggregate stats at export time.
    pub stats: CacheStats,

    /// Backend metadata.
    pub meta: SnapshotMeta,
}

impl CacheSnapshot {
    pub fn new(entries: BTreeMap<String, CacheEntry>, stats: CacheStats, backend: BackendKind) -> Self {
        Self {
            entries,
            stats,
            meta: SnapshotMeta {
                backend,
                created: Utc::now(),
            },
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.len() as u64
    }
}

/// Provenance of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Backend the snapshot was exported from.
    pub backend: BackendKind,
    /// Export timestamp.
    pub created: DateTime<Utc>,
}

/// Per-key decision rule applied while importing a snapshot.
///
/// `Merge` and `SkipExisting` are intentionally identical: neither overwrites
/// a key that already exists locally. Both names are part of the external
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStrategy {
    /// Incoming keys overwrite local entries, or insert when absent.
    Replace,
    /// Incoming keys are inserted only when no local entry exists.
    Merge,
    /// Keys already present locally are left untouched and counted as skipped.
    SkipExisting,
}

impl ImportStrategy {
    /// Whether an incoming key may replace an existing local entry.
    pub fn overwrites(&self) -> bool {
        matches!(self, ImportStrategy::Replace)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStrategy::Replace => "replace",
            ImportStrategy::Merge => "merge",
            ImportStrategy::SkipExisting => "skip-existing",
        }
    }
}

impl fmt::Display for ImportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStrategy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(ImportStrategy::Replace),
            "merge" => Ok(ImportStrategy::Merge),
            "skip-existing" => Ok(ImportStrategy::SkipExisting),
            other => Err(StoreError::InvalidStrategy(other.to_string())),
        }
    }
}
