// Backend detection and construction
// Author: kelexine (https://github.com/kelexine)

use std::path::Path;

use tracing::debug;

use crate::error::{Result, StoreError};
use crate::storage::json::JsonBackend;
use crate::storage::sqlite::SqliteBackend;
use crate::storage::{BackendKind, StorageBackend, JSON_STORE_FILE, SQLITE_STORE_FILE};

/// Identify which backend owns `dir` by its marker file. The database file
/// wins when both are present, so a store migrated from JSON to SQLite keeps
/// resolving to SQLite even if the old document was left behind.
pub fn detect_backend(dir: &Path) -> Option<BackendKind> {
    if dir.join(SQLITE_STORE_FILE).exists() {
        Some(BackendKind::Sqlite)
    } else if dir.join(JSON_STORE_FILE).exists() {
        Some(BackendKind::Json)
    } else {
        None
    }
}

/// Construct a backend of an explicitly chosen kind, bypassing detection.
/// Used by `init`, where the caller decides what the store should be.
pub fn create_backend(dir: &Path, kind: BackendKind) -> Box<dyn StorageBackend> {
    match kind {
        BackendKind::Json => Box::new(JsonBackend::new(dir)),
        BackendKind::Sqlite => Box::new(SqliteBackend::new(dir)),
    }
}

/// Open the backend already present in `dir`. Fails with `NotInitialized`
/// when no store marker is found.
pub fn open_backend(dir: &Path) -> Result<Box<dyn StorageBackend>> {
    match detect_backend(dir) {
        Some(kind) => {
            debug!(backend = %kind, dir = %dir.display(), "resolved cache backend");
            Ok(create_backend(dir, kind))
        }
        None => Err(StoreError::NotInitialized),
    }
}
