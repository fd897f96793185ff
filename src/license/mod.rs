// License tier detection and usage limits
// Author: kelexine (https://github.com/kelexine)

use std::fs;
use std::path::PathBuf;

/// Free-tier ceiling on the number of stored entries.
pub const FREE_MAX_ENTRIES: u64 = 50;

/// Free-tier ceiling on the byte length of a single cached response.
pub const FREE_MAX_RESPONSE_BYTES: usize = 100_000;

/// Answers the PRO/FREE question for components that gate on it. Injected
/// rather than read from a process-wide singleton so storage and search stay
/// testable without license fixtures on disk.
pub trait Entitlements: Send {
    /// Whether the PRO tier is active right now. Implementations read their
    /// source fresh on every call; callers must not cache the answer.
    fn is_pro(&self) -> bool;
}

/// Entitlements backed by a license key file. The mere presence of a
/// non-empty key activates PRO; key verification happens elsewhere.
pub struct FileEntitlements {
    path: PathBuf,
}

impl FileEntitlements {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Entitlements for FileEntitlements {
    fn is_pro(&self) -> bool {
        match fs::read_to_string(&self.path) {
            Ok(raw) => !raw.trim().is_empty(),
            Err(_) => false,
        }
    }
}

/// Fixed-tier entitlements for tests and explicit overrides.
pub struct StaticEntitlements(pub bool);

impl Entitlements for StaticEntitlements {
    fn is_pro(&self) -> bool {
        self.0
    }
}

/// Ceilings applied by the cache facade when storing entries. `None` means
/// unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageLimits {
    pub max_entries: Option<u64>,
    pub max_response_bytes: Option<usize>,
}

impl UsageLimits {
    pub fn free() -> Self {
        Self {
            max_entries: Some(FREE_MAX_ENTRIES),
            max_response_bytes: Some(FREE_MAX_RESPONSE_BYTES),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            max_entries: None,
            max_response_bytes: None,
        }
    }

    pub fn for_tier(pro: bool) -> Self {
        if pro {
            Self::unlimited()
        } else {
            Self::free()
        }
    }
}
