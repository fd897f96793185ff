// Cache facade - hashing, limits, TTL and orchestration over a storage backend
// Author: kelexine (https://github.com/kelexine)

pub mod ttl;

pub use ttl::parse_ttl;

use std::fmt;
use std::path::Path;

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::license::{Entitlements, UsageLimits};
use crate::similarity::{self, SearchOptions, SimilarityMatch};
use crate::storage::{
    create_backend, open_backend, BackendKind, CacheEntry, CacheSnapshot, CacheStats, ClearOptions,
    ImportStrategy, InitOutcome, ListOptions, StatsPatch, StorageBackend,
};

/// Number of hex characters kept from the digest.
pub const HASH_LEN: usize = 12;

/// Model identifier used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "default";

/// Cache key for a (model, prompt) pair: the first 12 hex characters of
/// SHA-256 over `"<model>:<prompt>"`. Case- and whitespace-sensitive.
pub fn compute_hash(model: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b":");
    hasher.update(prompt.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..HASH_LEN].to_string()
}

/// Caller-supplied knobs for a `set`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Model the response came from; part of the key. Defaults to `"default"`.
    pub model: Option<String>,
    /// TTL duration string, e.g. `"30d"`. Parsed with [`parse_ttl`].
    pub ttl: Option<String>,
    /// Explicit token count; estimated from the response length when absent.
    pub tokens: Option<u64>,
    pub tags: Option<Vec<String>>,
}

/// Why a `set` was refused under the current tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitReason {
    /// The store already holds the maximum number of entries.
    MaxEntries { limit: u64 },
    /// The response is larger than a single entry may be.
    ResponseTooLarge { limit: usize, actual: usize },
}

impl fmt::Display for LimitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitReason::MaxEntries { limit } => {
                write!(f, "free tier is limited to {limit} entries")
            }
            LimitReason::ResponseTooLarge { limit, actual } => write!(
                f,
                "response is {actual} bytes, free tier caps responses at {limit} bytes"
            ),
        }
    }
}

/// Result of a `set`. Hitting a tier ceiling is an expected outcome the
/// caller renders as an upsell, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    /// A new entry was stored under this hash.
    Inserted { hash: String },
    /// An existing entry was overwritten; its hit count restarted at zero.
    Updated { hash: String },
    /// Nothing was written.
    LimitExceeded { reason: LimitReason },
}

impl SetOutcome {
    pub fn hash(&self) -> Option<&str> {
        match self {
            SetOutcome::Inserted { hash } | SetOutcome::Updated { hash } => Some(hash),
            SetOutcome::LimitExceeded { .. } => None,
        }
    }
}

/// Prompt/response cache over a pluggable storage backend. The backend is
/// chosen once at construction; entitlements are consulted fresh at every
/// decision point.
pub struct Cache {
    backend: Box<dyn StorageBackend>,
    entitlements: Box<dyn Entitlements>,
}

impl Cache {
    /// Open the store already present in `dir`. Fails with `NotInitialized`
    /// when the directory has no recognizable store.
    pub fn open(dir: &Path, entitlements: Box<dyn Entitlements>) -> Result<Self> {
        let backend = open_backend(dir)?;
        Ok(Self {
            backend,
            entitlements,
        })
    }

    /// Create a store of the chosen kind in `dir` and open it. Reports
    /// whether a new store was created or one was already there.
    pub fn initialize(
        dir: &Path,
        kind: BackendKind,
        entitlements: Box<dyn Entitlements>,
    ) -> Result<(Self, InitOutcome)> {
        let mut backend = create_backend(dir, kind);
        let outcome = backend.init()?;
        Ok((
            Self {
                backend,
                entitlements,
            },
            outcome,
        ))
    }

    /// Wrap an already-constructed backend. Used by tests and by callers
    /// that manage backend construction themselves.
    pub fn with_backend(backend: Box<dyn StorageBackend>, entitlements: Box<dyn Entitlements>) -> Self {
        Self {
            backend,
            entitlements,
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn is_pro(&self) -> bool {
        self.entitlements.is_pro()
    }

    fn current_limits(&self) -> UsageLimits {
        UsageLimits::for_tier(self.entitlements.is_pro())
    }

    /// Store a response under the hash of (model, prompt). Overwrites reset
    /// the entry's creation time and hit count. Tier ceilings make this a
    /// no-op reported through [`SetOutcome::LimitExceeded`].
    pub fn set(&mut self, prompt: &str, response: &str, options: SetOptions) -> Result<SetOutcome> {
        let model = options.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let limits = self.current_limits();

        if let Some(max_bytes) = limits.max_response_bytes {
            if response.len() > max_bytes {
                return Ok(SetOutcome::LimitExceeded {
                    reason: LimitReason::ResponseTooLarge {
                        limit: max_bytes,
                        actual: response.len(),
                    },
                });
            }
        }

        let hash = compute_hash(model, prompt);
        let existing = self.backend.get(&hash)?;

        // The entry ceiling gates inserts only; overwriting an existing hash
        // never grows the store.
        if existing.is_none() {
            if let Some(max_entries) = limits.max_entries {
                let stats = self.backend.stats()?;
                if stats.total_entries >= max_entries {
                    debug!(total = stats.total_entries, "entry ceiling reached");
                    return Ok(SetOutcome::LimitExceeded {
                        reason: LimitReason::MaxEntries { limit: max_entries },
                    });
                }
            }
        }

        let expires = match options.ttl.as_deref() {
            Some(raw) => {
                let ttl_ms = parse_ttl(raw)?;
                let ttl_ms = i64::try_from(ttl_ms)
                    .map_err(|_| StoreError::InvalidTtl(raw.to_string()))?;
                let at = Utc::now()
                    .checked_add_signed(Duration::milliseconds(ttl_ms))
                    .ok_or_else(|| StoreError::InvalidTtl(raw.to_string()))?;
                Some(at)
            }
            None => None,
        };

        let entry = CacheEntry::new(prompt, response, model, options.tokens, expires, options.tags);
        let is_new = self.backend.set(&hash, entry)?;

        // An overwrite resets the entry's hit count, so the replaced entry's
        // contribution leaves the aggregate totals with it.
        if let Some(old) = existing {
            if old.hits > 0 {
                let stats = self.backend.stats()?;
                self.backend.update_stats(&StatsPatch {
                    total_hits: Some(stats.total_hits.saturating_sub(old.hits)),
                    total_saved: Some(stats.total_saved.saturating_sub(old.saved_bytes())),
                    ..Default::default()
                })?;
            }
        }

        if is_new {
            Ok(SetOutcome::Inserted { hash })
        } else {
            Ok(SetOutcome::Updated { hash })
        }
    }

    /// Look up by (model, prompt). See [`Cache::get_by_hash`].
    pub fn get(&mut self, prompt: &str, model: Option<&str>) -> Result<Option<CacheEntry>> {
        let model = model.unwrap_or(DEFAULT_MODEL);
        let hash = compute_hash(model, prompt);
        self.get_by_hash(&hash)
    }

    /// Look up by hash. A hit increments the entry's counter and the
    /// aggregate hit/saved totals. An expired entry is deleted as a side
    /// effect of the read and reported as a miss.
    pub fn get_by_hash(&mut self, hash: &str) -> Result<Option<CacheEntry>> {
        let Some(mut entry) = self.backend.get(hash)? else {
            return Ok(None);
        };

        if entry.is_expired() {
            debug!(hash, "entry expired, removing");
            self.backend.delete(hash)?;
            return Ok(None);
        }

        let stats = self.backend.stats()?;
        entry.record_hit();
        self.backend.set(hash, entry.clone())?;
        self.backend.update_stats(&StatsPatch {
            total_hits: Some(stats.total_hits + 1),
            total_saved: Some(stats.total_saved + entry.response.len() as u64),
            ..Default::default()
        })?;

        Ok(Some(entry))
    }

    pub fn delete(&mut self, hash: &str) -> Result<bool> {
        self.backend.delete(hash)
    }

    pub fn list(&self, options: &ListOptions) -> Result<Vec<(String, CacheEntry)>> {
        self.backend.list(options)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        self.backend.stats()
    }

    pub fn clear(&mut self, options: &ClearOptions) -> Result<u64> {
        self.backend.clear(options)
    }

    pub fn export_data(&self) -> Result<CacheSnapshot> {
        self.backend.export_data()
    }

    pub fn import_data(&mut self, snapshot: &CacheSnapshot, strategy: ImportStrategy) -> Result<u64> {
        self.backend.import_data(snapshot, strategy)
    }

    /// Rank all stored prompts by similarity to `query`.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SimilarityMatch>> {
        let candidates = self.backend.list(&ListOptions::default())?;
        Ok(similarity::find_similar(&candidates, query, options))
    }

    /// The single stored prompt similar enough to reuse for `query`, if any.
    pub fn best_match(&self, query: &str, threshold: Option<f64>) -> Result<Option<SimilarityMatch>> {
        let candidates = self.backend.list(&ListOptions::default())?;
        Ok(similarity::best_match(&candidates, query, threshold))
    }
}
