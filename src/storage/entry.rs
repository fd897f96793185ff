//! Cache entry and statistics models.

// Author: kelexine (https://github.com/kelexine)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single cached prompt/response record.
///
/// The 12-hex-character hash that identifies an entry is the storage key and is
/// deliberately not duplicated inside the record itself; see the snapshot
/// format in [`crate::storage::snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The prompt text. Its contribution to the hash is fixed at creation.
    pub prompt: String,

    /// The cached response. May be overwritten by a later `set`.
    pub response: String,

    /// Model identifier the response was produced by. Part of the hash input
    /// and used for scoped listings and cost pricing.
    pub model: String,

    /// Creation timestamp. Immutable except on full overwrite, which resets it.
    pub created: DateTime<Utc>,

    /// Number of successful retrievals, incremented exactly once per hit.
    pub hits: u64,

    /// Estimated token count of the response.
    pub tokens: u64,

    /// Absolute expiry timestamp. An expired entry is treated as absent and
    /// removed lazily on read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,

    /// Optional set of short labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl CacheEntry {
    /// Create a fresh entry with `created = now` and a zero hit count.
    ///
    /// When `tokens` is not supplied it is estimated from the response length
    /// (1 token ≈ 4 characters, rounded up).
    pub fn new(
        prompt: impl Into<String>,
        response: impl Into<String>,
        model: impl Into<String>,
        tokens: Option<u64>,
        expires: Option<DateTime<Utc>>,
        tags: Option<Vec<String>>,
    ) -> Self {
        let response = response.into();
        let tokens = tokens.unwrap_or_else(|| estimate_tokens(&response));
        Self {
            prompt: prompt.into(),
            response,
            model: model.into(),
            created: Utc::now(),
            hits: 0,
            tokens,
            expires,
            tags,
        }
    }

    /// Check whether the entry has passed its expiry timestamp.
    pub fn is_expired(&self) -> bool {
        match self.expires {
            Some(expires) => Utc::now() > expires,
            None => false,
        }
    }

    /// Record a successful retrieval.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    /// Bytes this entry has saved so far: every hit returned the response
    /// instead of regenerating it.
    pub fn saved_bytes(&self) -> u64 {
        self.hits * self.response.len() as u64
    }
}

/// Estimate token count from text length (1 token ≈ 4 characters, rounded up).
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Aggregate counters maintained alongside the entries.
///
/// All fields stay derivable from the live entry set: `total_entries` is the
/// live count, `total_hits` the sum of per-entry hit counters, `total_saved`
/// the sum of bytes returned on hits, and `cache_size` the byte size of the
/// persisted representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of live entries.
    pub total_entries: u64,
    /// Cumulative hit count across live entries.
    pub total_hits: u64,
    /// Cumulative response bytes returned on hits.
    pub total_saved: u64,
    /// On-disk size of the persisted store in bytes.
    pub cache_size: u64,
}

impl CacheStats {
    /// Merge-overwrite the fields present in `patch`.
    pub fn apply(&mut self, patch: &StatsPatch) {
        if let Some(total_entries) = patch.total_entries {
            self.total_entries = total_entries;
        }
        if let Some(total_hits) = patch.total_hits {
            self.total_hits = total_hits;
        }
        if let Some(total_saved) = patch.total_saved {
            self.total_saved = total_saved;
        }
        if let Some(cache_size) = patch.cache_size {
            self.cache_size = cache_size;
        }
    }
}

/// Partial stats update used by callers that compute hit/byte deltas outside
/// the backend (the cache facade, primarily).
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsPatch {
    pub total_entries: Option<u64>,
    pub total_hits: Option<u64>,
    pub total_saved: Option<u64>,
    pub cache_size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_new_entry_defaults() {
        let entry = CacheEntry::new("p", "12345678", "default", None, None, None);
        assert_eq!(entry.hits, 0);
        assert_eq!(entry.tokens, 2);
        assert!(entry.expires.is_none());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_explicit_tokens_win_over_estimate() {
        let entry = CacheEntry::new("p", "12345678", "default", Some(99), None, None);
        assert_eq!(entry.tokens, 99);
    }

    #[test]
    fn test_expiry_in_the_past() {
        let mut entry = CacheEntry::new("p", "r", "default", None, None, None);
        entry.expires = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(entry.is_expired());
    }

    #[test]
    fn test_stats_patch_merges_only_present_fields() {
        let mut stats = CacheStats {
            total_entries: 3,
            total_hits: 7,
            total_saved: 100,
            cache_size: 512,
        };
        stats.apply(&StatsPatch {
            total_hits: Some(8),
            total_saved: Some(120),
            ..Default::default()
        });
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_hits, 8);
        assert_eq!(stats.total_saved, 120);
        assert_eq!(stats.cache_size, 512);
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let json = serde_json::to_value(CacheStats::default()).unwrap();
        assert!(json.get("totalEntries").is_some());
        assert!(json.get("totalHits").is_some());
        assert!(json.get("totalSaved").is_some());
        assert!(json.get("cacheSize").is_some());
    }
}
