// Cache facade tests - hashing, hit accounting, TTL expiry and tier ceilings
// Author: kelexine (https://github.com/kelexine)

use chrono::{Duration, Utc};
use promptcache::cache::{compute_hash, Cache, LimitReason, SetOptions, SetOutcome};
use promptcache::license::StaticEntitlements;
use promptcache::similarity::SearchOptions;
use promptcache::storage::{create_backend, BackendKind, CacheEntry, ListOptions};
use tempfile::TempDir;

fn cache_with(dir: &TempDir, pro: bool) -> Cache {
    let (cache, outcome) = Cache::initialize(
        dir.path(),
        BackendKind::Json,
        Box::new(StaticEntitlements(pro)),
    )
    .unwrap();
    assert!(outcome.is_new());
    cache
}

fn set_simple(cache: &mut Cache, prompt: &str, response: &str) -> SetOutcome {
    cache.set(prompt, response, SetOptions::default()).unwrap()
}

#[test]
fn test_set_then_get_roundtrip() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, false);

    let outcome = set_simple(&mut cache, "what is rust", "a systems language");
    let hash = outcome.hash().unwrap().to_string();
    assert!(matches!(outcome, SetOutcome::Inserted { .. }));
    assert_eq!(hash, compute_hash("default", "what is rust"));

    let entry = cache.get("what is rust", None).unwrap().unwrap();
    assert_eq!(entry.response, "a systems language");
    assert_eq!(entry.hits, 1, "the read itself is the first hit");

    let stats = cache.stats().unwrap();
    assert_eq!(stats.total_entries, 1);
    assert_eq!(stats.total_hits, 1);
    assert_eq!(stats.total_saved, "a systems language".len() as u64);
}

#[test]
fn test_get_unknown_prompt_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, false);
    assert!(cache.get("never stored", None).unwrap().is_none());
    assert_eq!(cache.stats().unwrap().total_hits, 0);
}

#[test]
fn test_hits_increment_exactly_once_per_get() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, false);
    set_simple(&mut cache, "p", "r");

    let first = cache.get("p", None).unwrap().unwrap();
    let second = cache.get("p", None).unwrap().unwrap();
    assert_eq!(first.hits, 1);
    assert_eq!(second.hits, 2);

    let stats = cache.stats().unwrap();
    assert_eq!(stats.total_hits, 2);
    assert_eq!(stats.total_saved, 2 * "r".len() as u64);
}

#[test]
fn test_overwrite_resets_hits_and_creation_time() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, false);

    set_simple(&mut cache, "p", "first response");
    cache.get("p", None).unwrap();

    let outcome = set_simple(&mut cache, "p", "second response");
    assert!(matches!(outcome, SetOutcome::Updated { .. }));

    let rows = cache.list(&ListOptions::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1.response, "second response");
    assert_eq!(rows[0].1.hits, 0, "overwrite restarts the hit counter");

    // The replaced entry's hits leave the aggregate totals with it.
    let stats = cache.stats().unwrap();
    assert_eq!(stats.total_hits, 0);
    assert_eq!(stats.total_saved, 0);

    let entry = cache.get("p", None).unwrap().unwrap();
    assert_eq!(entry.response, "second response");
    assert_eq!(entry.hits, 1);

    let stats = cache.stats().unwrap();
    assert_eq!(stats.total_hits, 1);
    assert_eq!(stats.total_saved, "second response".len() as u64);
}

#[test]
fn test_hit_accounting_matches_across_backends() {
    for kind in [BackendKind::Json, BackendKind::Sqlite] {
        let dir = TempDir::new().unwrap();
        let (mut cache, _) =
            Cache::initialize(dir.path(), kind, Box::new(StaticEntitlements(false))).unwrap();

        set_simple(&mut cache, "p", "resp");
        cache.get("p", None).unwrap();
        let entry = cache.get("p", None).unwrap().unwrap();
        assert_eq!(entry.hits, 2, "{kind}");

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_hits, 2, "{kind}");
        assert_eq!(stats.total_saved, 2 * "resp".len() as u64, "{kind}");

        let outcome = set_simple(&mut cache, "p", "fresh");
        assert!(matches!(outcome, SetOutcome::Updated { .. }), "{kind}");

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_hits, 0, "{kind}: replaced entry takes its hits along");
        assert_eq!(stats.total_saved, 0, "{kind}");
    }
}

#[test]
fn test_model_scopes_the_key() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, false);

    cache
        .set(
            "same prompt",
            "answer from gpt",
            SetOptions {
                model: Some("gpt-4o".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    cache
        .set(
            "same prompt",
            "answer from claude",
            SetOptions {
                model: Some("claude-3".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(cache.stats().unwrap().total_entries, 2);
    let from_gpt = cache.get("same prompt", Some("gpt-4o")).unwrap().unwrap();
    assert_eq!(from_gpt.response, "answer from gpt");
    assert!(cache.get("same prompt", None).unwrap().is_none());
}

#[test]
fn test_ttl_produces_future_expiry() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, false);

    cache
        .set(
            "p",
            "r",
            SetOptions {
                ttl: Some("7d".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    let rows = cache.list(&ListOptions::default()).unwrap();
    let expires = rows[0].1.expires.unwrap();
    let delta = expires - Utc::now();
    assert!(delta > Duration::days(6), "expiry should be about a week out");
    assert!(delta <= Duration::days(7));
}

#[test]
fn test_invalid_ttl_rejects_the_set() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, false);

    let result = cache.set(
        "p",
        "r",
        SetOptions {
            ttl: Some("7x".to_string()),
            ..Default::default()
        },
    );
    assert!(result.is_err());
    assert_eq!(cache.stats().unwrap().total_entries, 0);
}

#[test]
fn test_expired_entry_removed_lazily_on_read() {
    let dir = TempDir::new().unwrap();
    let mut backend = create_backend(dir.path(), BackendKind::Json);
    backend.init().unwrap();

    let mut entry = CacheEntry::new("p", "r", "default", None, None, None);
    entry.expires = Some(Utc::now() - Duration::seconds(5));
    let hash = compute_hash("default", "p");
    backend.set(&hash, entry).unwrap();

    let mut cache = Cache::with_backend(backend, Box::new(StaticEntitlements(true)));
    assert!(cache.get("p", None).unwrap().is_none(), "expired entry is a miss");
    assert!(
        cache.list(&ListOptions::default()).unwrap().is_empty(),
        "the miss also removed the entry"
    );
}

#[test]
fn test_free_tier_entry_ceiling_blocks_the_51st_insert() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, false);

    for i in 0..50 {
        let outcome = set_simple(&mut cache, &format!("prompt {i}"), "r");
        assert!(matches!(outcome, SetOutcome::Inserted { .. }), "insert {i}");
    }

    let blocked = set_simple(&mut cache, "prompt 50", "r");
    assert_eq!(
        blocked,
        SetOutcome::LimitExceeded {
            reason: LimitReason::MaxEntries { limit: 50 }
        }
    );
    assert_eq!(cache.stats().unwrap().total_entries, 50);

    // Overwrites of existing keys stay allowed at the ceiling.
    let overwrite = set_simple(&mut cache, "prompt 49", "replacement");
    assert!(matches!(overwrite, SetOutcome::Updated { .. }));
}

#[test]
fn test_pro_tier_has_no_entry_ceiling() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, true);

    for i in 0..51 {
        let outcome = set_simple(&mut cache, &format!("prompt {i}"), "r");
        assert!(matches!(outcome, SetOutcome::Inserted { .. }));
    }
    assert_eq!(cache.stats().unwrap().total_entries, 51);
}

#[test]
fn test_free_tier_response_size_ceiling() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, false);

    let at_limit = "x".repeat(100_000);
    assert!(matches!(
        set_simple(&mut cache, "fits", &at_limit),
        SetOutcome::Inserted { .. }
    ));

    let oversize = "x".repeat(100_001);
    let blocked = set_simple(&mut cache, "too big", &oversize);
    assert_eq!(
        blocked,
        SetOutcome::LimitExceeded {
            reason: LimitReason::ResponseTooLarge {
                limit: 100_000,
                actual: 100_001,
            }
        }
    );

    // The size ceiling applies to overwrites too.
    let blocked_overwrite = set_simple(&mut cache, "fits", &oversize);
    assert!(matches!(
        blocked_overwrite,
        SetOutcome::LimitExceeded { .. }
    ));
}

#[test]
fn test_pro_tier_accepts_large_responses() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, true);
    let oversize = "x".repeat(100_001);
    assert!(matches!(
        set_simple(&mut cache, "big", &oversize),
        SetOutcome::Inserted { .. }
    ));
}

#[test]
fn test_search_through_the_facade() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, false);
    set_simple(&mut cache, "How do I use Python decorators?", "with @");
    set_simple(&mut cache, "What are Python decorators and how do they work?", "sugar");
    set_simple(&mut cache, "How to make HTTP requests in JavaScript?", "fetch");

    let matches = cache
        .search(
            "python decorators",
            &SearchOptions {
                threshold: 0.1,
                limit: 10,
            },
        )
        .unwrap();

    assert_eq!(matches.len(), 2);
    assert!(matches[0].entry.prompt.to_lowercase().contains("decorators"));
    assert!(matches[0].score >= matches[1].score);
    assert!(
        matches.iter().all(|m| !m.entry.prompt.contains("JavaScript")),
        "disjoint prompt must not clear the threshold"
    );
}

#[test]
fn test_best_match_respects_threshold() {
    let dir = TempDir::new().unwrap();
    let mut cache = cache_with(&dir, false);
    set_simple(&mut cache, "how to parse json in rust", "serde");
    set_simple(&mut cache, "baking sourdough bread at home", "flour");

    let found = cache
        .best_match("how to parse json in rust", None)
        .unwrap();
    assert!(found.is_some(), "an identical prompt clears the reuse bar");
    assert!(found.unwrap().entry.prompt.contains("json"));

    let unrelated = cache.best_match("quantum chromodynamics", None).unwrap();
    assert!(unrelated.is_none());
}
