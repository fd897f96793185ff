// Cost estimation over cached token counts
// Author: kelexine (https://github.com/kelexine)
//
// A pure pricing table composed with entry token counts. Reads entries, never
// writes anything. Prices are USD per 1000 output tokens and only need to be
// in the right ballpark; the report is a savings estimate, not a bill.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Serialize;

use crate::storage::CacheEntry;

/// Price applied when no table prefix matches.
pub const DEFAULT_PRICE_PER_1K: f64 = 0.002;

/// Lazily initialized pricing table, most specific prefix first
static PRICE_TABLE: OnceLock<Vec<(&'static str, f64)>> = OnceLock::new();

fn get_price_table() -> &'static Vec<(&'static str, f64)> {
    PRICE_TABLE.get_or_init(|| {
        vec![
            // OpenAI
            ("gpt-4o-mini", 0.0006),
            ("gpt-4o", 0.01),
            ("gpt-4-turbo", 0.03),
            ("gpt-4", 0.06),
            ("gpt-3.5", 0.002),
            // Anthropic
            ("claude-3-opus", 0.075),
            ("claude-3-5-sonnet", 0.015),
            ("claude-3-sonnet", 0.015),
            ("claude-3-haiku", 0.00125),
            ("claude", 0.015),
            // Google
            ("gemini-1.5-pro", 0.005),
            ("gemini", 0.0015),
            // Local models cost nothing per token
            ("llama", 0.0),
            ("mistral", 0.0),
            ("ollama", 0.0),
        ]
    })
}

/// Price per 1000 tokens for a model, by first matching prefix. Unknown
/// models fall back to [`DEFAULT_PRICE_PER_1K`].
pub fn price_per_1k(model: &str) -> f64 {
    get_price_table()
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, price)| *price)
        .unwrap_or(DEFAULT_PRICE_PER_1K)
}

/// Per-model slice of the cost report.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCost {
    pub entries: u64,
    pub tokens: u64,
    pub hits: u64,
    pub price_per_1k: f64,
    /// Cost of producing these responses once: `tokens × price`.
    pub value: f64,
    /// Cost avoided by serving hits from cache: `tokens × hits × price`.
    pub saved: f64,
}

/// Estimated value of the cache contents, grouped by model.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostReport {
    pub models: BTreeMap<String, ModelCost>,
    pub total_entries: u64,
    pub total_tokens: u64,
    pub total_hits: u64,
    pub total_value: f64,
    pub total_saved: f64,
}

/// Fold entries into a [`CostReport`].
pub fn estimate<'a>(entries: impl IntoIterator<Item = &'a CacheEntry>) -> CostReport {
    let mut report = CostReport::default();

    for entry in entries {
        let price = price_per_1k(&entry.model);
        let value = entry.tokens as f64 / 1000.0 * price;
        let saved = (entry.tokens * entry.hits) as f64 / 1000.0 * price;

        let model = report
            .models
            .entry(entry.model.clone())
            .or_insert_with(|| ModelCost {
                price_per_1k: price,
                ..Default::default()
            });
        model.entries += 1;
        model.tokens += entry.tokens;
        model.hits += entry.hits;
        model.value += value;
        model.saved += saved;

        report.total_entries += 1;
        report.total_tokens += entry.tokens;
        report.total_hits += entry.hits;
        report.total_value += value;
        report.total_saved += saved;
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(model: &str, tokens: u64, hits: u64) -> CacheEntry {
        let mut entry = CacheEntry::new("p", "r", model, Some(tokens), None, None);
        entry.hits = hits;
        entry
    }

    #[test]
    fn test_prefix_pricing() {
        assert_eq!(price_per_1k("gpt-4o-2024-08-06"), 0.01);
        assert_eq!(price_per_1k("gpt-4o-mini-2024-07-18"), 0.0006);
        assert_eq!(price_per_1k("claude-3-opus-20240229"), 0.075);
        assert_eq!(price_per_1k("llama3:8b"), 0.0);
        assert_eq!(price_per_1k("some-unknown-model"), DEFAULT_PRICE_PER_1K);
    }

    #[test]
    fn test_estimate_groups_by_model() {
        let entries = vec![
            entry("gpt-4", 1000, 3),
            entry("gpt-4", 500, 0),
            entry("gpt-3.5-turbo", 2000, 1),
        ];
        let report = estimate(entries.iter());

        assert_eq!(report.total_entries, 3);
        assert_eq!(report.total_tokens, 3500);
        assert_eq!(report.total_hits, 4);
        assert_eq!(report.models.len(), 2);

        let gpt4 = &report.models["gpt-4"];
        assert_eq!(gpt4.entries, 2);
        assert_eq!(gpt4.tokens, 1500);
        // 1500 tokens once at 0.06/1K
        assert!((gpt4.value - 0.09).abs() < 1e-9);
        // 1000 tokens served 3 times
        assert!((gpt4.saved - 0.18).abs() < 1e-9);
    }

    #[test]
    fn test_empty_cache_estimates_zero() {
        let report = estimate(std::iter::empty());
        assert_eq!(report.total_entries, 0);
        assert_eq!(report.total_value, 0.0);
        assert!(report.models.is_empty());
    }
}
