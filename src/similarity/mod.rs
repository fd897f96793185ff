// TF-IDF similarity search over cached prompts
// Author: kelexine (https://github.com/kelexine)
//
// Classic bag-of-words TF-IDF with cosine ranking, no embeddings. Everything
// is recomputed per query and lives only in memory; nothing here is
// persisted. The IDF table is computed over the candidate prompts plus one
// synthetic document for the query itself, which keeps the denominator
// defined for terms that only the query contains.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::storage::CacheEntry;

/// Minimum similarity a candidate must reach to count as a match.
pub const DEFAULT_THRESHOLD: f64 = 0.3;

/// Maximum number of matches returned by a search.
pub const DEFAULT_LIMIT: usize = 10;

/// Threshold used when a single match must be good enough to reuse outright.
pub const BEST_MATCH_THRESHOLD: f64 = 0.8;

/// Knobs for [`find_similar`].
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub threshold: f64,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityMatch {
    pub hash: String,
    /// Exact cosine similarity in `[0, 1]`. Ranking uses this value.
    pub score: f64,
    pub entry: CacheEntry,
}

impl SimilarityMatch {
    /// Two-decimal score for presentation only.
    pub fn rounded_score(&self) -> f64 {
        (self.score * 100.0).round() / 100.0
    }
}

/// Lowercase, replace non-word characters with whitespace, split on
/// whitespace runs and drop tokens shorter than three characters. Duplicates
/// are retained; term frequency downstream needs them.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .filter(|token| token.len() > 2)
        .map(str::to_string)
        .collect()
}

/// Occurrences per distinct token divided by the total token count. An empty
/// token list yields an empty map, never a division by zero.
pub fn term_frequency(tokens: &[String]) -> HashMap<String, f64> {
    let mut frequencies = HashMap::new();
    if tokens.is_empty() {
        return frequencies;
    }

    let total = tokens.len() as f64;
    for token in tokens {
        *frequencies.entry(token.clone()).or_insert(0.0) += 1.0;
    }
    for value in frequencies.values_mut() {
        *value /= total;
    }
    frequencies
}

/// `ln(totalDocuments / documentsContainingToken)` for every token in the
/// corpus. A token present in every document scores 0.
pub fn inverse_document_frequency(documents: &[&[String]]) -> HashMap<String, f64> {
    let total = documents.len() as f64;
    let mut containing: HashMap<String, usize> = HashMap::new();
    for tokens in documents {
        let distinct: HashSet<&String> = tokens.iter().collect();
        for token in distinct {
            *containing.entry(token.clone()).or_insert(0) += 1;
        }
    }

    containing
        .into_iter()
        .map(|(token, count)| (token, (total / count as f64).ln()))
        .collect()
}

/// Per-token `tf * idf`, with tokens absent from the IDF table contributing 0.
pub fn tfidf_vector(tokens: &[String], idf: &HashMap<String, f64>) -> HashMap<String, f64> {
    term_frequency(tokens)
        .into_iter()
        .map(|(token, tf)| {
            let weight = tf * idf.get(&token).copied().unwrap_or(0.0);
            (token, weight)
        })
        .collect()
}

/// Cosine similarity between two sparse vectors. Exactly 0 when either norm
/// is 0: a zero vector is dissimilar to everything, never NaN.
pub fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let mut dot = 0.0;
    for (token, weight) in a {
        if let Some(other) = b.get(token) {
            dot += weight * other;
        }
    }

    let norm_a = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b = b.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Ephemeral per-query index: tokenized candidate prompts, the IDF table over
/// candidates plus the synthetic query document, and the query's own vector.
/// Built fresh for every search and dropped afterwards.
pub struct SimilarityIndex<'a> {
    candidates: &'a [(String, CacheEntry)],
    candidate_tokens: Vec<Vec<String>>,
    idf: HashMap<String, f64>,
    query_vector: HashMap<String, f64>,
}

impl<'a> SimilarityIndex<'a> {
    pub fn build(candidates: &'a [(String, CacheEntry)], query: &str) -> Self {
        let query_tokens = tokenize(query);
        let candidate_tokens: Vec<Vec<String>> = candidates
            .iter()
            .map(|(_, entry)| tokenize(&entry.prompt))
            .collect();

        let mut corpus: Vec<&[String]> = candidate_tokens.iter().map(Vec::as_slice).collect();
        corpus.push(&query_tokens);
        let idf = inverse_document_frequency(&corpus);
        let query_vector = tfidf_vector(&query_tokens, &idf);

        Self {
            candidates,
            candidate_tokens,
            idf,
            query_vector,
        }
    }

    /// Score every candidate against the query, keep those at or above the
    /// threshold, sort descending and cap. The sort is stable, so equal
    /// scores keep the original candidate order.
    pub fn ranked(&self, options: &SearchOptions) -> Vec<SimilarityMatch> {
        let mut matches: Vec<SimilarityMatch> = Vec::new();
        for ((hash, entry), tokens) in self.candidates.iter().zip(&self.candidate_tokens) {
            let vector = tfidf_vector(tokens, &self.idf);
            let score = cosine_similarity(&self.query_vector, &vector);
            if score >= options.threshold {
                matches.push(SimilarityMatch {
                    hash: hash.clone(),
                    score,
                    entry: entry.clone(),
                });
            }
        }

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(options.limit);
        matches
    }
}

/// Rank all candidates by similarity to `query`.
pub fn find_similar(
    candidates: &[(String, CacheEntry)],
    query: &str,
    options: &SearchOptions,
) -> Vec<SimilarityMatch> {
    if candidates.is_empty() {
        return Vec::new();
    }
    SimilarityIndex::build(candidates, query).ranked(options)
}

/// The single best candidate at or above `threshold`
/// ([`BEST_MATCH_THRESHOLD`] when unspecified), or nothing.
pub fn best_match(
    candidates: &[(String, CacheEntry)],
    query: &str,
    threshold: Option<f64>,
) -> Option<SimilarityMatch> {
    let options = SearchOptions {
        threshold: threshold.unwrap_or(BEST_MATCH_THRESHOLD),
        limit: 1,
    };
    find_similar(candidates, query, &options).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(hash: &str, prompt: &str) -> (String, CacheEntry) {
        (
            hash.to_string(),
            CacheEntry::new(prompt, "response", "default", None, None, None),
        )
    }

    #[test]
    fn test_tokenize_lowercases_splits_and_drops_short_tokens() {
        assert_eq!(
            tokenize("How do I use Rust's async/await?!"),
            vec!["how", "use", "rust", "async", "await"]
        );
        assert_eq!(tokenize("a an to of"), Vec::<String>::new());
        assert_eq!(tokenize(""), Vec::<String>::new());
        // duplicates are retained
        assert_eq!(tokenize("rust rust rust"), vec!["rust", "rust", "rust"]);
    }

    #[test]
    fn test_term_frequency_normalizes_by_total() {
        let tokens = tokenize("python python basics");
        let tf = term_frequency(&tokens);
        assert!((tf["python"] - 2.0 / 3.0).abs() < 1e-12);
        assert!((tf["basics"] - 1.0 / 3.0).abs() < 1e-12);

        assert!(term_frequency(&[]).is_empty());
    }

    #[test]
    fn test_idf_zero_for_ubiquitous_tokens() {
        let doc_a = tokenize("python basics");
        let doc_b = tokenize("python tutorial");
        let idf = inverse_document_frequency(&[&doc_a, &doc_b]);

        assert_eq!(idf["python"], 0.0);
        assert!((idf["basics"] - 2.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_of_empty_vectors_is_zero_not_nan() {
        let empty = HashMap::new();
        assert_eq!(cosine_similarity(&empty, &empty), 0.0);

        let mut one = HashMap::new();
        one.insert("python".to_string(), 0.5);
        assert_eq!(cosine_similarity(&one, &empty), 0.0);
        assert_eq!(cosine_similarity(&empty, &one), 0.0);
    }

    #[test]
    fn test_identical_prompt_scores_one() {
        let candidates = vec![
            candidate("aaa", "Python programming basics"),
            candidate("bbb", "JavaScript tutorial"),
        ];
        let matches = find_similar(&candidates, "Python programming basics", &SearchOptions::default());

        assert_eq!(matches[0].hash, "aaa");
        assert!((matches[0].score - 1.0).abs() < 1e-9);
        assert_eq!(matches[0].rounded_score(), 1.0);
    }

    #[test]
    fn test_disjoint_prompts_score_zero() {
        let candidates = vec![candidate("aaa", "kubernetes deployment")];
        let matches = find_similar(
            &candidates,
            "gardening tips",
            &SearchOptions {
                threshold: 0.0,
                ..Default::default()
            },
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 0.0);
    }

    #[test]
    fn test_query_term_ranks_matching_entry_only() {
        let candidates = vec![
            candidate("aaa", "Python programming basics"),
            candidate("bbb", "JavaScript tutorial"),
        ];
        let matches = find_similar(
            &candidates,
            "Python",
            &SearchOptions {
                threshold: 0.1,
                limit: 10,
            },
        );

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].hash, "aaa");
    }

    #[test]
    fn test_limit_caps_results_and_order_is_descending() {
        let candidates = vec![
            candidate("aaa", "rust ownership and borrowing"),
            candidate("bbb", "rust ownership"),
            candidate("ccc", "rust ownership and borrowing explained twice"),
            candidate("ddd", "unrelated cooking recipe"),
        ];
        let matches = find_similar(
            &candidates,
            "rust ownership",
            &SearchOptions {
                threshold: 0.0,
                limit: 2,
            },
        );

        assert_eq!(matches.len(), 2);
        assert!(matches[0].score >= matches[1].score);
    }

    #[test]
    fn test_no_candidates_short_circuits() {
        assert!(find_similar(&[], "anything", &SearchOptions::default()).is_empty());
    }

    #[test]
    fn test_empty_query_matches_nothing_above_zero() {
        let candidates = vec![candidate("aaa", "python basics")];
        assert!(find_similar(&candidates, "?!", &SearchOptions::default()).is_empty());

        // a zero threshold admits the zero scores
        let matches = find_similar(
            &candidates,
            "?!",
            &SearchOptions {
                threshold: 0.0,
                ..Default::default()
            },
        );
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_best_match_needs_a_strong_score() {
        let candidates = vec![
            candidate("aaa", "how to parse json in rust"),
            candidate("bbb", "completely different topic"),
        ];

        let found = best_match(&candidates, "how to parse json in rust", None);
        assert_eq!(found.map(|m| m.hash), Some("aaa".to_string()));

        assert!(best_match(&candidates, "how to parse yaml maybe", None).is_none());
    }
}
