//! Search-as-you-type ranking for filter value lists.
//!
//! Candidates are placed into discrete relevance bands (exact, prefix,
//! word-boundary, substring, similarity). A candidate lands in the first band
//! it qualifies for, and band order strictly dominates the final ordering:
//! a similarity hit never outranks a substring hit no matter how close its
//! numeric score gets.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// Mid-range default on the 0-100 score scale.
pub const DEFAULT_THRESHOLD: u8 = 65;

/// Minimum normalized edit similarity for the lowest band. Anything under
/// this is excluded entirely.
const SIMILARITY_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Band {
    Exact,
    Prefix,
    WordBoundary,
    Substring,
    Similarity,
}

impl Band {
    /// Numeric score band, checked against the configured threshold.
    fn base_score(self) -> f64 {
        match self {
            Band::Exact => 100.0,
            Band::Prefix => 90.0,
            Band::WordBoundary => 85.0,
            Band::Substring => 80.0,
            Band::Similarity => 70.0,
        }
    }
}

/// Sort key for one classified candidate. `band` dominates; `primary` and
/// `secondary` are the per-band tie-breaks; stable sort preserves original
/// order beyond that.
#[derive(Debug, Clone)]
struct RankKey {
    band: Band,
    score: f64,
    primary: u64,
    secondary: String,
}

type Classifier = fn(&str, &str) -> Option<RankKey>;

/// Ordered classifier chain; the first Some wins, making bands mutually
/// exclusive per candidate.
const CLASSIFIERS: &[Classifier] = &[
    classify_exact,
    classify_prefix,
    classify_word_boundary,
    classify_substring,
    classify_similarity,
];

fn classify_exact(query: &str, candidate: &str) -> Option<RankKey> {
    (candidate == query).then(|| RankKey {
        band: Band::Exact,
        score: Band::Exact.base_score(),
        primary: 0,
        secondary: String::new(),
    })
}

/// Prefix matches: shorter candidates first, then alphabetical.
fn classify_prefix(query: &str, candidate: &str) -> Option<RankKey> {
    candidate.starts_with(query).then(|| RankKey {
        band: Band::Prefix,
        score: Band::Prefix.base_score(),
        primary: candidate.chars().count() as u64,
        secondary: candidate.to_string(),
    })
}

/// Any whitespace-delimited word of the candidate starts with the query.
fn classify_word_boundary(query: &str, candidate: &str) -> Option<RankKey> {
    candidate
        .split_whitespace()
        .any(|w| w.starts_with(query))
        .then(|| RankKey {
            band: Band::WordBoundary,
            score: Band::WordBoundary.base_score(),
            primary: candidate.chars().count() as u64,
            secondary: candidate.to_string(),
        })
}

/// Substring anywhere; earlier occurrence outranks later. Position is
/// counted in characters so multibyte text ahead of the match doesn't skew
/// the ordering.
fn classify_substring(query: &str, candidate: &str) -> Option<RankKey> {
    candidate.find(query).map(|pos| RankKey {
        band: Band::Substring,
        score: Band::Substring.base_score(),
        primary: candidate[..pos].chars().count() as u64,
        secondary: String::new(),
    })
}

/// Normalized edit similarity, scaled into the lowest score band.
fn classify_similarity(query: &str, candidate: &str) -> Option<RankKey> {
    let ratio = strsim::normalized_levenshtein(query, candidate);
    if ratio <= SIMILARITY_FLOOR {
        return None;
    }
    Some(RankKey {
        band: Band::Similarity,
        score: (ratio * 100.0).min(Band::Similarity.base_score()),
        // Higher similarity sorts first.
        primary: ((1.0 - ratio) * 1_000_000.0) as u64,
        secondary: String::new(),
    })
}

/// Ranks candidate strings against an incremental query.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatcher {
    threshold: u8,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        FuzzyMatcher {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl FuzzyMatcher {
    pub fn new(threshold: u8) -> Self {
        FuzzyMatcher {
            threshold: threshold.min(100),
        }
    }

    /// Rank `candidates` by relevance to `query`.
    ///
    /// Empty query returns all candidates in their original order. Any panic
    /// inside the scoring path falls back to plain case-insensitive substring
    /// filtering with original order preserved.
    pub fn rank(&self, query: &str, candidates: &[String]) -> Vec<String> {
        if query.is_empty() {
            return candidates.to_vec();
        }
        let threshold = self.threshold;
        match catch_unwind(AssertUnwindSafe(|| ranked(query, candidates, threshold))) {
            Ok(out) => out,
            Err(_) => {
                warn!(query, "fuzzy ranking failed, falling back to substring filter");
                substring_fallback(query, candidates)
            }
        }
    }
}

fn ranked(query: &str, candidates: &[String], threshold: u8) -> Vec<String> {
    let query = query.to_lowercase();
    let mut scored: Vec<(RankKey, &String)> = Vec::new();
    for candidate in candidates {
        let lower = candidate.to_lowercase();
        let key = CLASSIFIERS.iter().find_map(|c| c(&query, &lower));
        if let Some(key) = key {
            if key.score >= threshold as f64 {
                scored.push((key, candidate));
            }
        }
    }
    // Stable sort: candidates tying on every key keep their original order.
    scored.sort_by(|(a, _), (b, _)| {
        a.band
            .cmp(&b.band)
            .then(a.primary.cmp(&b.primary))
            .then(a.secondary.cmp(&b.secondary))
    });
    scored.into_iter().map(|(_, c)| c.clone()).collect()
}

fn substring_fallback(query: &str, candidates: &[String]) -> Vec<String> {
    let query = query.to_lowercase();
    candidates
        .iter()
        .filter(|c| c.to_lowercase().contains(&query))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_query_returns_original_order() {
        let cands = values(&["Zeta", "Acme", "Mid"]);
        let m = FuzzyMatcher::default();
        assert_eq!(m.rank("", &cands), cands);
    }

    #[test]
    fn exact_beats_prefix_beats_substring() {
        let cands = values(&["Acme Industries", "ACME", "Big Acme Corp"]);
        let m = FuzzyMatcher::new(0);
        let out = m.rank("acme", &cands);
        assert_eq!(out[0], "ACME");
        assert_eq!(out[1], "Acme Industries");
        // "Big Acme Corp" matches at a word boundary, which outranks nothing
        // here but still appears last of the three.
        assert_eq!(out[2], "Big Acme Corp");
    }

    #[test]
    fn prefix_ties_break_shorter_then_alpha() {
        let cands = values(&["Janvier Long", "Jan B", "Jan A"]);
        let m = FuzzyMatcher::new(0);
        let out = m.rank("jan", &cands);
        assert_eq!(out, values(&["Jan A", "Jan B", "Janvier Long"]));
    }

    #[test]
    fn substring_earlier_occurrence_first() {
        let cands = values(&["xx acme", "x acme", "acme tail"]);
        let m = FuzzyMatcher::new(0);
        let out = m.rank("acme", &cands);
        // "acme tail" is a prefix match; the other two are word-boundary
        // matches broken by length.
        assert_eq!(out[0], "acme tail");
        assert_eq!(out[1], "x acme");
        assert_eq!(out[2], "xx acme");
    }

    #[test]
    fn substring_position_counts_characters_not_bytes() {
        // "éé" is two characters (four bytes); "zzz" is three characters.
        let cands = values(&["zzzacme", "ééacme"]);
        let m = FuzzyMatcher::new(0);
        let out = m.rank("acme", &cands);
        assert_eq!(out, values(&["ééacme", "zzzacme"]));
    }

    #[test]
    fn word_boundary_outranks_plain_substring() {
        let cands = values(&["preacme glued", "big acme corp"]);
        let m = FuzzyMatcher::new(0);
        let out = m.rank("acme", &cands);
        assert_eq!(out[0], "big acme corp");
        assert_eq!(out[1], "preacme glued");
    }

    #[test]
    fn low_similarity_excluded() {
        let cands = values(&["completely different"]);
        let m = FuzzyMatcher::new(0);
        assert!(m.rank("acme", &cands).is_empty());
    }

    #[test]
    fn similarity_included_above_floor_and_threshold() {
        // One edit away from the query.
        let cands = values(&["acne"]);
        let m = FuzzyMatcher::new(60);
        let out = m.rank("acme", &cands);
        assert_eq!(out, values(&["acne"]));
        // Threshold above the similarity band excludes it.
        let strict = FuzzyMatcher::new(90);
        assert!(strict.rank("acme", &cands).is_empty());
    }

    #[test]
    fn threshold_filters_whole_bands() {
        let cands = values(&["contains acme somewhere", "acme"]);
        // 95 keeps only the exact band.
        let m = FuzzyMatcher::new(95);
        assert_eq!(m.rank("acme", &cands), values(&["acme"]));
    }

    #[test]
    fn case_insensitive_throughout() {
        let cands = values(&["ACME CORP"]);
        let m = FuzzyMatcher::default();
        assert_eq!(m.rank("aCmE c", &cands), values(&["ACME CORP"]));
    }
}
