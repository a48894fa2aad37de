/// Transcript matching rules
///
/// Decides whether a transcript satisfies a phrase-set. Exact rules are plain
/// string predicates; the ratio rules compute an edit-distance-based
/// similarity in [0, 1] against a threshold, with token-order-insensitive,
/// subset-insensitive and substring-biased variants.

use crate::transcribe::UNK_TOKEN;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::trace;

/// Default threshold for score-based rules
pub const DEFAULT_THRESHOLD: f32 = 0.75;

/// Comparison strategy for phrase vs transcript
///
/// The rule set is closed; dispatch is a single match, not a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    #[default]
    Contains,
    Equals,
    #[serde(alias = "starts")]
    StartsWith,
    #[serde(alias = "ends")]
    EndsWith,
    Fuzzy,
    TokenSortRatio,
    TokenSetRatio,
    PartialTokenSortRatio,
    PartialTokenSetRatio,
}

/// Normalize text for comparison: lower-case and trim
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Evaluate a transcript against a phrase-set under a rule
///
/// Phrases are normalized before comparison. The first phrase that satisfies
/// the rule short-circuits; there is no search for a best match. Empty,
/// whitespace-only and unknown-token transcripts never match any rule.
pub fn evaluate(transcript: &str, phrases: &[String], rule: Rule, threshold: f32) -> bool {
    let transcript = normalize(transcript);
    if transcript.is_empty() || transcript == UNK_TOKEN {
        return false;
    }

    for phrase in phrases {
        let phrase = normalize(phrase);

        let hit = match rule {
            Rule::Contains => transcript.contains(&phrase),
            Rule::Equals => transcript == phrase,
            Rule::StartsWith => transcript.starts_with(&phrase),
            Rule::EndsWith => transcript.ends_with(&phrase),
            Rule::Fuzzy
            | Rule::TokenSortRatio
            | Rule::TokenSetRatio
            | Rule::PartialTokenSortRatio
            | Rule::PartialTokenSetRatio => {
                let score = similarity(&phrase, &transcript, rule);
                trace!(
                    "similarity({:?}, '{}' vs '{}') = {:.3}",
                    rule,
                    phrase,
                    transcript,
                    score
                );
                score >= threshold
            }
        };

        if hit {
            return true;
        }
    }

    false
}

/// Similarity score in [0, 1] for the given ratio rule
///
/// Exact rules are not scored; they fall back to plain fuzzy similarity.
pub fn similarity(phrase: &str, transcript: &str, rule: Rule) -> f32 {
    match rule {
        Rule::TokenSortRatio => ratio(&token_sort(phrase), &token_sort(transcript)),
        Rule::TokenSetRatio => token_set_similarity(phrase, transcript, ratio),
        Rule::PartialTokenSortRatio => {
            partial_ratio(&token_sort(phrase), &token_sort(transcript))
        }
        Rule::PartialTokenSetRatio => token_set_similarity(phrase, transcript, partial_ratio),
        _ => ratio(phrase, transcript),
    }
}

/// Normalized Levenshtein similarity between two strings
fn ratio(a: &str, b: &str) -> f32 {
    let len = a.chars().count().max(b.chars().count());
    if len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f32 / len as f32
}

/// Best similarity of the shorter string against any equal-length window of
/// the longer one
fn partial_ratio(a: &str, b: &str) -> f32 {
    let (short, long): (Vec<char>, Vec<char>) = if a.chars().count() <= b.chars().count() {
        (a.chars().collect(), b.chars().collect())
    } else {
        (b.chars().collect(), a.chars().collect())
    };

    if short.is_empty() {
        return if long.is_empty() { 1.0 } else { 0.0 };
    }

    let needle: String = short.iter().collect();
    let mut best: f32 = 0.0;
    for start in 0..=(long.len() - short.len()) {
        let window: String = long[start..start + short.len()].iter().collect();
        best = best.max(ratio(&needle, &window));
        if best >= 1.0 {
            break;
        }
    }
    best
}

/// Rebuild a string from its whitespace tokens in sorted order
fn token_sort(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Token-set similarity: compare the shared tokens against each side's
/// shared-plus-remainder form and take the best score
fn token_set_similarity(a: &str, b: &str, score: fn(&str, &str) -> f32) -> f32 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let intersection = join(tokens_a.intersection(&tokens_b).copied());
    let a_full = join_nonempty(&intersection, join(tokens_a.difference(&tokens_b).copied()));
    let b_full = join_nonempty(&intersection, join(tokens_b.difference(&tokens_a).copied()));

    score(&intersection, &a_full)
        .max(score(&intersection, &b_full))
        .max(score(&a_full, &b_full))
}

fn join<'a>(tokens: impl Iterator<Item = &'a str>) -> String {
    tokens.collect::<Vec<&str>>().join(" ")
}

fn join_nonempty(head: &str, tail: String) -> String {
    if head.is_empty() {
        tail
    } else if tail.is_empty() {
        head.to_string()
    } else {
        format!("{} {}", head, tail)
    }
}

/// Character-level Levenshtein edit distance
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];

    for i in 0..=a.len() {
        dp[i][0] = i;
    }
    for j in 0..=b.len() {
        dp[0][j] = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[a.len()][b.len()]
}
