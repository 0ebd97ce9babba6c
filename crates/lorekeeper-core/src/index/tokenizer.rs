//! Deterministic, language-agnostic tokenization.
//!
//! The tokenizer lowercases its input, splits on runs of non-alphanumeric
//! characters, and discards tokens shorter than
//! [`MIN_TOKEN_LEN`](crate::config::MIN_TOKEN_LEN). No stemming, no stopword
//! list: the idf weighting already suppresses ubiquitous terms, and keeping
//! the rules this small makes indexing reproducible across rebuilds.

use crate::config::MIN_TOKEN_LEN;
use std::collections::BTreeMap;

/// Tokenizes text into lowercase terms.
///
/// Splits on every run of non-alphanumeric characters (Unicode-aware) and
/// drops tokens shorter than [`MIN_TOKEN_LEN`](crate::config::MIN_TOKEN_LEN).
/// Returns tokens in document order, duplicates included.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

/// Tokenizes text into `(term -> occurrence count, total token count)`.
///
/// The total counts every kept token, not distinct terms; it is the
/// denominator of the term-frequency weight. The map is ordered so that
/// downstream floating-point accumulation visits terms in a fixed order,
/// keeping scores bit-identical between incremental updates and rebuilds.
pub fn term_counts(text: &str) -> (BTreeMap<String, u32>, u32) {
    let tokens = tokenize(text);
    let total = tokens.len() as u32;

    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for token in tokens {
        *counts.entry(token).or_insert(0) += 1;
    }
    (counts, total)
}
