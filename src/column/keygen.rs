//! Index key generation
//!
//! A keygen maps one column value to the index entries it should produce:
//! a list of tokens (set membership, or prefix/suffix entries), a list of
//! `token -> score` pairs (sorted-set range entries), or nothing at all.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{ModelError, Result};
use super::Value;

/// Bytes of a token folded into a prefix score.
///
/// 257^6 stays below 2^53, so every score is exact in an f64.
pub const PREFIX_SCORE_BYTES: usize = 6;

/// Keygen output
#[derive(Debug, Clone, PartialEq)]
pub enum Keys {
    /// Set-membership tokens
    Tokens(Vec<String>),

    /// Range entries; an empty token scores the column itself
    Scores(Vec<(String, f64)>),

    /// Value produces no index entries
    Empty,
}

/// User supplied key generation function
pub type KeygenFn = Arc<dyn Fn(&Value) -> Keys + Send + Sync>;

/// Key generation strategy for an indexed column
#[derive(Clone)]
pub enum Keygen {
    /// Value is its own score in `<ns>:<column>:idx`
    Numeric,

    /// `true` / `false` membership token
    Boolean,

    /// Prefix score under the column plus an exact-match key per value
    Simple,

    /// `Simple` over the lowercased value
    CaseInsensitive,

    /// Lowercased word tokens
    FullText,

    Custom(KeygenFn),
}

impl fmt::Debug for Keygen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Keygen::Numeric => write!(f, "Numeric"),
            Keygen::Boolean => write!(f, "Boolean"),
            Keygen::Simple => write!(f, "Simple"),
            Keygen::CaseInsensitive => write!(f, "CaseInsensitive"),
            Keygen::FullText => write!(f, "FullText"),
            Keygen::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Keygen {
    /// Wrap a closure as a custom keygen
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Keys + Send + Sync + 'static,
    {
        Keygen::Custom(Arc::new(f))
    }

    /// Generate index entries for a non-null value
    pub fn generate(&self, value: &Value) -> Result<Keys> {
        let keys = match self {
            Keygen::Numeric => match value.as_f64() {
                Some(score) => Keys::Scores(vec![(String::new(), score)]),
                None => return Err(not_keyable(value)),
            },
            Keygen::Boolean => match value.as_bool() {
                Some(b) => Keys::Tokens(vec![b.to_string()]),
                None => return Err(not_keyable(value)),
            },
            Keygen::Simple => match value.as_str() {
                Some(s) => simple_scores(s),
                None => return Err(not_keyable(value)),
            },
            Keygen::CaseInsensitive => match value.as_str() {
                Some(s) => simple_scores(&s.to_lowercase()),
                None => return Err(not_keyable(value)),
            },
            Keygen::FullText => match value.as_str() {
                Some(s) => full_text_tokens(s),
                None => return Err(not_keyable(value)),
            },
            Keygen::Custom(f) => f(value),
        };

        match keys {
            Keys::Tokens(tokens) if tokens.is_empty() => Ok(Keys::Empty),
            Keys::Scores(scores) if scores.is_empty() => Ok(Keys::Empty),
            Keys::Scores(scores) => {
                if let Some((token, score)) = scores.iter().find(|(_, s)| !s.is_finite()) {
                    return Err(ModelError::Column(format!(
                        "Don't know how to turn score {} for token {:?} into an index entry",
                        score, token
                    )));
                }
                Ok(Keys::Scores(scores))
            }
            other => Ok(other),
        }
    }

    /// Token stored in prefix/suffix indexes for score-producing keygens.
    ///
    /// Only the string keygens define one; `None` means the column cannot
    /// feed a prefix or suffix index from its scores.
    pub fn affix_token(&self, value: &Value) -> Option<String> {
        match self {
            Keygen::Simple => value.as_str().map(str::to_string),
            Keygen::CaseInsensitive => value.as_str().map(str::to_lowercase),
            _ => None,
        }
    }
}

fn not_keyable(value: &Value) -> ModelError {
    ModelError::Column(format!(
        "Don't know how to turn {} value {} into a sequence of keys",
        value.type_name(),
        value
    ))
}

fn simple_scores(s: &str) -> Keys {
    Keys::Scores(vec![
        (String::new(), prefix_score(s, false)),
        (s.to_string(), 0.0),
    ])
}

fn full_text_tokens(s: &str) -> Keys {
    let words: BTreeSet<String> = s
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    Keys::Tokens(words.into_iter().collect())
}

/// Order-preserving score for the first bytes of a token.
///
/// Each byte contributes `byte + 1` in base 257 (0 marks the end of a short
/// token), so byte-wise string order maps onto score order. With `next`
/// set, returns the exclusive upper bound of every token sharing `token`
/// as a prefix.
pub fn prefix_score(token: &str, next: bool) -> f64 {
    let bytes = token.as_bytes();
    let used = bytes.len().min(PREFIX_SCORE_BYTES);

    let mut score: u64 = 0;
    for &b in &bytes[..used] {
        score = score * 257 + (b as u64 + 1);
    }
    if next {
        score += 1;
    }
    score *= 257u64.pow((PREFIX_SCORE_BYTES - used) as u32);

    score as f64
}

/// Reverse a token for suffix indexing
pub fn reverse_token(token: &str) -> String {
    token.chars().rev().collect()
}
