//! English analyzer
//!
//! Splits on word boundaries, lowercases, drops stop words, and emits
//! `(term, token-position, byte-offset)` in source order. Positions count
//! every word token, including dropped stop words, so a stop word between
//! two terms breaks their bigram adjacency.

use unicode_segmentation::UnicodeSegmentation;

/// Stop words filtered by the English analyzer (the classic Lucene list).
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// One analyzed token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    /// Index among all word tokens of the text (stop words included)
    pub position: u32,
    /// Byte offset of the token in the source text
    pub offset: u32,
}

/// Whether a word-boundary segment is an actual word.
fn is_word(s: &str) -> bool {
    s.chars().any(|c| c.is_alphanumeric())
}

pub fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.contains(&term)
}

/// Analyze English text into tokens.
pub fn en_analyzer(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut position: u32 = 0;
    for (offset, word) in text.split_word_bound_indices() {
        if !is_word(word) {
            continue;
        }
        let term = word.to_lowercase();
        let pos = position;
        position += 1;
        if is_stop_word(&term) {
            continue;
        }
        tokens.push(Token {
            term,
            position: pos,
            offset: offset as u32,
        });
    }
    tokens
}
