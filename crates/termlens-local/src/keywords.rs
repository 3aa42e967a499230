//! Lexical keyword extraction.
//!
//! Deterministic and offline: tokens are split on anything non-alphanumeric, stop words and
//! one-character ASCII tokens are dropped, duplicates collapse case-insensitively, and the
//! survivors are ranked by frequency, ties broken by first occurrence.

use std::collections::HashMap;
use termlens_core::{KeywordExtractor, Result};

const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "can", "define", "definition",
    "describe", "do", "does", "explain", "for", "from", "how", "i", "in", "is", "it", "me",
    "mean", "meaning", "means", "of", "on", "or", "please", "tell", "that", "the", "this", "to",
    "was", "what", "whats", "when", "where", "which", "who", "why", "with",
];

fn is_stop_word(token_lc: &str) -> bool {
    STOP_WORDS.binary_search(&token_lc).is_ok()
}

#[derive(Debug, Clone, Copy)]
pub struct TokenKeywordExtractor {
    max_keywords: usize,
}

impl TokenKeywordExtractor {
    pub fn new(max_keywords: usize) -> Self {
        Self {
            max_keywords: max_keywords.max(1),
        }
    }

    /// Synchronous core of [`KeywordExtractor::extract`].
    pub fn keywords(&self, text: &str) -> Vec<String> {
        // (surface form of first occurrence, first index, count)
        let mut seen: HashMap<String, (String, usize, usize)> = HashMap::new();
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty());
        for (i, tok) in tokens.enumerate() {
            let lc = tok.to_lowercase();
            if tok.is_ascii() && tok.len() < 2 {
                continue;
            }
            if is_stop_word(&lc) {
                continue;
            }
            seen.entry(lc)
                .and_modify(|e| e.2 += 1)
                .or_insert_with(|| (tok.to_string(), i, 1));
        }

        let mut ranked: Vec<(String, usize, usize)> = seen.into_values().collect();
        ranked.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)));
        ranked
            .into_iter()
            .take(self.max_keywords)
            .map(|(surface, _, _)| surface)
            .collect()
    }
}

impl Default for TokenKeywordExtractor {
    fn default() -> Self {
        Self::new(8)
    }
}

#[async_trait::async_trait]
impl KeywordExtractor for TokenKeywordExtractor {
    async fn extract(&self, query: &str) -> Result<Vec<String>> {
        Ok(self.keywords(query))
    }
}
