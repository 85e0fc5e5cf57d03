//! Vocabulary construction and text encoding
//!
//! Maps tokens to dense integer ids for the embedding layers. Built once from
//! the training corpus and persisted alongside the trained model.

use crate::{Result, TextCatError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved id for padding positions
pub const PAD_ID: i32 = 0;
/// Reserved id for out-of-vocabulary tokens
pub const UNK_ID: i32 = 1;

/// Token-to-id mapping with reserved padding and unknown entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    token_to_id: HashMap<String, i32>,
}

impl Vocabulary {
    /// Build a vocabulary from raw texts, keeping the `max_size` most
    /// frequent tokens (reserved ids included in the budget)
    pub fn build<'a>(texts: impl Iterator<Item = &'a str>, max_size: usize) -> Self {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for token in tokenize(text) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }

        // Most frequent first; ties broken alphabetically for stable ids
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let budget = max_size.saturating_sub(2);
        let token_to_id = ranked
            .into_iter()
            .take(budget)
            .enumerate()
            .map(|(idx, (token, _))| (token, idx as i32 + 2))
            .collect();

        Vocabulary { token_to_id }
    }

    /// Total number of ids, reserved entries included
    pub fn len(&self) -> usize {
        self.token_to_id.len() + 2
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    pub fn id_of(&self, token: &str) -> i32 {
        self.token_to_id.get(token).copied().unwrap_or(UNK_ID)
    }

    /// Encode a text into ids padded or truncated to `max_len`, with a mask
    /// marking real (non-padding) positions
    pub fn encode(&self, text: &str, max_len: usize) -> (Vec<i32>, Vec<bool>) {
        let mut ids: Vec<i32> = tokenize(text)
            .map(|t| self.id_of(&t))
            .take(max_len)
            .collect();
        let mut mask = vec![true; ids.len()];

        while ids.len() < max_len {
            ids.push(PAD_ID);
            mask.push(false);
        }

        (ids, mask)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string(self)
            .map_err(|e| TextCatError::Parse(format!("Failed to serialize vocabulary: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| TextCatError::Parse(format!("Failed to parse vocabulary {}: {}", path, e)))
    }
}

/// Lowercased alphanumeric tokenization
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_lookup() {
        let texts = ["the cat sat", "the dog sat", "the end"];
        let vocab = Vocabulary::build(texts.iter().copied(), 100);

        // "the" is the most frequent token, so it gets the first free id
        assert_eq!(vocab.id_of("the"), 2);
        assert_eq!(vocab.id_of("aardvark"), UNK_ID);
        assert_eq!(vocab.len(), 7); // 5 tokens + pad + unk
    }

    #[test]
    fn test_encode_pads_and_masks() {
        let vocab = Vocabulary::build(["a b c"].iter().copied(), 100);
        let (ids, mask) = vocab.encode("a b", 4);

        assert_eq!(ids.len(), 4);
        assert_eq!(mask, vec![true, true, false, false]);
        assert_eq!(ids[2], PAD_ID);
        assert_eq!(ids[3], PAD_ID);
    }

    #[test]
    fn test_encode_truncates() {
        let vocab = Vocabulary::build(["a b c d e"].iter().copied(), 100);
        let (ids, mask) = vocab.encode("a b c d e", 3);

        assert_eq!(ids.len(), 3);
        assert!(mask.iter().all(|&m| m));
    }

    #[test]
    fn test_max_size_keeps_most_frequent() {
        let texts = ["x x x y y z"];
        let vocab = Vocabulary::build(texts.iter().copied(), 4);

        // Budget of 2 real tokens: "x" and "y" survive, "z" maps to unknown
        assert_ne!(vocab.id_of("x"), UNK_ID);
        assert_ne!(vocab.id_of("y"), UNK_ID);
        assert_eq!(vocab.id_of("z"), UNK_ID);
    }

    #[test]
    fn test_tokenize_strips_punctuation() {
        let tokens: Vec<String> = tokenize("Hello, World! 123").collect();
        assert_eq!(tokens, vec!["hello", "world", "123"]);
    }
}
