//! Mock embedding provider producing per-word trigram multi-vectors.

use crate::embeddings::provider::EmbeddingProvider;
use crate::types::{MultiVector, PageItem};
use docseek_core::{AppError, AppResult};
use std::collections::HashSet;

/// Upper bound on vectors per page, standing in for a patch grid.
const MAX_VECTORS: usize = 32;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "png", "pdf", "page",
];

/// Mock provider for testing and development.
///
/// Every distinct informative word of the page text (or, without text, of the
/// file name) becomes one unit vector built from hashed character trigrams.
/// Identical words map to identical vectors, so MaxSim rewards pages sharing
/// words with the query. Output is deterministic.
#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
}

impl MockProvider {
    /// Create a new mock provider with specified per-vector dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn page_text(item: &PageItem) -> String {
        match &item.extracted_text {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ => item.source_filename.clone(),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let all: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let informative: Vec<&str> = all
            .iter()
            .copied()
            .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
            .collect();

        let chosen = if informative.is_empty() { all } else { informative };

        let mut seen = HashSet::new();
        chosen
            .into_iter()
            .filter(|w| seen.insert(*w))
            .take(MAX_VECTORS)
            .map(str::to_string)
            .collect()
    }

    fn word_vector(&self, word: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];

        let padded: Vec<char> = std::iter::once(' ')
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            let hash = window
                .iter()
                .fold(0u64, |acc, c| acc.wrapping_mul(37).wrapping_add(*c as u64));
            vector[(hash as usize) % self.dimensions] += 1.0;
        }

        let word_hash = word
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        vector[(word_hash as usize) % self.dimensions] += 1.0;

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        for v in &mut vector {
            *v /= norm;
        }
        vector
    }

    fn embed_text(&self, text: &str) -> AppResult<MultiVector> {
        if self.dimensions == 0 {
            return Err(AppError::Config(
                "Mock provider dimension must be positive".to_string(),
            ));
        }

        let tokens = Self::tokens(text);
        if tokens.is_empty() {
            return Err(AppError::Embedding(format!(
                "Cannot embed text without words: {:?}",
                text
            )));
        }

        MultiVector::new(tokens.iter().map(|t| self.word_vector(t)).collect())
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "trigram-multivector-v1"
    }

    async fn embed_items(&self, items: &[PageItem]) -> AppResult<Vec<MultiVector>> {
        items
            .iter()
            .map(|item| self.embed_text(&Self::page_text(item)))
            .collect()
    }

    async fn embed_query(&self, text: &str) -> AppResult<MultiVector> {
        self.embed_text(text)
    }
}
