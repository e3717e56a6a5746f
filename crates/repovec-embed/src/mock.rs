//! Test-only deterministic embedders.

use crate::embedder::TextEmbedder;
use crate::error::EmbedError;

/// Length of the word prefix that is hashed; lets "validate" and "validation" collide.
const PREFIX_CHARS: usize = 5;

/// Bag-of-word-prefixes embedder: each lowercase word prefix adds 1.0 to a
/// blake3-chosen bucket. Texts sharing vocabulary get positive cosine similarity,
/// texts with disjoint vocabulary score 0.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    #[must_use]
    pub fn dims(&self) -> usize {
        self.dims
    }

    fn bucket(&self, word: &str) -> usize {
        let hash = blake3::hash(word.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        let value = u64::from_le_bytes(head);
        #[allow(clippy::cast_possible_truncation)]
        let index = (value % self.dims as u64) as usize;
        index
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl TextEmbedder for HashingEmbedder {
    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let prefix: String = word.to_lowercase().chars().take(PREFIX_CHARS).collect();
            vector[self.bucket(&prefix)] += 1.0;
        }
        Ok(vector)
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Embedder whose every call fails with an inference error.
#[derive(Debug, Clone, Default)]
pub struct FailingEmbedder;

impl TextEmbedder for FailingEmbedder {
    fn embed_sync(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Inference("mock embedding failure".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}
