//! Local feature-hashing embedder.
//!
//! Maps lowercase word unigrams and adjacent bigrams into a fixed number of
//! signed buckets and L2-normalizes the result. Needs no network and is fully
//! deterministic, which makes it the offline backend and the one tests use.

use super::{l2_normalize, Embedder};
use crate::error::{MarqueeError, Result};
use async_trait::async_trait;

const BIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic bag-of-words embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimensions == 0 {
            return Err(MarqueeError::Embedding(
                "Hashing embedder configured with zero dimensions".to_string(),
            ));
        }

        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut vector = vec![0.0f32; self.dimensions];
        for token in &tokens {
            self.accumulate(&mut vector, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, bigram.as_bytes(), BIGRAM_WEIGHT);
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

/// 64-bit FNV-1a; stable across processes and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, b| (hash ^ *b as u64).wrapping_mul(PRIME))
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.encode(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::cosine_similarity;

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(384);
        let a = embedder.embed("Dreams within dreams").await.unwrap();
        let b = embedder.embed("dreams WITHIN dreams!").await.unwrap();
        assert_eq!(a.len(), 384);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hashing_embedder_similarity_tracks_overlap() {
        let embedder = HashingEmbedder::new(384);
        let query = embedder.embed("themes of grief and memory").await.unwrap();
        let close = embedder.embed("the film explores grief and memory").await.unwrap();
        let far = embedder.embed("box office receipts in europe").await.unwrap();
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn test_zero_dimensions_fails() {
        let embedder = HashingEmbedder::new(0);
        assert!(embedder.embed("anything").await.is_err());
    }
}
