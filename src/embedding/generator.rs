//! The embedding entry point used by the retrieval pipeline.

use super::{l2_normalize, EmbeddingCache, Embedder, ModelHandle};
use crate::error::{MarqueeError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Embeds text through the shared model handle, checking dimensions and
/// caching query embeddings.
///
/// Inference errors are returned as-is. There is no retry and no silent
/// zero-vector fallback.
pub struct EmbeddingGenerator {
    model: Arc<ModelHandle>,
    cache: Arc<EmbeddingCache>,
    dimensions: usize,
    normalize: bool,
}

impl EmbeddingGenerator {
    pub fn new(model: Arc<ModelHandle>, cache: Arc<EmbeddingCache>, dimensions: usize) -> Self {
        Self {
            model,
            cache,
            dimensions,
            normalize: true,
        }
    }

    /// Set whether embeddings are scaled to unit length.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    fn finish(&self, mut vector: Vec<f32>) -> Result<Vec<f32>> {
        if vector.len() != self.dimensions {
            return Err(MarqueeError::Embedding(format!(
                "Model returned {} dimensions, expected {}",
                vector.len(),
                self.dimensions
            )));
        }
        if self.normalize {
            l2_normalize(&mut vector);
        }
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for EmbeddingGenerator {
    #[instrument(skip(self, text), fields(chars = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.get(text) {
            debug!("Using cached embedding");
            return Ok(cached);
        }

        let model = self.model.get().await?;
        let vector = self.finish(model.embed(text).await?)?;
        self.cache.insert(text, vector.clone());
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.get().await?;
        model
            .embed_batch(texts)
            .await?
            .into_iter()
            .map(|v| self.finish(v))
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
