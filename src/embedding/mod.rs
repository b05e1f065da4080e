//! Embedding generation for semantic search and retrieval.
//!
//! Backends implement [`Embedder`]. The request path goes through
//! [`EmbeddingGenerator`], which adds the shared model handle, dimension
//! checks, optional normalization and the bounded query cache.

mod cache;
mod generator;
mod hashing;
mod model;
mod openai;

pub use cache::EmbeddingCache;
pub use generator::EmbeddingGenerator;
pub use hashing::HashingEmbedder;
pub use model::ModelHandle;
pub use openai::OpenAIEmbedder;

use crate::config::EmbeddingSettings;
use crate::error::{MarqueeError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Build a model handle for the configured provider. Loading is deferred to
/// first use.
pub fn model_handle_from_settings(settings: &EmbeddingSettings) -> Result<ModelHandle> {
    let dimensions = settings.dimensions as usize;
    match settings.provider.as_str() {
        "openai" => {
            let model = settings.model.clone();
            Ok(ModelHandle::lazy(move || {
                let model = model.clone();
                async move {
                    let embedder = OpenAIEmbedder::with_config(&model, dimensions)?;
                    Ok(Arc::new(embedder) as Arc<dyn Embedder>)
                }
            }))
        }
        "hashing" => Ok(ModelHandle::ready(Arc::new(HashingEmbedder::new(dimensions)))),
        other => Err(MarqueeError::Config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}
