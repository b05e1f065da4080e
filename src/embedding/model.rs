//! Once-initialized shared embedding model handle.
//!
//! The handle is created once per process and shared by `Arc`. The first
//! caller runs the loader; concurrent first callers wait on the same
//! initialization instead of loading twice. After that every call is a plain
//! read of the loaded model.

use super::Embedder;
use crate::error::Result;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

type Loader = Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Embedder>>> + Send + Sync>;

/// Shared, lazily loaded embedding model.
pub struct ModelHandle {
    cell: OnceCell<Arc<dyn Embedder>>,
    loader: Option<Loader>,
}

impl ModelHandle {
    /// A handle whose model is loaded on first use.
    ///
    /// A failed load leaves the handle empty, so a later request tries again.
    pub fn lazy<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Embedder>>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            loader: Some(Box::new(move || Box::pin(loader()))),
        }
    }

    /// A handle around an already loaded model.
    pub fn ready(model: Arc<dyn Embedder>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(model)),
            loader: None,
        }
    }

    /// Get the model, loading it if this is the first use.
    pub async fn get(&self) -> Result<Arc<dyn Embedder>> {
        let model = self
            .cell
            .get_or_try_init(|| async {
                match &self.loader {
                    Some(loader) => {
                        info!("Loading embedding model");
                        let model = loader().await?;
                        info!("Embedding model loaded ({} dimensions)", model.dimensions());
                        Ok(model)
                    }
                    None => Err(crate::error::MarqueeError::Embedding(
                        "Model handle has no loader".to_string(),
                    )),
                }
            })
            .await?;
        Ok(model.clone())
    }

    /// Whether the model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}
