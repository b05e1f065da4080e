//! In-memory vector store implementation.
//!
//! Exact cosine search. Useful for testing and small catalogs.

use super::{
    cosine_similarity, sort_by_similarity, FilterSupport, SearchFilter, VectorMatch, VectorStore,
};
use crate::catalog::{ItemId, SectionKind};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

struct StoredVector {
    id: Uuid,
    vector: Vec<f32>,
}

/// In-memory vector store.
pub struct MemoryVectorStore {
    vectors: RwLock<HashMap<(ItemId, SectionKind), StoredVector>>,
    filter_support: FilterSupport,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store with native filtering.
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(HashMap::new()),
            filter_support: FilterSupport::Native,
        }
    }

    /// A store that behaves like an index without filter support: it ranks
    /// globally, ignores the filter and returns the global top-N.
    pub fn post_filter_only() -> Self {
        Self {
            vectors: RwLock::new(HashMap::new()),
            filter_support: FilterSupport::PostFilterOnly,
        }
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, item_id: ItemId, kind: SectionKind, vector: &[f32]) -> Result<()> {
        let mut vectors = self.vectors.write().unwrap();
        vectors
            .entry((item_id, kind))
            .and_modify(|stored| stored.vector = vector.to_vec())
            .or_insert_with(|| StoredVector {
                id: Uuid::new_v4(),
                vector: vector.to_vec(),
            });
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let vectors = self.vectors.read().unwrap();
        let filter = match self.filter_support {
            FilterSupport::Native => filter,
            FilterSupport::PostFilterOnly => None,
        };

        let mut results: Vec<VectorMatch> = vectors
            .iter()
            .filter(|((item_id, kind), _)| filter.map_or(true, |f| f.matches(*item_id, *kind)))
            .map(|((item_id, kind), stored)| VectorMatch {
                document_id: stored.id.to_string(),
                item_id: *item_id,
                section_kind: *kind,
                similarity: cosine_similarity(query, &stored.vector),
            })
            .collect();

        // HashMap iteration order is arbitrary; fix it before ranking
        results.sort_by(|a, b| {
            (a.item_id, a.section_kind).cmp(&(b.item_id, b.section_kind))
        });
        sort_by_similarity(&mut results);
        results.truncate(limit);

        Ok(results)
    }

    async fn delete_by_item(&self, item_id: ItemId) -> Result<usize> {
        let mut vectors = self.vectors.write().unwrap();
        let initial_len = vectors.len();
        vectors.retain(|(id, _), _| *id != item_id);
        Ok(initial_len - vectors.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.vectors.read().unwrap().len())
    }

    fn filter_support(&self) -> FilterSupport {
        self.filter_support
    }
}
