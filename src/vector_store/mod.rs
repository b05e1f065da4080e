//! Vector store abstraction for Marquee.
//!
//! Provides a trait-based interface for different vector database backends,
//! plus [`CandidateSearch`], the client the retrieval pipeline talks to.

mod client;
mod memory;
mod sqlite;

pub use client::{CandidateSearch, CandidateSearchConfig};
pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::catalog::{ItemId, SectionKind};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One nearest-neighbor hit.
///
/// `similarity` is cosine similarity in [-1, 1], higher is better. Stores
/// that work in distances convert before returning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    /// Stable id of the stored vector.
    pub document_id: String,
    pub item_id: ItemId,
    pub section_kind: SectionKind,
    pub similarity: f32,
}

/// Equality/membership filter applied to a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Restrict to these items.
    pub item_ids: Option<Vec<ItemId>>,
    /// Restrict to these section kinds.
    pub section_kinds: Option<Vec<SectionKind>>,
}

impl SearchFilter {
    /// Filter on a single item.
    pub fn item(item_id: ItemId) -> Self {
        Self {
            item_ids: Some(vec![item_id]),
            section_kinds: None,
        }
    }

    /// Filter on a set of items.
    pub fn items(item_ids: Vec<ItemId>) -> Self {
        Self {
            item_ids: Some(item_ids),
            section_kinds: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_none() && self.section_kinds.is_none()
    }

    /// Whether a match passes the filter.
    pub fn matches(&self, item_id: ItemId, kind: SectionKind) -> bool {
        let item_ok = self
            .item_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&item_id));
        let kind_ok = self
            .section_kinds
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&kind));
        item_ok && kind_ok
    }
}

/// How a store handles [`SearchFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSupport {
    /// The filter is applied before the top-N cut.
    Native,
    /// The store ranks globally and ignores the filter; callers filter the
    /// top-N themselves.
    PostFilterOnly,
}

/// Trait for vector store implementations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store the vector for (item, kind), replacing any previous one.
    async fn upsert(&self, item_id: ItemId, kind: SectionKind, vector: &[f32]) -> Result<()>;

    /// Nearest neighbors by descending similarity.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorMatch>>;

    /// Delete every vector of an item.
    async fn delete_by_item(&self, item_id: ItemId) -> Result<usize>;

    /// Total number of stored vectors.
    async fn count(&self) -> Result<usize>;

    /// How this store applies filters.
    fn filter_support(&self) -> FilterSupport {
        FilterSupport::Native
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Sort matches by descending similarity. Ties keep their input order.
pub(crate) fn sort_by_similarity(matches: &mut [VectorMatch]) {
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);

        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_filter_matches() {
        let filter = SearchFilter {
            item_ids: Some(vec![1, 2]),
            section_kinds: Some(vec![SectionKind::Themes]),
        };
        assert!(filter.matches(1, SectionKind::Themes));
        assert!(!filter.matches(3, SectionKind::Themes));
        assert!(!filter.matches(1, SectionKind::Legacy));

        assert!(SearchFilter::default().is_empty());
        assert!(SearchFilter::default().matches(99, SectionKind::Reception));
    }
}
