//! Candidate generation on top of a [`VectorStore`].
//!
//! Over-retrieves relative to the final result count, because the similarity
//! threshold and the diversity cap downstream discard a large share of hits.
//! When the store cannot filter natively, the requested window is widened
//! until enough filtered matches come back.

use super::{FilterSupport, SearchFilter, VectorMatch, VectorStore};
use crate::error::{MarqueeError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Tuning for [`CandidateSearch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateSearchConfig {
    /// Request `k * overretrieve_factor` candidates.
    pub overretrieve_factor: usize,
    /// Drop candidates below this cosine similarity.
    pub min_similarity: f32,
    /// How many times the window may double for post-filter-only stores.
    pub max_filter_expansions: usize,
}

impl Default for CandidateSearchConfig {
    fn default() -> Self {
        Self {
            overretrieve_factor: 2,
            min_similarity: 0.30,
            max_filter_expansions: 4,
        }
    }
}

/// The vector store client used by the retrieval pipeline.
pub struct CandidateSearch {
    store: Arc<dyn VectorStore>,
    config: CandidateSearchConfig,
}

impl CandidateSearch {
    pub fn new(store: Arc<dyn VectorStore>, config: CandidateSearchConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn config(&self) -> &CandidateSearchConfig {
        &self.config
    }

    /// Number of raw candidates requested for a final count of `k`.
    pub fn candidate_count(&self, k: usize) -> usize {
        k.saturating_mul(self.config.overretrieve_factor.max(1))
    }

    /// Fetch up to `k * overretrieve_factor` candidates by descending
    /// similarity. An empty result is a valid outcome; store failures come
    /// back as [`MarqueeError::Retrieval`].
    #[instrument(skip(self, query, filter), fields(k = k))]
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let wanted = self.candidate_count(k);
        let filter = filter.filter(|f| !f.is_empty());
        let compensate =
            filter.is_some() && self.store.filter_support() == FilterSupport::PostFilterOnly;

        let mut limit = wanted;
        let mut expansions = 0;

        let matches = loop {
            let raw = self
                .store
                .search(query, limit, filter)
                .await
                .map_err(as_retrieval)?;
            let exhausted = raw.len() < limit;

            // Applied locally for every store; a no-op when the store already
            // filtered.
            let filtered: Vec<VectorMatch> = match filter {
                Some(f) => raw
                    .into_iter()
                    .filter(|m| f.matches(m.item_id, m.section_kind))
                    .collect(),
                None => raw,
            };

            if !compensate || filtered.len() >= wanted || exhausted {
                break filtered;
            }
            if expansions >= self.config.max_filter_expansions {
                warn!(
                    found = filtered.len(),
                    wanted,
                    limit,
                    "Post-filter window ceiling reached"
                );
                break filtered;
            }

            expansions += 1;
            limit = limit.saturating_mul(2);
            debug!(found = filtered.len(), wanted, limit, "Widening post-filter window");
        };

        let before_threshold = matches.len();
        let kept: Vec<VectorMatch> = matches
            .into_iter()
            .filter(|m| m.similarity >= self.config.min_similarity)
            .take(wanted)
            .collect();

        debug!(
            requested = wanted,
            matched = before_threshold,
            kept = kept.len(),
            "Candidate search complete"
        );

        Ok(kept)
    }
}

fn as_retrieval(e: MarqueeError) -> MarqueeError {
    match e {
        MarqueeError::Retrieval(_) => e,
        other => MarqueeError::Retrieval(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ItemId, SectionKind};
    use crate::vector_store::MemoryVectorStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every requested limit and delegates to an inner store.
    struct RecordingStore {
        inner: MemoryVectorStore,
        limits: Mutex<Vec<usize>>,
    }

    impl RecordingStore {
        fn new(inner: MemoryVectorStore) -> Self {
            Self {
                inner,
                limits: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn upsert(&self, item_id: ItemId, kind: SectionKind, vector: &[f32]) -> Result<()> {
            self.inner.upsert(item_id, kind, vector).await
        }

        async fn search(
            &self,
            query: &[f32],
            limit: usize,
            filter: Option<&SearchFilter>,
        ) -> Result<Vec<VectorMatch>> {
            self.limits.lock().unwrap().push(limit);
            self.inner.search(query, limit, filter).await
        }

        async fn delete_by_item(&self, item_id: ItemId) -> Result<usize> {
            self.inner.delete_by_item(item_id).await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }

        fn filter_support(&self) -> FilterSupport {
            self.inner.filter_support()
        }
    }

    struct UnreachableStore;

    #[async_trait]
    impl VectorStore for UnreachableStore {
        async fn upsert(&self, _: ItemId, _: SectionKind, _: &[f32]) -> Result<()> {
            Err(MarqueeError::Io(std::io::Error::other("connection refused")))
        }

        async fn search(
            &self,
            _: &[f32],
            _: usize,
            _: Option<&SearchFilter>,
        ) -> Result<Vec<VectorMatch>> {
            Err(MarqueeError::Io(std::io::Error::other("connection refused")))
        }

        async fn delete_by_item(&self, _: ItemId) -> Result<usize> {
            Ok(0)
        }

        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    /// Items 1..=n, one themes vector each, similarity to [1, 0] decreasing
    /// with the item id.
    async fn seeded(store: MemoryVectorStore, n: i64) -> MemoryVectorStore {
        for id in 1..=n {
            let angle = id as f32 * 0.02;
            store
                .upsert(id, SectionKind::Themes, &[angle.cos(), angle.sin()])
                .await
                .unwrap();
        }
        store
    }

    fn permissive() -> CandidateSearchConfig {
        CandidateSearchConfig {
            min_similarity: -1.0,
            ..CandidateSearchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_overretrieves_k_times_factor() {
        let store = Arc::new(RecordingStore::new(seeded(MemoryVectorStore::new(), 30).await));
        let search = CandidateSearch::new(
            store.clone(),
            CandidateSearchConfig {
                overretrieve_factor: 2,
                ..permissive()
            },
        );

        let results = search.search(&[1.0, 0.0], 5, None).await.unwrap();

        let limits = store.limits.lock().unwrap().clone();
        assert_eq!(limits.len(), 1);
        assert!(limits[0] >= 10);
        assert_eq!(results.len(), 10);
    }

    #[tokio::test]
    async fn test_post_filter_store_widens_window() {
        let store = Arc::new(RecordingStore::new(
            seeded(MemoryVectorStore::post_filter_only(), 40).await,
        ));
        let search = CandidateSearch::new(store.clone(), permissive());

        // Item 30 ranks 30th globally, outside the initial window of 2.
        let results = search
            .search(&[1.0, 0.0], 1, Some(&SearchFilter::item(30)))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item_id, 30);
        let limits = store.limits.lock().unwrap().clone();
        assert_eq!(limits, vec![2, 4, 8, 16, 32]);
    }

    #[tokio::test]
    async fn test_post_filter_window_stops_at_ceiling() {
        let store = Arc::new(RecordingStore::new(
            seeded(MemoryVectorStore::post_filter_only(), 100).await,
        ));
        let search = CandidateSearch::new(
            store.clone(),
            CandidateSearchConfig {
                max_filter_expansions: 2,
                ..permissive()
            },
        );

        let results = search
            .search(&[1.0, 0.0], 1, Some(&SearchFilter::item(90)))
            .await
            .unwrap();

        assert!(results.is_empty());
        assert_eq!(store.limits.lock().unwrap().clone(), vec![2, 4, 8]);
    }

    #[tokio::test]
    async fn test_native_filter_does_not_widen() {
        let store = Arc::new(RecordingStore::new(seeded(MemoryVectorStore::new(), 40).await));
        let search = CandidateSearch::new(store.clone(), permissive());

        let results = search
            .search(&[1.0, 0.0], 3, Some(&SearchFilter::item(30)))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(store.limits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_min_similarity_threshold() {
        let store = MemoryVectorStore::new();
        store.upsert(1, SectionKind::Themes, &[1.0, 0.0]).await.unwrap();
        store.upsert(2, SectionKind::Themes, &[0.0, 1.0]).await.unwrap();
        let search = CandidateSearch::new(Arc::new(store), CandidateSearchConfig::default());

        let results = search.search(&[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item_id, 1);
    }

    #[tokio::test]
    async fn test_empty_store_is_not_an_error() {
        let search = CandidateSearch::new(
            Arc::new(MemoryVectorStore::new()),
            CandidateSearchConfig::default(),
        );
        assert!(search.search(&[1.0, 0.0], 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_retrieval_failure() {
        let search = CandidateSearch::new(Arc::new(UnreachableStore), CandidateSearchConfig::default());
        let err = search.search(&[1.0, 0.0], 5, None).await.unwrap_err();
        assert!(matches!(err, MarqueeError::Retrieval(_)));
    }
}
