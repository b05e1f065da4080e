//! Retrieval: embed the query, gather candidates, hydrate and rank them.

use crate::catalog::{ItemId, Section};
use crate::content_store::ContentStore;
use crate::embedding::Embedder;
use crate::error::{MarqueeError, Result};
use crate::intent::QueryIntent;
use crate::ranking::{DiversitySelector, RankedSection, RelevanceWeighter, RerankStage};
use crate::vector_store::{CandidateSearch, SearchFilter, VectorMatch};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Build the text that is embedded for retrieval. The question leads so it
/// always falls inside the embedding cache key; the digest follows.
pub fn enhanced_query(query: &str, digest: Option<&str>) -> String {
    match digest {
        Some(digest) if !digest.is_empty() => {
            format!("{}\n\nConversation context:\n{}", query, digest)
        }
        _ => query.to_string(),
    }
}

/// One retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalRequest<'a> {
    pub query: &'a str,
    pub digest: Option<&'a str>,
    pub intent: QueryIntent,
    pub filter: Option<SearchFilter>,
    /// Number of ranked sections wanted.
    pub k: usize,
}

/// Embeds queries and turns vector hits into ranked sections.
pub struct RetrievalPipeline {
    embedder: Arc<dyn Embedder>,
    search: CandidateSearch,
    content: Arc<dyn ContentStore>,
    weighter: RelevanceWeighter,
    rerank: Option<RerankStage>,
    diversity: DiversitySelector,
}

impl RetrievalPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        search: CandidateSearch,
        content: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            embedder,
            search,
            content,
            weighter: RelevanceWeighter::default(),
            rerank: None,
            diversity: DiversitySelector::default(),
        }
    }

    pub fn with_weighter(mut self, weighter: RelevanceWeighter) -> Self {
        self.weighter = weighter;
        self
    }

    /// Enable the optional rerank stage.
    pub fn with_rerank(mut self, rerank: RerankStage) -> Self {
        self.rerank = Some(rerank);
        self
    }

    pub fn with_diversity(mut self, diversity: DiversitySelector) -> Self {
        self.diversity = diversity;
        self
    }

    pub fn content_store(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Resolve item titles to ids, keeping the order of `titles`. Unknown
    /// titles are dropped.
    pub async fn resolve_titles(&self, titles: &[String]) -> Result<Vec<ItemId>> {
        if titles.is_empty() {
            return Ok(Vec::new());
        }
        let found = self.content.find_items_by_titles(titles).await?;
        let mut ids = Vec::with_capacity(found.len());
        for title in titles {
            if let Some(id) = found.get(title) {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }
        Ok(ids)
    }

    /// Run retrieval and return at most `request.k` ranked sections.
    #[instrument(skip(self, request), fields(intent = %request.intent, k = request.k))]
    pub async fn retrieve(&self, request: &RetrievalRequest<'_>) -> Result<Vec<RankedSection>> {
        let text = enhanced_query(request.query, request.digest);
        let vector = self.embedder.embed(&text).await.map_err(|e| match e {
            MarqueeError::Embedding(_) => e,
            other => MarqueeError::Embedding(other.to_string()),
        })?;

        // Hydration and the diversity cap both discard candidates, so the
        // window doubles until k survive or the store runs dry.
        let mut window = request.k;
        let mut expansions = 0;
        loop {
            let matches = self
                .search
                .search(&vector, window, request.filter.as_ref())
                .await?;
            let exhausted = matches.len() < self.search.candidate_count(window);
            debug!("Retrieved {} candidate matches", matches.len());

            let candidates = self.hydrate(matches).await?;
            let weighted = self.weighter.weight(candidates, request.intent);
            let ranked = match &self.rerank {
                Some(stage) => stage.apply(request.query, weighted).await,
                None => weighted,
            };
            let selected = self.diversity.select(ranked, request.k);

            if selected.len() >= request.k
                || exhausted
                || expansions >= self.search.config().max_filter_expansions
            {
                return Ok(selected);
            }

            expansions += 1;
            window = window.saturating_mul(2);
            debug!(found = selected.len(), window, "Widening retrieval window");
        }
    }

    /// Fetch section text for each match, in match order. Matches whose
    /// section is missing or empty are dropped.
    async fn hydrate(&self, matches: Vec<VectorMatch>) -> Result<Vec<RankedSection>> {
        let lookups = matches
            .iter()
            .map(|hit| self.content.get_section(hit.item_id, hit.section_kind));
        let sections: Vec<Option<Section>> = try_join_all(lookups).await.map_err(|e| match e {
            MarqueeError::Retrieval(_) => e,
            other => MarqueeError::Retrieval(other.to_string()),
        })?;

        let mut hydrated = Vec::with_capacity(matches.len());
        for (hit, section) in matches.into_iter().zip(sections) {
            match section {
                Some(section) if !section.is_empty() => {
                    hydrated.push(RankedSection::from_match(hit, section));
                }
                Some(_) => debug!(item_id = hit.item_id, kind = %hit.section_kind, "Skipping empty section"),
                None => debug!(item_id = hit.item_id, kind = %hit.section_kind, "Skipping section without content"),
            }
        }
        Ok(hydrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SectionKind;
    use crate::content_store::MemoryContentStore;
    use crate::embedding::{EmbeddingCache, EmbeddingGenerator, HashingEmbedder, ModelHandle};
    use crate::ranking::TermOverlapReranker;
    use crate::vector_store::{CandidateSearchConfig, MemoryVectorStore, VectorStore};
    use crate::vector_store::FilterSupport;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every requested limit and delegates to an inner store.
    struct RecordingStore {
        inner: Arc<MemoryVectorStore>,
        limits: Mutex<Vec<usize>>,
    }

    impl RecordingStore {
        fn new(inner: Arc<MemoryVectorStore>) -> Self {
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

    /// Returns the same vector for every text.
    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }

        fn dimensions(&self) -> usize {
            self.0.len()
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(MarqueeError::OpenAI("connection refused".to_string()))
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(MarqueeError::OpenAI("connection refused".to_string()))
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    fn section(item_id: ItemId, title: &str, kind: SectionKind, content: &str) -> Section {
        Section::new(item_id, kind, content, title, Some(2000))
    }

    async fn fixture() -> (Arc<MemoryVectorStore>, Arc<MemoryContentStore>) {
        let vectors = Arc::new(MemoryVectorStore::new());
        let content = Arc::new(MemoryContentStore::with_sections(vec![
            section(1, "Heat", SectionKind::Themes, "Obsession and professionalism."),
            section(1, "Heat", SectionKind::Reception, "Widely acclaimed."),
            section(2, "Ronin", SectionKind::Themes, "Loyalty among mercenaries."),
            section(3, "Collateral", SectionKind::PlotStructure, "One night in Los Angeles."),
            section(4, "Thief", SectionKind::Themes, "   "),
        ]));

        vectors.upsert(1, SectionKind::Themes, &[1.0, 0.0, 0.0, 0.0]).await.unwrap();
        vectors.upsert(1, SectionKind::Reception, &[0.95, 0.05, 0.0, 0.0]).await.unwrap();
        vectors.upsert(2, SectionKind::Themes, &[0.9, 0.1, 0.0, 0.0]).await.unwrap();
        vectors.upsert(3, SectionKind::PlotStructure, &[0.8, 0.2, 0.0, 0.0]).await.unwrap();
        // Vector without section text, and one with blank text
        vectors.upsert(5, SectionKind::Legacy, &[0.99, 0.0, 0.0, 0.0]).await.unwrap();
        vectors.upsert(4, SectionKind::Themes, &[0.98, 0.0, 0.0, 0.0]).await.unwrap();
        // Unrelated
        vectors.upsert(6, SectionKind::Themes, &[0.0, 0.0, 1.0, 0.0]).await.unwrap();

        (vectors, content)
    }

    fn pipeline(vectors: Arc<MemoryVectorStore>, content: Arc<MemoryContentStore>) -> RetrievalPipeline {
        RetrievalPipeline::new(
            Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0, 0.0])),
            CandidateSearch::new(vectors, CandidateSearchConfig::default()),
            content,
        )
    }

    fn request(query: &str, k: usize) -> RetrievalRequest<'_> {
        RetrievalRequest {
            query,
            digest: None,
            intent: QueryIntent::General,
            filter: None,
            k,
        }
    }

    #[test]
    fn test_enhanced_query() {
        assert_eq!(enhanced_query("Why?", None), "Why?");
        assert_eq!(enhanced_query("Why?", Some("")), "Why?");
        assert_eq!(
            enhanced_query("Why?", Some("USER: Tell me about Heat")),
            "Why?\n\nConversation context:\nUSER: Tell me about Heat"
        );
    }

    #[tokio::test]
    async fn test_retrieve_skips_missing_and_empty_sections() {
        let (vectors, content) = fixture().await;
        let results = pipeline(vectors, content).retrieve(&request("crime", 10)).await.unwrap();

        let items: Vec<ItemId> = results.iter().map(|r| r.item_id).collect();
        assert!(!items.contains(&4));
        assert!(!items.contains(&5));
        // Below the similarity threshold
        assert!(!items.contains(&6));
        // Plot sections carry the heaviest general weight
        assert_eq!(results[0].item_title, "Collateral");
        assert!(results.iter().all(|r| !r.content.trim().is_empty()));
    }

    #[tokio::test]
    async fn test_retrieve_respects_k_and_diversity() {
        let (vectors, content) = fixture().await;
        let pipeline = pipeline(vectors, content).with_diversity(DiversitySelector::new(1));

        let results = pipeline.retrieve(&request("crime", 2)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_ne!(results[0].item_id, results[1].item_id);
    }

    #[tokio::test]
    async fn test_retrieve_widens_when_hydration_drops_candidates() {
        let (vectors, content) = fixture().await;
        let store = Arc::new(RecordingStore::new(vectors));
        let pipeline = RetrievalPipeline::new(
            Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0, 0.0])),
            CandidateSearch::new(store.clone(), CandidateSearchConfig::default()),
            content,
        )
        .with_diversity(DiversitySelector::new(1));

        // Items 4 and 5 tie with item 1 at the top but have no usable text
        let results = pipeline.retrieve(&request("crime", 2)).await.unwrap();
        let items: Vec<ItemId> = results.iter().map(|r| r.item_id).collect();
        assert_eq!(items, vec![1, 2]);
        assert_eq!(*store.limits.lock().unwrap(), vec![4, 8]);

        // A window the store cannot fill ends the search
        store.limits.lock().unwrap().clear();
        let results = pipeline.retrieve(&request("crime", 4)).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(*store.limits.lock().unwrap(), vec![8]);
    }

    #[tokio::test]
    async fn test_cached_query_embedding_depends_on_question() {
        let hashing = Arc::new(HashingEmbedder::new(64));
        let generator = EmbeddingGenerator::new(
            Arc::new(ModelHandle::ready(hashing.clone())),
            Arc::new(EmbeddingCache::default()),
            64,
        )
        .with_normalize(false);

        // A digest that alone fills the cache key prefix
        let digest = "USER: Tell me about Heat and its obsessive detectives. ".repeat(10);
        let digest: String = digest.chars().take(500).collect();

        let first = enhanced_query("Who directed it?", Some(&digest));
        let second = enhanced_query("What is the ending about?", Some(&digest));
        let v1 = generator.embed(&first).await.unwrap();
        let v2 = generator.embed(&second).await.unwrap();

        assert_ne!(v1, v2);
        assert_eq!(v2, hashing.embed(&second).await.unwrap());
        assert_eq!(generator.cache().stats(), (0, 2));
    }

    #[tokio::test]
    async fn test_retrieve_with_item_filter() {
        let (vectors, content) = fixture().await;
        let mut req = request("crime", 10);
        req.filter = Some(SearchFilter::items(vec![2, 3]));

        let results = pipeline(vectors, content).retrieve(&req).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.item_id == 2 || r.item_id == 3));
    }

    #[tokio::test]
    async fn test_retrieve_with_rerank_keeps_k() {
        let (vectors, content) = fixture().await;
        let pipeline = pipeline(vectors, content)
            .with_rerank(RerankStage::new(Arc::new(TermOverlapReranker)));

        let results = pipeline.retrieve(&request("loyalty mercenaries", 3)).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].item_title, "Ronin");
    }

    #[tokio::test]
    async fn test_embedding_failure_is_reported_as_embedding_error() {
        let (vectors, content) = fixture().await;
        let pipeline = RetrievalPipeline::new(
            Arc::new(BrokenEmbedder),
            CandidateSearch::new(vectors, CandidateSearchConfig::default()),
            content,
        );

        let err = pipeline.retrieve(&request("crime", 3)).await.unwrap_err();
        assert!(matches!(err, MarqueeError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_resolve_titles_in_order() {
        let (vectors, content) = fixture().await;
        let pipeline = pipeline(vectors, content);

        let ids = pipeline
            .resolve_titles(&["ronin".to_string(), "Nope".to_string(), "Heat".to_string()])
            .await
            .unwrap();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let vectors = Arc::new(MemoryVectorStore::new());
        let content = Arc::new(MemoryContentStore::new());
        let embedder = Arc::new(HashingEmbedder::new(64));
        let text = "Heat themes";
        let v = embedder.embed(text).await.unwrap();
        vectors.upsert(1, SectionKind::Themes, &v).await.unwrap();
        content
            .put_section(&section(1, "Heat", SectionKind::Themes, "Obsession."))
            .await
            .unwrap();

        let pipeline = RetrievalPipeline::new(
            embedder,
            CandidateSearch::new(vectors, CandidateSearchConfig::default()),
            content,
        );
        let first = pipeline.retrieve(&request(text, 3)).await.unwrap();
        let second = pipeline.retrieve(&request(text, 3)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }
}
