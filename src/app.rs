//! Wiring from [`Settings`] to the stores, the embedder and the answer
//! pipeline, plus the catalog indexing job.

use crate::catalog::CatalogEntry;
use crate::config::{Prompts, Settings};
use crate::content_store::{ContentStore, MemoryContentStore, SqliteContentStore};
use crate::embedding::{model_handle_from_settings, Embedder, EmbeddingCache, EmbeddingGenerator};
use crate::error::{MarqueeError, Result};
use crate::intent::QueryClassifier;
use crate::llm::{LanguageModel, OpenAIChatModel};
use crate::memory::{ConversationMemory, ConversationStore, MemoryConversationStore};
use crate::openai::Endpoint;
use crate::rag::{ResponseOrchestrator, RetrievalPipeline};
use crate::ranking::{DiversitySelector, RelevanceWeighter, RerankStage, TermOverlapReranker};
use crate::vector_store::{
    CandidateSearch, CandidateSearchConfig, MemoryVectorStore, SqliteVectorStore, VectorStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// The assembled application.
pub struct App {
    settings: Settings,
    prompts: Prompts,
    embedder: Arc<EmbeddingGenerator>,
    vector_store: Arc<dyn VectorStore>,
    content_store: Arc<dyn ContentStore>,
    conversations: Arc<dyn ConversationStore>,
}

impl App {
    /// Build everything the settings describe. The embedding model is not
    /// loaded until first use.
    pub fn new(settings: Settings) -> Result<Self> {
        let vector_store: Arc<dyn VectorStore> = match settings.vector_store.provider.as_str() {
            "sqlite" => Arc::new(SqliteVectorStore::new(&settings.vector_db_path())?),
            "memory" => Arc::new(MemoryVectorStore::new()),
            other => {
                return Err(MarqueeError::Config(format!(
                    "Unknown vector store provider: {}",
                    other
                )))
            }
        };

        let content_store: Arc<dyn ContentStore> = match settings.content_store.provider.as_str() {
            "sqlite" => Arc::new(SqliteContentStore::new(&settings.content_db_path())?),
            "memory" => Arc::new(MemoryContentStore::new()),
            other => {
                return Err(MarqueeError::Config(format!(
                    "Unknown content store provider: {}",
                    other
                )))
            }
        };

        Self::with_stores(settings, vector_store, content_store)
    }

    /// Build around existing stores.
    pub fn with_stores(
        settings: Settings,
        vector_store: Arc<dyn VectorStore>,
        content_store: Arc<dyn ContentStore>,
    ) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let model = Arc::new(model_handle_from_settings(&settings.embedding)?);
        let cache = Arc::new(EmbeddingCache::new(
            settings.embedding.cache_capacity,
            settings.embedding.cache_prefix_chars,
        ));
        let embedder = Arc::new(
            EmbeddingGenerator::new(model, cache, settings.embedding.dimensions as usize)
                .with_normalize(settings.embedding.normalize),
        );

        Ok(Self {
            settings,
            prompts,
            embedder,
            vector_store,
            content_store,
            conversations: Arc::new(MemoryConversationStore::new()),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn embedder(&self) -> Arc<EmbeddingGenerator> {
        self.embedder.clone()
    }

    pub fn vector_store(&self) -> Arc<dyn VectorStore> {
        self.vector_store.clone()
    }

    pub fn content_store(&self) -> Arc<dyn ContentStore> {
        self.content_store.clone()
    }

    pub fn conversations(&self) -> Arc<dyn ConversationStore> {
        self.conversations.clone()
    }

    /// The retrieval pipeline with the configured ranking stages.
    pub fn pipeline(&self) -> RetrievalPipeline {
        let retrieval = &self.settings.retrieval;
        let search = CandidateSearch::new(
            self.vector_store.clone(),
            CandidateSearchConfig {
                overretrieve_factor: retrieval.overretrieve_factor,
                min_similarity: retrieval.min_similarity,
                max_filter_expansions: retrieval.max_filter_expansions,
            },
        );

        let mut pipeline = RetrievalPipeline::new(self.embedder.clone(), search, self.content_store.clone())
            .with_weighter(RelevanceWeighter::new(self.settings.weights.clone()))
            .with_diversity(DiversitySelector::new(self.settings.ranking.max_per_item));

        if self.settings.ranking.rerank {
            pipeline = pipeline.with_rerank(
                RerankStage::new(Arc::new(TermOverlapReranker))
                    .with_rerank_weight(self.settings.ranking.rerank_weight),
            );
        }
        pipeline
    }

    pub fn classifier(&self) -> QueryClassifier {
        QueryClassifier::new(self.settings.classifier.clone())
    }

    /// The configured chat model. `model` overrides the configured name.
    pub fn language_model(&self, model: Option<&str>) -> Result<Arc<dyn LanguageModel>> {
        let llm = &self.settings.llm;
        let endpoint = Endpoint {
            base_url: llm.base_url.clone(),
            api_key: self.settings.llm_api_key(),
        };
        if endpoint.api_key.is_none() && std::env::var("OPENAI_API_KEY").is_err() {
            warn!("No API key found for the language model");
        }

        let model = OpenAIChatModel::new(
            &endpoint,
            model.unwrap_or(&llm.model),
            Duration::from_secs(llm.timeout_secs),
        )?;
        Ok(Arc::new(model))
    }

    /// The answer pipeline around the given model.
    pub fn orchestrator_with(&self, llm: Arc<dyn LanguageModel>) -> ResponseOrchestrator {
        ResponseOrchestrator::new(Arc::new(self.pipeline()), self.conversations.clone(), llm)
            .with_classifier(self.classifier())
            .with_memory(ConversationMemory::new(self.settings.memory.clone()))
            .with_prompts(self.prompts.clone())
            .with_generation_options(self.settings.llm.generation.clone())
            .with_modes(
                self.settings.retrieval.global.clone(),
                self.settings.retrieval.item.clone(),
            )
    }

    /// The answer pipeline around the configured model.
    pub fn orchestrator(&self, model: Option<&str>) -> Result<ResponseOrchestrator> {
        Ok(self.orchestrator_with(self.language_model(model)?))
    }

    /// Store every section of the catalog and embed it. Sections are
    /// replaced per (item, kind); empty sections are skipped.
    #[instrument(skip(self, entries, on_item), fields(items = entries.len()))]
    pub async fn index_catalog<F>(&self, entries: &[CatalogEntry], mut on_item: F) -> Result<IndexReport>
    where
        F: FnMut(&CatalogEntry),
    {
        let mut report = IndexReport::default();

        for entry in entries {
            let (sections, empty): (Vec<_>, Vec<_>) =
                entry.sections().into_iter().partition(|s| !s.is_empty());
            report.skipped += empty.len();

            if !sections.is_empty() {
                let texts: Vec<String> = sections.iter().map(|s| s.content.clone()).collect();
                let vectors = self.embedder.embed_batch(&texts).await?;
                if vectors.len() != sections.len() {
                    return Err(MarqueeError::Embedding(format!(
                        "Expected {} embeddings, got {}",
                        sections.len(),
                        vectors.len()
                    )));
                }

                for (section, vector) in sections.iter().zip(vectors) {
                    self.content_store.put_section(section).await?;
                    self.vector_store.upsert(section.item_id, section.kind, &vector).await?;
                }
                report.sections += sections.len();
            }

            report.items += 1;
            debug!(item_id = entry.id, title = %entry.title, "Indexed item");
            on_item(entry);
        }

        info!(
            items = report.items,
            sections = report.sections,
            skipped = report.skipped,
            "Catalog indexed"
        );
        Ok(report)
    }
}

/// Result of indexing a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub items: usize,
    /// Sections stored and embedded.
    pub sections: usize,
    /// Empty sections that were not stored.
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{parse_catalog, SectionKind};
    use crate::intent::QueryIntent;
    use crate::rag::RetrievalRequest;

    fn test_settings() -> Settings {
        let mut settings = Settings::default();
        settings.embedding.provider = "hashing".to_string();
        settings.embedding.dimensions = 128;
        settings.vector_store.provider = "memory".to_string();
        settings.content_store.provider = "memory".to_string();
        settings
    }

    const CATALOG: &str = r#"[
        {"id": 1, "title": "Inception", "year": 2010, "sections": {
            "themes": "Dreams, grief and guilt inside a layered heist.",
            "reception": "   "
        }},
        {"id": 2, "title": "Heat", "year": 1995, "sections": {
            "themes": "Obsession and professionalism on both sides of the law.",
            "plot_structure": "A crew of thieves and the detective who hunts them."
        }}
    ]"#;

    #[tokio::test]
    async fn test_index_then_retrieve() {
        let app = App::new(test_settings()).unwrap();
        let entries = parse_catalog(CATALOG).unwrap();

        let mut seen = Vec::new();
        let report = app
            .index_catalog(&entries, |entry| seen.push(entry.id))
            .await
            .unwrap();

        assert_eq!(
            report,
            IndexReport {
                items: 2,
                sections: 3,
                skipped: 1
            }
        );
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(app.vector_store().count().await.unwrap(), 3);
        assert_eq!(app.content_store().count_sections().await.unwrap(), 3);

        let results = app
            .pipeline()
            .retrieve(&RetrievalRequest {
                query: "Obsession and professionalism on both sides of the law.",
                digest: None,
                intent: QueryIntent::GenreTheme,
                filter: None,
                k: 3,
            })
            .await
            .unwrap();
        assert_eq!(results[0].item_title, "Heat");
        assert_eq!(results[0].section_kind, SectionKind::Themes);
    }

    #[tokio::test]
    async fn test_reindex_replaces_sections() {
        let app = App::new(test_settings()).unwrap();
        let entries = parse_catalog(CATALOG).unwrap();
        app.index_catalog(&entries, |_| {}).await.unwrap();
        app.index_catalog(&entries, |_| {}).await.unwrap();

        assert_eq!(app.vector_store().count().await.unwrap(), 3);
        assert_eq!(app.content_store().count_sections().await.unwrap(), 3);
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let mut settings = test_settings();
        settings.vector_store.provider = "pinecone".to_string();
        assert!(matches!(App::new(settings), Err(MarqueeError::Config(_))));
    }
}
