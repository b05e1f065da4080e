//! Configuration settings for Marquee.

use crate::error::{MarqueeError, Result};
use crate::intent::KeywordTable;
use crate::llm::GenerationOptions;
use crate::memory::MemoryConfig;
use crate::ranking::WeightMatrix;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub embedding: EmbeddingSettings,
    pub vector_store: VectorStoreSettings,
    pub content_store: ContentStoreSettings,
    pub retrieval: RetrievalSettings,
    /// Ordered keyword rules for intent classification.
    pub classifier: KeywordTable,
    /// Intent × section-kind multipliers.
    pub weights: WeightMatrix,
    pub ranking: RankingSettings,
    pub memory: MemoryConfig,
    pub llm: LlmSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.marquee".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (openai, hashing).
    pub provider: String,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Scale embeddings to unit length.
    pub normalize: bool,
    /// Query embeddings kept in the cache.
    pub cache_capacity: usize,
    /// Leading characters of the input used as the cache key.
    pub cache_prefix_chars: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 384,
            normalize: true,
            cache_capacity: 100,
            cache_prefix_chars: 500,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Vector store provider (sqlite, memory).
    pub provider: String,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: "~/.marquee/marquee.db".to_string(),
        }
    }
}

/// Content store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentStoreSettings {
    /// Content store provider (sqlite, memory).
    pub provider: String,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
}

impl Default for ContentStoreSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: "~/.marquee/marquee.db".to_string(),
        }
    }
}

/// Retrieval limits for one chat mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeSettings {
    /// Candidates kept after diversity selection.
    pub k: usize,
    /// Sources placed in the prompt.
    pub prompt_sources: usize,
    /// Sentences kept in the final answer.
    pub max_sentences: usize,
    /// Characters per section for plot, characters and themes.
    pub budget_high: usize,
    /// Characters per section for visual/technical, production and cast.
    pub budget_medium: usize,
    /// Characters per section for reception and legacy.
    pub budget_low: usize,
}

impl ModeSettings {
    /// Catalog-wide chat.
    pub fn global() -> Self {
        Self {
            k: 10,
            prompt_sources: 8,
            max_sentences: 8,
            budget_high: 800,
            budget_medium: 600,
            budget_low: 400,
        }
    }

    /// Chat scoped to one item.
    pub fn item() -> Self {
        Self {
            k: 3,
            prompt_sources: 3,
            max_sentences: 6,
            budget_high: 1200,
            budget_medium: 900,
            budget_low: 600,
        }
    }
}

impl Default for ModeSettings {
    fn default() -> Self {
        Self::global()
    }
}

/// Candidate retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Drop candidates below this cosine similarity.
    pub min_similarity: f32,
    /// Request `k * overretrieve_factor` candidates from the vector store.
    pub overretrieve_factor: usize,
    /// Window doublings allowed for stores that cannot filter natively.
    pub max_filter_expansions: usize,
    pub global: ModeSettings,
    pub item: ModeSettings,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            min_similarity: 0.30,
            overretrieve_factor: 2,
            max_filter_expansions: 4,
            global: ModeSettings::global(),
            item: ModeSettings::item(),
        }
    }
}

/// Ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingSettings {
    /// Maximum sections per item in one answer.
    pub max_per_item: usize,
    /// Enable the pairwise reranking stage.
    pub rerank: bool,
    /// Share of the final score taken by the reranker.
    pub rerank_weight: f32,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            max_per_item: 2,
            rerank: false,
            rerank_weight: 0.4,
        }
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// OpenAI-compatible base URL. Unset uses api.openai.com.
    pub base_url: Option<String>,
    /// Environment variable holding the API key. Unset uses `OPENAI_API_KEY`.
    pub api_key_env: Option<String>,
    /// Model for answer generation.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    pub generation: GenerationOptions,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: crate::openai::DEFAULT_TIMEOUT_SECS,
            generation: GenerationOptions::default(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&content)?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimensions == 0 {
            return Err(MarqueeError::Config(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        if self.retrieval.global.k == 0 || self.retrieval.item.k == 0 {
            return Err(MarqueeError::Config("retrieval k must be at least 1".to_string()));
        }
        if self.ranking.max_per_item == 0 {
            return Err(MarqueeError::Config(
                "ranking.max_per_item must be at least 1".to_string(),
            ));
        }
        self.weights.validate()
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MarqueeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("marquee")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded vector store database path.
    pub fn vector_db_path(&self) -> PathBuf {
        Self::expand_path(&self.vector_store.sqlite_path)
    }

    /// Get the expanded content store database path.
    pub fn content_db_path(&self) -> PathBuf {
        Self::expand_path(&self.content_store.sqlite_path)
    }

    /// The API key for the language model, read from the configured
    /// environment variable.
    pub fn llm_api_key(&self) -> Option<String> {
        self.llm
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }
}
