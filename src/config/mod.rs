//! Configuration module for Marquee.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{ChatPrompts, FallbackPrompts, Prompts};
pub use settings::{
    ContentStoreSettings, EmbeddingSettings, GeneralSettings, LlmSettings, ModeSettings,
    PromptSettings, RankingSettings, RetrievalSettings, Settings, VectorStoreSettings,
};
