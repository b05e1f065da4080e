//! Error types for Marquee.

use thiserror::Error;

/// Library-level error type for Marquee operations.
#[derive(Error, Debug)]
pub enum MarqueeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Content store error: {0}")]
    ContentStore(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Conversation store error: {0}")]
    Conversation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),
}

impl MarqueeError {
    /// Whether this error came from the retrieval side of the pipeline
    /// (vector store, content store).
    pub fn is_retrieval(&self) -> bool {
        matches!(
            self,
            MarqueeError::Retrieval(_) | MarqueeError::ContentStore(_) | MarqueeError::Database(_)
        )
    }
}

/// Result type alias for Marquee operations.
pub type Result<T> = std::result::Result<T, MarqueeError>;
