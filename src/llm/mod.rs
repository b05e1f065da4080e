//! Language model access.
//!
//! The pipeline only sees [`LanguageModel`]: one blocking completion or one
//! stream of text chunks, each a single attempt with no retries. The stream
//! ends when the model is done; dropping it releases the underlying request.

mod openai;
pub mod postprocess;

pub use openai::OpenAIChatModel;

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Role of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One prompt message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 300,
            temperature: 0.6,
            top_p: 0.9,
            presence_penalty: 0.3,
            frequency_penalty: 0.3,
        }
    }
}

/// Incremental model output.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// A text-completion service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate the whole answer.
    async fn complete(&self, messages: &[ChatMessage], options: &GenerationOptions) -> Result<String>;

    /// Generate the answer as a stream of chunks, in model order.
    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<TokenStream>;

    /// Model identifier, for logs and metadata.
    fn model_name(&self) -> &str;
}
