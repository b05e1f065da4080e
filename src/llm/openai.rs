//! OpenAI-compatible chat completions (OpenAI, OpenRouter, local gateways).

use super::{ChatMessage, GenerationOptions, LanguageModel, MessageRole, TokenStream};
use crate::error::{MarqueeError, Result};
use crate::openai::{create_client_for, Endpoint};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Chat model behind an OpenAI-compatible endpoint.
pub struct OpenAIChatModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIChatModel {
    pub fn new(endpoint: &Endpoint, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client_for(endpoint, timeout)?,
            model: model.to_string(),
        })
    }

    fn convert_messages(messages: &[ChatMessage]) -> Result<Vec<ChatCompletionRequestMessage>> {
        messages
            .iter()
            .map(|m| {
                let message: ChatCompletionRequestMessage = match m.role {
                    MessageRole::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| MarqueeError::Generation(e.to_string()))?
                        .into(),
                    MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| MarqueeError::Generation(e.to_string()))?
                        .into(),
                    MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| MarqueeError::Generation(e.to_string()))?
                        .into(),
                };
                Ok(message)
            })
            .collect()
    }

    #[allow(deprecated)]
    fn build_request(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<CreateChatCompletionRequest> {
        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::convert_messages(messages)?)
            .max_tokens(options.max_tokens)
            .temperature(options.temperature)
            .top_p(options.top_p)
            .presence_penalty(options.presence_penalty)
            .frequency_penalty(options.frequency_penalty)
            .build()
            .map_err(|e| MarqueeError::Generation(e.to_string()))
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    #[instrument(skip(self, messages, options), fields(model = %self.model))]
    async fn complete(&self, messages: &[ChatMessage], options: &GenerationOptions) -> Result<String> {
        let request = self.build_request(messages, options)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| MarqueeError::OpenAI(format!("Failed to generate response: {}", e)))?;

        let answer = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| MarqueeError::Generation("Empty response from LLM".to_string()))?;

        debug!(chars = answer.len(), "Completion received");
        Ok(answer)
    }

    #[instrument(skip(self, messages, options), fields(model = %self.model))]
    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<TokenStream> {
        let request = self.build_request(messages, options)?;

        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| MarqueeError::OpenAI(format!("Failed to start stream: {}", e)))?;

        let chunks = stream.filter_map(|item| async move {
            match item {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .filter(|content| !content.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(MarqueeError::OpenAI(format!("Stream error: {}", e)))),
            }
        });

        Ok(chunks.boxed())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
