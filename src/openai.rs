//! OpenAI-compatible client configuration with sensible defaults.

use crate::error::{MarqueeError, Result};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default timeout for API requests (2 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Connection details for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    /// Base URL, e.g. `https://openrouter.ai/api/v1`. `None` uses api.openai.com.
    pub base_url: Option<String>,
    /// API key. `None` falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
}

/// Create a client for the default OpenAI endpoint.
pub fn create_client() -> Result<Client<OpenAIConfig>> {
    create_client_for(&Endpoint::default(), Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create a client for a specific endpoint with a custom timeout.
pub fn create_client_for(endpoint: &Endpoint, timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| MarqueeError::Config(format!("Failed to create HTTP client: {}", e)))?;

    let mut config = OpenAIConfig::default();
    if let Some(base) = endpoint.base_url.as_deref().filter(|b| !b.is_empty()) {
        config = config.with_api_base(base);
    }
    if let Some(key) = endpoint.api_key.as_deref().filter(|k| !k.is_empty()) {
        config = config.with_api_key(key);
    }

    Ok(Client::with_config(config).with_http_client(http_client))
}
