//! Pre-flight checks before commands that call remote models.
//!
//! Catches a missing API key before an index run or a chat session fails
//! halfway through.

use crate::config::Settings;
use crate::error::{MarqueeError, Result};

/// What a command is about to do.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Embeds every section.
    Index,
    /// Embeds the query only.
    Search,
    /// Embeds the query and calls the chat model.
    Answer,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    if settings.embedding.provider == "openai" {
        check_env_key("OPENAI_API_KEY", "embeddings")?;
    }

    if let Operation::Answer = operation {
        match settings.llm.api_key_env.as_deref() {
            Some(var) => check_env_key(var, "the chat model")?,
            None => check_env_key("OPENAI_API_KEY", "the chat model")?,
        }
    }
    Ok(())
}

fn check_env_key(var: &str, purpose: &str) -> Result<()> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(()),
        Ok(_) => Err(MarqueeError::Config(format!(
            "{} is empty. It is needed for {}.",
            var, purpose
        ))),
        Err(_) => Err(MarqueeError::Config(format!(
            "{} not set. It is needed for {}. Set it with: export {}='...'",
            var, purpose, var
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_embeddings_need_no_key_for_search() {
        let mut settings = Settings::default();
        settings.embedding.provider = "hashing".to_string();
        assert!(check(Operation::Search, &settings).is_ok());
        assert!(check(Operation::Index, &settings).is_ok());
    }

    #[test]
    fn test_answer_checks_configured_key_variable() {
        let mut settings = Settings::default();
        settings.embedding.provider = "hashing".to_string();
        settings.llm.api_key_env = Some("MARQUEE_TEST_KEY_THAT_IS_NOT_SET".to_string());

        let err = check(Operation::Answer, &settings).unwrap_err();
        assert!(err.to_string().contains("MARQUEE_TEST_KEY_THAT_IS_NOT_SET"));
    }
}
