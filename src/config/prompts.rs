//! Prompt templates for Marquee.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use crate::intent::QueryIntent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub chat: ChatPrompts,
    pub fallback: FallbackPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatPrompts {
    /// Opening instructions for catalog-wide chat.
    pub opening: String,
    pub recommendation_focus: String,
    pub comparison_focus: String,
    /// Used for genre/theme and follow-up questions.
    pub thematic_focus: String,
    /// Opening instructions when the chat is about one item.
    pub item_opening: String,
    /// User message for catalog-wide chat.
    pub user: String,
    /// User message for item chat.
    pub item_user: String,
}

impl Default for ChatPrompts {
    fn default() -> Self {
        Self {
            opening: r#"You are an intelligent movie analyst assistant.

Guidelines:
- Answer using ONLY the provided context snippets
- If multiple movies are mentioned, compare or synthesize insights across them
- Be concise (max 200 words)
- Mention movie titles explicitly
- If unsure or the context is insufficient, say so and do not make things up
- When users refer to "them", "those", or "these", they mean previously discussed movies"#
                .to_string(),

            recommendation_focus: r#"
Recommendation focus:
- Suggest 2-4 specific movies from the context
- Explain WHY each recommendation fits
- Highlight key themes, genres, or unique elements"#
                .to_string(),

            comparison_focus: r#"
Comparison focus:
- Compare specific aspects from the context
- Highlight both similarities AND differences
- Be balanced and fair to all films"#
                .to_string(),

            thematic_focus: r#"
Thematic focus:
- Identify common themes across multiple films
- Mention 3-5 relevant movies from the context
- Explain how each explores the theme or genre"#
                .to_string(),

            item_opening: r#"You are a knowledgeable movie assistant discussing "{{title}}".

Critical rules:
1. Answer ONLY based on the context provided
2. If the question is not related to this movie or cannot be answered from the context, say: "I can only answer questions about {{title}} based on the movie analysis. Please ask something about the film."
3. Never use general knowledge, only the context
4. Be conversational and concise (3-5 sentences)
5. If the context doesn't fully answer the question, say what you know and that you don't have more information"#
                .to_string(),

            user: r#"User Question:
{{question}}

Relevant Context from Movie Database:
{{context}}

Please provide a concise answer (max 200 words) that:
- Mentions specific movie titles explicitly
- Synthesizes insights across multiple films if relevant
- States uncertainty if the context doesn't fully answer the question"#
                .to_string(),

            item_user: r#"Question about {{title}}:
{{question}}

Context from the movie analysis:
{{context}}

Answer based STRICTLY on this context."#
                .to_string(),
        }
    }
}

impl ChatPrompts {
    /// Opening instructions for catalog-wide chat, with the focus block for
    /// the intent appended.
    pub fn opening_for(&self, intent: QueryIntent) -> String {
        let focus = match intent {
            QueryIntent::Recommendation => Some(&self.recommendation_focus),
            QueryIntent::Comparison => Some(&self.comparison_focus),
            QueryIntent::GenreTheme | QueryIntent::FollowUp => Some(&self.thematic_focus),
            _ => None,
        };

        match focus {
            Some(focus) => format!("{}\n{}", self.opening, focus),
            None => self.opening.clone(),
        }
    }
}

/// Canned answers for the degraded paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPrompts {
    /// Nothing relevant was retrieved.
    pub no_results: String,
    /// Generation failed; `{{titles}}` lists the best candidates.
    pub suggestions: String,
    /// Embedding or retrieval failed.
    pub error: String,
}

impl Default for FallbackPrompts {
    fn default() -> Self {
        Self {
            no_results: "I couldn't find relevant information in our movie database. Please try rephrasing your question.".to_string(),
            suggestions: "Based on our database, you might be interested in: {{titles}}. Please ask a more specific question for detailed insights.".to_string(),
            error: "Sorry, I encountered an error. Please try again.".to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let chat_path = custom_path.join("chat.toml");
            if chat_path.exists() {
                let content = std::fs::read_to_string(&chat_path)?;
                prompts.chat = toml::from_str(&content)?;
            }

            let fallback_path = custom_path.join("fallback.toml");
            if fallback_path.exists() {
                let content = std::fs::read_to_string(&fallback_path)?;
                prompts.fallback = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
