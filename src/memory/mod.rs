//! Conversation memory: digests of recent turns and the rolling list of items
//! a conversation has touched.

mod store;

pub use store::{ConversationStore, MemoryConversationStore};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Who said a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_upper(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// What the pipeline reads about a conversation before answering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub history: Vec<ConversationTurn>,
    pub referenced_items: Vec<String>,
    pub opening_sent: bool,
}

impl ConversationState {
    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }
}

/// Changes proposed after a completed exchange. Applied by the caller, and
/// only when the exchange finished cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationUpdate {
    pub user_turn: String,
    pub assistant_turn: String,
    /// The full, already merged list.
    pub referenced_items: Vec<String>,
    pub opening_sent: bool,
}

/// Limits for digests and the referenced-item list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Turns included in a digest.
    pub digest_turns: usize,
    /// Characters kept per turn.
    pub turn_chars: usize,
    /// Characters kept for the whole digest (the tail).
    pub digest_chars: usize,
    /// Referenced items remembered per conversation.
    pub max_referenced_items: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            digest_turns: 5,
            turn_chars: 200,
            digest_chars: 500,
            max_referenced_items: 10,
        }
    }
}

/// Stateless helpers over conversation history.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    config: MemoryConfig,
}

impl ConversationMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// The last `last_n` turns as `ROLE: content` lines, each turn cut to
    /// `turn_chars` and the whole text cut to its last `digest_chars`.
    pub fn digest(&self, history: &[ConversationTurn], last_n: usize) -> String {
        let start = history.len().saturating_sub(last_n);
        let lines: Vec<String> = history[start..]
            .iter()
            .map(|turn| {
                let content: String = turn.content.chars().take(self.config.turn_chars).collect();
                format!("{}: {}", turn.role.as_upper(), content)
            })
            .collect();

        keep_tail(&lines.join("\n"), self.config.digest_chars)
    }

    /// Digest with the configured turn count.
    pub fn default_digest(&self, history: &[ConversationTurn]) -> String {
        self.digest(history, self.config.digest_turns)
    }

    /// Item names mentioned in the history: quoted names and "the movie X"
    /// phrases. Best-effort; unquoted bare titles are not found.
    pub fn referenced_items(&self, history: &[ConversationTurn]) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for turn in history {
            for name in extract_names(&turn.content) {
                if !found.iter().any(|f| f.eq_ignore_ascii_case(&name)) {
                    found.push(name);
                }
            }
        }
        found
    }

    /// Append `new` to `existing`, moving repeats to the end, and keep the
    /// most recent `max_referenced_items`.
    pub fn merge_referenced(&self, existing: &[String], new: &[String]) -> Vec<String> {
        let mut merged: Vec<String> = existing.to_vec();
        for name in new {
            merged.retain(|m| !m.eq_ignore_ascii_case(name));
            merged.push(name.clone());
        }
        let overflow = merged.len().saturating_sub(self.config.max_referenced_items);
        merged.drain(..overflow);
        merged
    }
}

fn keep_tail(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    text.chars().skip(total - max_chars).collect()
}

fn quoted_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"["“]([^"”\n]{2,80})["”]"#).expect("valid regex"))
}

fn the_movie_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"\b[Tt]he (?:movie|film) ([A-Z0-9][\w'’:-]*(?:\s+(?:(?:of|the|and|in|a)\s+)*[A-Z0-9][\w'’:-]*)*)",
        )
        .expect("valid regex")
    })
}

fn extract_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    for pattern in [quoted_pattern(), the_movie_pattern()] {
        for caps in pattern.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                let name = m.as_str().trim().trim_end_matches(['.', ',', '!', '?', ':']);
                if !name.is_empty() {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}
