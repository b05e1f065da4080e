//! User message validation and sanitization.

use crate::error::{MarqueeError, Result};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// Longest accepted message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

const INJECTION_PATTERNS: &[&str] = &[
    r"ignore\s+(all\s+)?(previous|above|prior)\s+(instructions?|prompts?)",
    r"disregard\s+(all\s+)?(previous|above|prior)",
    r"forget\s+(everything|all)",
    r"you\s+are\s+now\s+in\s+",
    r"new\s+instructions?:",
    r"system\s*:\s*",
    r"<\s*system\s*>",
    r"\[system\]",
    r"assistant\s*:\s*",
    r"</?(system|assistant|user)>",
    r"jailbreak",
    r"bypass\s+(restrictions?|filters?|rules?)",
];

fn injection_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        INJECTION_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
            .collect()
    })
}

fn spaces() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[ \t]+").expect("valid regex"))
}

fn blank_lines() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n{3,}").expect("valid regex"))
}

/// Reject empty, whitespace-only and over-long messages.
pub fn validate_message(message: &str) -> Result<()> {
    if message.is_empty() {
        return Err(MarqueeError::InvalidInput("Message cannot be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(MarqueeError::InvalidInput(format!(
            "Message exceeds maximum length of {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    if message.trim().is_empty() {
        return Err(MarqueeError::InvalidInput(
            "Message cannot be empty or whitespace only".to_string(),
        ));
    }
    Ok(())
}

/// Remove null bytes, collapse runs of spaces and tabs, collapse three or
/// more newlines to two, and trim.
pub fn sanitize_message(message: &str) -> String {
    let without_nulls = message.replace('\0', "");
    let collapsed = spaces().replace_all(&without_nulls, " ");
    blank_lines()
        .replace_all(&collapsed, "\n\n")
        .trim()
        .to_string()
}

/// The first prompt-injection pattern found in the message, if any. A
/// heuristic with false positives; callers log, they do not block.
pub fn check_prompt_injection(message: &str) -> Option<String> {
    injection_patterns()
        .iter()
        .find_map(|p| p.find(message).map(|m| m.as_str().to_string()))
}

/// Validate, sanitize and screen a raw user message.
pub fn prepare_message(raw: &str) -> Result<String> {
    validate_message(raw)?;
    let message = sanitize_message(raw);
    if message.is_empty() {
        return Err(MarqueeError::InvalidInput("Message cannot be empty".to_string()));
    }
    if let Some(pattern) = check_prompt_injection(&message) {
        warn!(pattern = %pattern, "Possible prompt injection in user message");
    }
    Ok(message)
}
