//! Cleanup applied to generated text before it is returned or stored.

use regex::Regex;
use std::sync::OnceLock;

fn control_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<[｜|][^>]*[｜|]>|</?s>|<</?SYS>>").expect("valid regex")
    })
}

/// Remove chat-template control tokens such as `<|eot_id|>`, `<s>` and
/// `<<SYS>>`. Whitespace is left alone, so this is safe on stream chunks.
pub fn remove_control_tokens(text: &str) -> String {
    control_token_pattern().replace_all(text, "").into_owned()
}

/// [`remove_control_tokens`], then trim.
pub fn strip_control_tokens(text: &str) -> String {
    remove_control_tokens(text).trim().to_string()
}

/// Tokens matched literally. `<|...|>` tokens are matched by shape.
const LITERAL_TOKENS: [&str; 4] = ["<s>", "</s>", "<<SYS>>", "<</SYS>>"];

/// Longest `<|...` fragment held back before it is released as text.
const MAX_HELD_BYTES: usize = 64;

/// Strips control tokens from a chunked stream. A trailing fragment that
/// could still grow into a token is held until the next chunk arrives, so
/// a token split across chunks never reaches the caller.
#[derive(Debug, Default)]
pub struct ControlTokenFilter {
    pending: String,
}

impl ControlTokenFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the text that is safe to emit now.
    pub fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let cleaned = remove_control_tokens(&self.pending);
        let split = held_fragment_start(&cleaned);
        self.pending = cleaned[split..].to_string();
        cleaned[..split].to_string()
    }

    /// Release whatever is still held. Call once the stream has ended.
    pub fn flush(&mut self) -> String {
        remove_control_tokens(&std::mem::take(&mut self.pending))
    }
}

/// Byte offset of the earliest `<` that may begin an unfinished token, or
/// the text length when nothing needs holding.
fn held_fragment_start(text: &str) -> usize {
    text.match_indices('<')
        .map(|(i, _)| i)
        .find(|&i| could_become_token(&text[i..]))
        .unwrap_or(text.len())
}

fn could_become_token(fragment: &str) -> bool {
    let mut chars = fragment.chars().skip(1);
    match chars.next() {
        None => true,
        Some('|') | Some('｜') => !fragment.contains('>') && fragment.len() <= MAX_HELD_BYTES,
        Some(_) => LITERAL_TOKENS
            .iter()
            .any(|token| token.len() > fragment.len() && token.starts_with(fragment)),
    }
}

/// Split after `.`, `!` or `?` when followed by whitespace. Terminal
/// punctuation stays with its sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_i, next)) = chars.peek() {
                if next.is_whitespace() {
                    let sentence = text[start..next_i].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = next_i;
                }
            }
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Keep at most `max_sentences` sentences.
pub fn cap_sentences(text: &str, max_sentences: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.len() <= max_sentences {
        return text.to_string();
    }
    sentences[..max_sentences].join(" ")
}

/// Strip control tokens and cap the sentence count.
pub fn finalize(text: &str, max_sentences: usize) -> String {
    cap_sentences(&strip_control_tokens(text), max_sentences)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_control_tokens_keeps_spacing() {
        assert_eq!(remove_control_tokens("Heat is "), "Heat is ");
        assert_eq!(remove_control_tokens("done.<|eot_id|>"), "done.");
    }

    fn filtered(chunks: &[&str]) -> Vec<String> {
        let mut filter = ControlTokenFilter::new();
        let mut out: Vec<String> = chunks.iter().map(|c| filter.push(c)).collect();
        out.push(filter.flush());
        out
    }

    #[test]
    fn test_filter_removes_token_split_across_chunks() {
        let out = filtered(&["Heat is a crime film.<|eot", "_id|>"]);
        assert_eq!(out, vec!["Heat is a crime film.", "", ""]);

        let out = filtered(&["Done.</", "s>"]);
        assert_eq!(out.concat(), "Done.");

        let out = filtered(&["<<SY", "S>>Answer: ", "yes."]);
        assert_eq!(out, vec!["", "Answer: ", "yes.", ""]);
    }

    #[test]
    fn test_filter_releases_plain_angle_brackets() {
        let out = filtered(&["a < b ", "and <b>bold</b>"]);
        assert_eq!(out, vec!["a < b ", "and <b>bold</b>", ""]);

        // Held until the stream ends, then released as text
        let out = filtered(&["Ends with <"]);
        assert_eq!(out, vec!["Ends with ", "<"]);

        let out = filtered(&["<| not a token > at all"]);
        assert_eq!(out.concat(), "<| not a token > at all");
    }

    #[test]
    fn test_filter_caps_held_fragment() {
        let long = format!("<|{}", "x".repeat(MAX_HELD_BYTES));
        let mut filter = ControlTokenFilter::new();
        assert_eq!(filter.push(&long), long);
        assert_eq!(filter.flush(), "");
    }

    #[test]
    fn test_strip_control_tokens() {
        assert_eq!(
            strip_control_tokens("<s> Inception is great.<|eot_id|></s>"),
            "Inception is great."
        );
        assert_eq!(strip_control_tokens("<<SYS>>Hi<</SYS>>"), "Hi");
        assert_eq!(strip_control_tokens("<｜end▁of▁sentence｜>Done"), "Done");
        assert_eq!(strip_control_tokens("a < b and c > d"), "a < b and c > d");
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One. Two!  Three? Four"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
        assert_eq!(split_sentences("Released in 2010.5 stars."), vec!["Released in 2010.5 stars."]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_cap_sentences() {
        let text = "A. B. C. D.";
        assert_eq!(cap_sentences(text, 2), "A. B.");
        assert_eq!(cap_sentences(text, 4), text);
        assert_eq!(cap_sentences(text, 10), text);
    }

    #[test]
    fn test_finalize() {
        let raw = "<s>One. Two. Three. Four. Five. Six. Seven.</s>";
        assert_eq!(finalize(raw, 6), "One. Two. Three. Four. Five. Six.");
    }
}
