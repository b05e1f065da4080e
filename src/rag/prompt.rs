//! Prompt assembly.

use crate::catalog::{Item, KindPriority, SectionKind};
use crate::config::{ModeSettings, Prompts};
use crate::intent::QueryIntent;
use crate::llm::ChatMessage;
use crate::ranking::RankedSection;
use std::collections::HashMap;

/// Characters of a section placed in the prompt.
pub fn section_budget(kind: SectionKind, mode: &ModeSettings) -> usize {
    match kind.priority() {
        KindPriority::High => mode.budget_high,
        KindPriority::Medium => mode.budget_medium,
        KindPriority::Low => mode.budget_low,
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Format sources as a numbered list, in the given order.
pub fn format_context_for_prompt(sources: &[RankedSection], mode: &ModeSettings) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            format!(
                "[Source {}] {} - {} [Relevance: {:.2}]\n{}",
                i + 1,
                source.labelled_title(),
                source.section_kind.display_name(),
                source.raw_similarity,
                truncate_chars(&source.content, section_budget(source.section_kind, mode))
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Everything needed to build the messages for one generation.
pub struct PromptInput<'a> {
    pub question: &'a str,
    pub intent: QueryIntent,
    pub item: Option<&'a Item>,
    pub sources: &'a [RankedSection],
    pub mode: &'a ModeSettings,
    /// Whether the opening instructions were already sent in this conversation.
    pub opening_sent: bool,
}

/// Build the message list. The opening instructions are included only when
/// they have not been sent yet.
pub fn build_messages(prompts: &Prompts, input: &PromptInput<'_>) -> Vec<ChatMessage> {
    let mut vars = HashMap::new();
    vars.insert("question".to_string(), input.question.to_string());
    vars.insert(
        "context".to_string(),
        format_context_for_prompt(input.sources, input.mode),
    );
    if let Some(item) = input.item {
        vars.insert("title".to_string(), item.labelled_title());
    }

    let mut messages = Vec::with_capacity(2);

    if !input.opening_sent {
        let opening = match input.item {
            Some(_) => prompts.render_with_custom(&prompts.chat.item_opening, &vars),
            None => prompts.render_with_custom(&prompts.chat.opening_for(input.intent), &vars),
        };
        messages.push(ChatMessage::system(opening));
    }

    let template = match input.item {
        Some(_) => &prompts.chat.item_user,
        None => &prompts.chat.user,
    };
    messages.push(ChatMessage::user(prompts.render_with_custom(template, &vars)));

    messages
}
