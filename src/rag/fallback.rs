//! Template answers for the degraded paths.

use crate::config::Prompts;
use crate::ranking::RankedSection;
use std::collections::HashMap;

/// Titles of the first `limit` distinct items, in rank order.
pub fn top_titles(candidates: &[RankedSection], limit: usize) -> Vec<String> {
    let mut titles: Vec<String> = Vec::new();
    for c in candidates {
        if titles.len() >= limit {
            break;
        }
        if !titles.contains(&c.item_title) {
            titles.push(c.item_title.clone());
        }
    }
    titles
}

/// Answer used when generation fails, built from the best candidates.
pub fn suggestions(prompts: &Prompts, candidates: &[RankedSection]) -> String {
    let titles = top_titles(&candidates[..candidates.len().min(3)], 3);
    if titles.is_empty() {
        return no_results(prompts);
    }

    let mut vars = HashMap::new();
    vars.insert("titles".to_string(), titles.join(", "));
    prompts.render_with_custom(&prompts.fallback.suggestions, &vars)
}

/// Answer used when nothing relevant was retrieved.
pub fn no_results(prompts: &Prompts) -> String {
    prompts.render_with_custom(&prompts.fallback.no_results, &HashMap::new())
}

/// Answer used when embedding or retrieval failed.
pub fn error_message(prompts: &Prompts) -> String {
    prompts.render_with_custom(&prompts.fallback.error, &HashMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SectionKind;
    use crate::ranking::candidate;

    #[test]
    fn test_suggestions_use_best_three_candidates() {
        let prompts = Prompts::default();
        let candidates = vec![
            candidate(1, SectionKind::Themes, 0.9),
            candidate(1, SectionKind::Legacy, 0.8),
            candidate(2, SectionKind::Themes, 0.7),
            candidate(3, SectionKind::Themes, 0.6),
        ];

        let text = suggestions(&prompts, &candidates);
        assert!(text.contains("you might be interested in: Movie 1, Movie 2."));
        assert!(!text.contains("Movie 3"));
    }

    #[test]
    fn test_suggestions_without_candidates() {
        let prompts = Prompts::default();
        assert_eq!(suggestions(&prompts, &[]), no_results(&prompts));
    }
}
