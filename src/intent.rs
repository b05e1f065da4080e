//! Query intent classification.
//!
//! A keyword table evaluated in order; the first rule whose keywords appear in
//! the lowercased query wins. The table is plain data so it can be replaced
//! from configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The heuristically classified purpose of a user query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Plot,
    Technical,
    Analysis,
    Facts,
    General,
    Recommendation,
    Comparison,
    GenreTheme,
    FollowUp,
}

impl QueryIntent {
    pub const ALL: [QueryIntent; 9] = [
        QueryIntent::Plot,
        QueryIntent::Technical,
        QueryIntent::Analysis,
        QueryIntent::Facts,
        QueryIntent::General,
        QueryIntent::Recommendation,
        QueryIntent::Comparison,
        QueryIntent::GenreTheme,
        QueryIntent::FollowUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Plot => "plot",
            QueryIntent::Technical => "technical",
            QueryIntent::Analysis => "analysis",
            QueryIntent::Facts => "facts",
            QueryIntent::General => "general",
            QueryIntent::Recommendation => "recommendation",
            QueryIntent::Comparison => "comparison",
            QueryIntent::GenreTheme => "genre_theme",
            QueryIntent::FollowUp => "follow_up",
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the keyword table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRule {
    pub intent: QueryIntent,
    pub keywords: Vec<String>,
    /// Only considered when the conversation already has turns.
    #[serde(default)]
    pub requires_history: bool,
}

impl IntentRule {
    pub fn new(intent: QueryIntent, keywords: &[&str]) -> Self {
        Self {
            intent,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            requires_history: false,
        }
    }

    pub fn with_history(mut self) -> Self {
        self.requires_history = true;
        self
    }

    fn matches(&self, query_lower: &str, has_history: bool) -> bool {
        if self.requires_history && !has_history {
            return false;
        }
        self.keywords
            .iter()
            .any(|kw| contains_keyword(query_lower, &kw.to_lowercase()))
    }
}

/// Substring match, except that single-word keywords must sit on word
/// boundaries so "vs" does not fire inside "canvas".
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }
    if keyword.contains(' ') || !keyword.chars().all(char::is_alphanumeric) {
        return haystack.contains(keyword);
    }
    haystack
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .any(|word| word == keyword || word.strip_suffix('s') == Some(keyword))
}

/// Ordered list of intent rules. [`QueryIntent::General`] is the fallback
/// and needs no rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTable {
    pub rules: Vec<IntentRule>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self {
            rules: vec![
                IntentRule::new(
                    QueryIntent::FollowUp,
                    &[
                        "them", "those", "these", "they", "their", "what about",
                        "tell me more", "why", "how about", "also",
                    ],
                )
                .with_history(),
                IntentRule::new(
                    QueryIntent::Recommendation,
                    &[
                        "recommend", "suggestion", "should i watch", "similar to", "like",
                        "what movie", "looking for", "want to watch", "good movies",
                        "best movies", "top movies",
                    ],
                ),
                IntentRule::new(
                    QueryIntent::Comparison,
                    &[
                        "compare", "versus", "vs", "difference between", "better than",
                        "similar", "both", "either",
                    ],
                ),
                IntentRule::new(
                    QueryIntent::GenreTheme,
                    &[
                        "genre", "theme", "about", "exploring", "dealing with", "drama",
                        "comedy", "thriller", "action", "sci-fi", "love", "war", "family",
                        "friendship", "redemption",
                    ],
                ),
                IntentRule::new(
                    QueryIntent::Plot,
                    &[
                        "what happens", "story", "plot", "ending", "scene", "character does",
                        "beginning", "middle", "climax", "synopsis", "summary", "occurs",
                    ],
                ),
                IntentRule::new(
                    QueryIntent::Technical,
                    &[
                        "cinematography", "camera", "visual", "shot", "editing", "sound",
                        "music", "score", "design", "costume", "lighting", "effects",
                        "cinematographer",
                    ],
                ),
                IntentRule::new(
                    QueryIntent::Analysis,
                    &[
                        "meaning", "symbol", "represents", "analysis", "message",
                        "philosophical", "deeper", "metaphor",
                    ],
                ),
                IntentRule::new(
                    QueryIntent::Facts,
                    &[
                        "budget", "box office", "award", "actor", "director", "cast", "when",
                        "where", "who", "made", "produced", "crew",
                    ],
                ),
            ],
        }
    }
}

/// Pure keyword classifier.
#[derive(Debug, Clone, Default)]
pub struct QueryClassifier {
    table: KeywordTable,
}

impl QueryClassifier {
    pub fn new(table: KeywordTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    /// Classify a query. First matching rule wins; no match is `General`.
    pub fn classify(&self, query: &str, has_history: bool) -> QueryIntent {
        let query_lower = query.to_lowercase();
        self.table
            .rules
            .iter()
            .find(|rule| rule.matches(&query_lower, has_history))
            .map(|rule| rule.intent)
            .unwrap_or(QueryIntent::General)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_up_requires_history() {
        let classifier = QueryClassifier::default();
        assert_eq!(classifier.classify("What about them?", true), QueryIntent::FollowUp);
        assert_ne!(classifier.classify("What about them?", false), QueryIntent::FollowUp);
    }

    #[test]
    fn test_priority_order() {
        let classifier = QueryClassifier::default();

        // Matches both recommendation and genre_theme; recommendation is earlier.
        assert_eq!(
            classifier.classify("Recommend a thriller about family", false),
            QueryIntent::Recommendation
        );
        assert_eq!(
            classifier.classify("Compare Heat versus Collateral", false),
            QueryIntent::Comparison
        );
        assert_eq!(
            classifier.classify("Which films explore redemption?", false),
            QueryIntent::GenreTheme
        );
        assert_eq!(
            classifier.classify("How does the ending work?", false),
            QueryIntent::Plot
        );
        assert_eq!(
            classifier.classify("Talk about the cinematography", false),
            QueryIntent::GenreTheme
        );
        assert_eq!(
            classifier.classify("How was the cinematography done?", false),
            QueryIntent::Technical
        );
        assert_eq!(
            classifier.classify("Who directed it?", false),
            QueryIntent::Facts
        );
    }

    #[test]
    fn test_main_themes_is_genre_theme_and_greeting_is_general() {
        let classifier = QueryClassifier::default();
        assert_eq!(
            classifier.classify("What are the main themes?", false),
            QueryIntent::GenreTheme
        );
        assert_eq!(classifier.classify("Hello there", false), QueryIntent::General);
    }

    #[test]
    fn test_single_word_keywords_respect_word_boundaries() {
        assert!(contains_keyword("heat vs collateral", "vs"));
        assert!(!contains_keyword("a painted canvas", "vs"));
        assert!(contains_keyword("two great thrillers", "thriller"));
        assert!(!contains_keyword("it works", "war"));
        assert!(contains_keyword("what about it", "what about"));
        assert!(contains_keyword("classic sci-fi", "sci-fi"));
    }

    #[test]
    fn test_injected_table() {
        let table = KeywordTable {
            rules: vec![IntentRule::new(QueryIntent::Facts, &["runtime"])],
        };
        let classifier = QueryClassifier::new(table);
        assert_eq!(classifier.classify("What is the runtime?", false), QueryIntent::Facts);
        assert_eq!(classifier.classify("Recommend something", false), QueryIntent::General);
    }

    #[test]
    fn test_table_roundtrips_through_toml() {
        let table = KeywordTable::default();
        let text = toml::to_string(&table).unwrap();
        let parsed: KeywordTable = toml::from_str(&text).unwrap();
        assert_eq!(parsed, table);
    }
}
