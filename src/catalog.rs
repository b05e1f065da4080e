//! Catalog types shared by every stage of the pipeline.
//!
//! An item (a movie) owns up to one section per [`SectionKind`]. Sections are
//! written by an out-of-band generation job and are read-only here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Catalog item identifier.
pub type ItemId = i64;

/// The closed set of section kinds an item can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Production,
    #[serde(alias = "plot")]
    PlotStructure,
    CastCrew,
    Characters,
    VisualTechnical,
    Themes,
    Reception,
    Legacy,
}

/// How much context a section kind earns when a prompt is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindPriority {
    High,
    Medium,
    Low,
}

impl SectionKind {
    /// All kinds, in catalog order.
    pub const ALL: [SectionKind; 8] = [
        SectionKind::Production,
        SectionKind::PlotStructure,
        SectionKind::CastCrew,
        SectionKind::Characters,
        SectionKind::VisualTechnical,
        SectionKind::Themes,
        SectionKind::Reception,
        SectionKind::Legacy,
    ];

    /// Stable storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Production => "production",
            SectionKind::PlotStructure => "plot_structure",
            SectionKind::CastCrew => "cast_crew",
            SectionKind::Characters => "characters",
            SectionKind::VisualTechnical => "visual_technical",
            SectionKind::Themes => "themes",
            SectionKind::Reception => "reception",
            SectionKind::Legacy => "legacy",
        }
    }

    /// Human-readable label, e.g. "Plot Structure".
    pub fn display_name(&self) -> &'static str {
        match self {
            SectionKind::Production => "Production",
            SectionKind::PlotStructure => "Plot Structure",
            SectionKind::CastCrew => "Cast Crew",
            SectionKind::Characters => "Characters",
            SectionKind::VisualTechnical => "Visual Technical",
            SectionKind::Themes => "Themes",
            SectionKind::Reception => "Reception",
            SectionKind::Legacy => "Legacy",
        }
    }

    pub fn priority(&self) -> KindPriority {
        match self {
            SectionKind::PlotStructure | SectionKind::Characters | SectionKind::Themes => {
                KindPriority::High
            }
            SectionKind::VisualTechnical | SectionKind::Production | SectionKind::CastCrew => {
                KindPriority::Medium
            }
            SectionKind::Reception | SectionKind::Legacy => KindPriority::Low,
        }
    }
}

impl std::str::FromStr for SectionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(SectionKind::Production),
            "plot_structure" | "plot" => Ok(SectionKind::PlotStructure),
            "cast_crew" => Ok(SectionKind::CastCrew),
            "characters" => Ok(SectionKind::Characters),
            "visual_technical" => Ok(SectionKind::VisualTechnical),
            "themes" => Ok(SectionKind::Themes),
            "reception" => Ok(SectionKind::Reception),
            "legacy" => Ok(SectionKind::Legacy),
            _ => Err(format!("Unknown section kind: {}", s)),
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub year: Option<i32>,
}

impl Item {
    /// Title with year, e.g. "Inception (2010)".
    pub fn labelled_title(&self) -> String {
        labelled(&self.title, self.year)
    }
}

fn labelled(title: &str, year: Option<i32>) -> String {
    match year {
        Some(year) => format!("{} ({})", title, year),
        None => title.to_string(),
    }
}

/// A section of long-form text about an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub item_id: ItemId,
    pub kind: SectionKind,
    pub content: String,
    pub word_count: u32,
    pub item_title: String,
    pub item_year: Option<i32>,
}

impl Section {
    /// Create a section, deriving the word count from the content.
    pub fn new(
        item_id: ItemId,
        kind: SectionKind,
        content: impl Into<String>,
        item_title: impl Into<String>,
        item_year: Option<i32>,
    ) -> Self {
        let content = content.into();
        let word_count = content.split_whitespace().count() as u32;
        Self {
            item_id,
            kind,
            content,
            word_count,
            item_title: item_title.into(),
            item_year,
        }
    }

    /// True when the section exists but carries no text.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// The item this section belongs to.
    pub fn item(&self) -> Item {
        Item {
            id: self.item_id,
            title: self.item_title.clone(),
            year: self.item_year,
        }
    }

    /// Title with year, e.g. "Inception (2010)".
    pub fn labelled_title(&self) -> String {
        labelled(&self.item_title, self.item_year)
    }
}

/// One item as exported by the section generation job: the item plus its
/// section texts keyed by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: ItemId,
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub sections: BTreeMap<SectionKind, String>,
}

impl CatalogEntry {
    /// The entry's sections, in kind order.
    pub fn sections(&self) -> Vec<Section> {
        self.sections
            .iter()
            .map(|(kind, content)| Section::new(self.id, *kind, content.clone(), self.title.clone(), self.year))
            .collect()
    }
}

/// Parse a catalog export: a JSON array of [`CatalogEntry`].
pub fn parse_catalog(json: &str) -> serde_json::Result<Vec<CatalogEntry>> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_kind_parsing() {
        assert_eq!("plot".parse::<SectionKind>().unwrap(), SectionKind::PlotStructure);
        assert_eq!("Themes".parse::<SectionKind>().unwrap(), SectionKind::Themes);
        assert!("trivia".parse::<SectionKind>().is_err());

        for kind in SectionKind::ALL {
            assert_eq!(kind.as_str().parse::<SectionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_section_kind_serde_alias() {
        let kind: SectionKind = serde_json::from_str("\"plot\"").unwrap();
        assert_eq!(kind, SectionKind::PlotStructure);
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"plot_structure\"");
    }

    #[test]
    fn test_section_word_count_and_label() {
        let section = Section::new(27205, SectionKind::Themes, "Dreams within dreams", "Inception", Some(2010));
        assert_eq!(section.word_count, 3);
        assert_eq!(section.labelled_title(), "Inception (2010)");
        assert!(!section.is_empty());
        assert!(Section::new(1, SectionKind::Legacy, "  ", "X", None).is_empty());
    }

    #[test]
    fn test_parse_catalog() {
        let json = r#"[
            {"id": 27205, "title": "Inception", "year": 2010,
             "sections": {"themes": "Dreams and grief.", "plot": "A heist in dreams."}},
            {"id": 949, "title": "Heat"}
        ]"#;
        let entries = parse_catalog(json).unwrap();
        assert_eq!(entries.len(), 2);

        let sections = entries[0].sections();
        assert_eq!(sections.len(), 2);
        // Kind order, not file order
        assert_eq!(sections[0].kind, SectionKind::PlotStructure);
        assert_eq!(sections[1].item_title, "Inception");
        assert!(entries[1].sections().is_empty());
    }
}
