//! Ranking of retrieved candidates: intent weighting, optional reranking and
//! per-item diversity.

mod diversity;
mod rerank;
mod weighting;

pub use diversity::DiversitySelector;
pub use rerank::{RerankStage, Reranker, TermOverlapReranker};
pub use weighting::{RelevanceWeighter, WeightMatrix};

use crate::catalog::{ItemId, Section, SectionKind};
use crate::vector_store::VectorMatch;
use serde::{Deserialize, Serialize};

/// One candidate section, hydrated and scored.
///
/// Produced once per retrieval call and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSection {
    pub document_id: String,
    pub item_id: ItemId,
    pub item_title: String,
    pub item_year: Option<i32>,
    pub section_kind: SectionKind,
    /// Cosine similarity from the vector store.
    pub raw_similarity: f32,
    /// Score after intent weighting (and reranking, when enabled).
    pub weighted_score: f32,
    pub content: String,
}

impl RankedSection {
    /// Combine a vector hit with its section text. The weighted score starts
    /// out equal to the raw similarity.
    pub fn from_match(hit: VectorMatch, section: Section) -> Self {
        Self {
            document_id: hit.document_id,
            item_id: hit.item_id,
            item_title: section.item_title,
            item_year: section.item_year,
            section_kind: hit.section_kind,
            raw_similarity: hit.similarity,
            weighted_score: hit.similarity,
            content: section.content,
        }
    }

    /// A copy of this candidate with a new weighted score.
    pub fn with_weighted_score(self, weighted_score: f32) -> Self {
        Self {
            weighted_score,
            ..self
        }
    }

    /// Title with year, e.g. "Inception (2010)".
    pub fn labelled_title(&self) -> String {
        match self.item_year {
            Some(year) => format!("{} ({})", self.item_title, year),
            None => self.item_title.clone(),
        }
    }
}

/// Sort by descending weighted score. Ties keep their input order.
pub(crate) fn sort_by_weighted_score(candidates: &mut [RankedSection]) {
    candidates.sort_by(|a, b| {
        b.weighted_score
            .partial_cmp(&a.weighted_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
pub(crate) fn candidate(
    item_id: ItemId,
    kind: SectionKind,
    similarity: f32,
) -> RankedSection {
    RankedSection {
        document_id: format!("{}-{}", item_id, kind),
        item_id,
        item_title: format!("Movie {}", item_id),
        item_year: Some(2000),
        section_kind: kind,
        raw_similarity: similarity,
        weighted_score: similarity,
        content: format!("Section {} of movie {}", kind, item_id),
    }
}
