//! Optional pairwise reranking stage.
//!
//! A [`Reranker`] scores each (query, content) pair. [`RerankStage`] blends
//! that score with the weighted score and re-sorts. The stage is off unless
//! configured, since it costs one scoring pass per candidate.

use super::{sort_by_weighted_score, RankedSection};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Characters of section content a reranker looks at.
const RERANK_CONTENT_CHARS: usize = 1000;

/// Scores query/content relevance.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// One score per candidate, in input order, in [0, 1].
    async fn score(&self, query: &str, candidates: &[RankedSection]) -> Result<Vec<f32>>;
}

/// Fraction of query terms that occur in the section text.
#[derive(Debug, Clone, Default)]
pub struct TermOverlapReranker;

impl TermOverlapReranker {
    fn terms(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() > 2)
            .map(|t| t.to_lowercase())
            .collect()
    }
}

#[async_trait]
impl Reranker for TermOverlapReranker {
    async fn score(&self, query: &str, candidates: &[RankedSection]) -> Result<Vec<f32>> {
        let query_terms = Self::terms(query);
        if query_terms.is_empty() {
            return Ok(vec![0.0; candidates.len()]);
        }

        Ok(candidates
            .iter()
            .map(|c| {
                let head: String = c.content.chars().take(RERANK_CONTENT_CHARS).collect();
                let content_terms = Self::terms(&head);
                let hits = query_terms.intersection(&content_terms).count();
                hits as f32 / query_terms.len() as f32
            })
            .collect())
    }
}

/// Blends reranker scores into the weighted ranking.
pub struct RerankStage {
    reranker: Arc<dyn Reranker>,
    /// Share of the final score taken by the reranker.
    rerank_weight: f32,
}

impl RerankStage {
    pub fn new(reranker: Arc<dyn Reranker>) -> Self {
        Self {
            reranker,
            rerank_weight: 0.4,
        }
    }

    pub fn with_rerank_weight(mut self, weight: f32) -> Self {
        self.rerank_weight = weight.clamp(0.0, 1.0);
        self
    }

    /// `(1 - w) * weighted + w * rerank`, re-sorted descending. A failing
    /// reranker leaves the weighted order untouched.
    pub async fn apply(&self, query: &str, candidates: Vec<RankedSection>) -> Vec<RankedSection> {
        if candidates.is_empty() {
            return candidates;
        }

        let scores = match self.reranker.score(query, &candidates).await {
            Ok(scores) if scores.len() == candidates.len() => scores,
            Ok(scores) => {
                warn!(
                    expected = candidates.len(),
                    got = scores.len(),
                    "Reranker returned wrong number of scores"
                );
                return candidates;
            }
            Err(e) => {
                warn!("Reranking failed: {}", e);
                return candidates;
            }
        };

        let w = self.rerank_weight;
        let mut blended: Vec<RankedSection> = candidates
            .into_iter()
            .zip(scores)
            .map(|(c, s)| {
                let score = (1.0 - w) * c.weighted_score + w * s;
                c.with_weighted_score(score)
            })
            .collect();

        sort_by_weighted_score(&mut blended);
        debug!(count = blended.len(), "Reranked candidates");
        blended
    }
}
