//! Intent × section-kind weighting.

use super::{sort_by_weighted_score, RankedSection};
use crate::catalog::SectionKind;
use crate::error::{MarqueeError, Result};
use crate::intent::QueryIntent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Multipliers per (intent, kind). Missing cells weigh exactly 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightMatrix {
    rows: HashMap<QueryIntent, HashMap<SectionKind, f32>>,
}

impl WeightMatrix {
    /// A matrix with no entries: every multiplier is 1.0.
    pub fn identity() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }

    /// Set one cell.
    pub fn set(&mut self, intent: QueryIntent, kind: SectionKind, multiplier: f32) {
        self.rows.entry(intent).or_default().insert(kind, multiplier);
    }

    /// Multiplier for a cell.
    pub fn multiplier(&self, intent: QueryIntent, kind: SectionKind) -> f32 {
        self.rows
            .get(&intent)
            .and_then(|row| row.get(&kind))
            .copied()
            .unwrap_or(1.0)
    }

    /// Reject non-positive or non-finite multipliers, which would break the
    /// ordering of same-kind candidates.
    pub fn validate(&self) -> Result<()> {
        for (intent, row) in &self.rows {
            for (kind, value) in row {
                if !value.is_finite() || *value <= 0.0 {
                    return Err(MarqueeError::Config(format!(
                        "Weight for {}/{} must be positive, got {}",
                        intent, kind, value
                    )));
                }
            }
        }
        Ok(())
    }

    fn row(intent: QueryIntent, cells: &[(SectionKind, f32)]) -> (QueryIntent, HashMap<SectionKind, f32>) {
        (intent, cells.iter().copied().collect())
    }
}

impl Default for WeightMatrix {
    fn default() -> Self {
        use SectionKind::*;

        let general = [
            (PlotStructure, 2.2),
            (Themes, 1.8),
            (Characters, 1.6),
            (VisualTechnical, 1.4),
            (Production, 1.2),
            (CastCrew, 1.2),
            (Reception, 1.0),
            (Legacy, 1.0),
        ];

        let rows = [
            Self::row(
                QueryIntent::Plot,
                &[
                    (PlotStructure, 3.5),
                    (Characters, 2.0),
                    (Themes, 1.5),
                    (Production, 1.0),
                    (CastCrew, 0.8),
                    (VisualTechnical, 0.5),
                    (Reception, 0.5),
                    (Legacy, 0.5),
                ],
            ),
            Self::row(
                QueryIntent::Technical,
                &[
                    (VisualTechnical, 3.5),
                    (Production, 2.0),
                    (CastCrew, 1.5),
                    (Themes, 1.0),
                    (PlotStructure, 0.8),
                    (Characters, 0.5),
                    (Reception, 0.5),
                    (Legacy, 0.5),
                ],
            ),
            Self::row(
                QueryIntent::Analysis,
                &[
                    (Themes, 3.5),
                    (Characters, 2.5),
                    (VisualTechnical, 2.0),
                    (PlotStructure, 1.5),
                    (CastCrew, 1.0),
                    (Production, 0.8),
                    (Reception, 0.8),
                    (Legacy, 1.0),
                ],
            ),
            Self::row(
                QueryIntent::Facts,
                &[
                    (Production, 3.5),
                    (CastCrew, 2.5),
                    (Reception, 2.0),
                    (Legacy, 1.5),
                    (PlotStructure, 1.0),
                    (Characters, 0.8),
                    (VisualTechnical, 0.8),
                    (Themes, 0.5),
                ],
            ),
            Self::row(QueryIntent::General, &general),
            Self::row(QueryIntent::FollowUp, &general),
            Self::row(QueryIntent::Recommendation, &[(Themes, 1.5), (Characters, 1.5)]),
            Self::row(
                QueryIntent::Comparison,
                &[(Themes, 1.8), (Characters, 1.8), (VisualTechnical, 1.8)],
            ),
            Self::row(
                QueryIntent::GenreTheme,
                &[
                    (Themes, 1.8),
                    (PlotStructure, 1.4),
                    (Characters, 1.4),
                    (Legacy, 1.2),
                ],
            ),
        ];

        Self {
            rows: rows.into_iter().collect(),
        }
    }
}

/// Applies a [`WeightMatrix`] to a candidate list.
#[derive(Debug, Clone, Default)]
pub struct RelevanceWeighter {
    matrix: WeightMatrix,
}

impl RelevanceWeighter {
    pub fn new(matrix: WeightMatrix) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &WeightMatrix {
        &self.matrix
    }

    /// Set `weighted_score = raw_similarity * multiplier` and sort by it,
    /// descending. Equal scores keep their input order.
    pub fn weight(&self, candidates: Vec<RankedSection>, intent: QueryIntent) -> Vec<RankedSection> {
        let mut weighted: Vec<RankedSection> = candidates
            .into_iter()
            .map(|c| {
                let multiplier = self.matrix.multiplier(intent, c.section_kind);
                let score = c.raw_similarity * multiplier;
                c.with_weighted_score(score)
            })
            .collect();

        sort_by_weighted_score(&mut weighted);
        debug!(intent = %intent, count = weighted.len(), "Weighted candidates");
        weighted
    }
}
