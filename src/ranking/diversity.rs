//! Per-item diversity cap.

use super::RankedSection;
use crate::catalog::ItemId;
use std::collections::HashMap;

/// Keeps at most `max_per_item` candidates per item.
#[derive(Debug, Clone, Copy)]
pub struct DiversitySelector {
    max_per_item: usize,
}

impl Default for DiversitySelector {
    fn default() -> Self {
        Self { max_per_item: 2 }
    }
}

impl DiversitySelector {
    pub fn new(max_per_item: usize) -> Self {
        Self { max_per_item }
    }

    pub fn max_per_item(&self) -> usize {
        self.max_per_item
    }

    /// Single pass over candidates already sorted by weighted score. Stops
    /// after `k` admissions and never pads with skipped candidates.
    pub fn select(&self, candidates: Vec<RankedSection>, k: usize) -> Vec<RankedSection> {
        let mut counts: HashMap<ItemId, usize> = HashMap::new();
        let mut selected = Vec::with_capacity(k.min(candidates.len()));

        for candidate in candidates {
            if selected.len() >= k {
                break;
            }
            let count = counts.entry(candidate.item_id).or_insert(0);
            if *count < self.max_per_item {
                *count += 1;
                selected.push(candidate);
            }
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SectionKind;
    use crate::ranking::candidate;

    /// Deterministic pseudo-random sequence (LCG) for property-style checks.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.0 >> 33
        }
    }

    fn random_candidates(rng: &mut Lcg, n: usize) -> Vec<RankedSection> {
        let mut out: Vec<RankedSection> = (0..n)
            .map(|i| {
                let item = (rng.next() % 6) as i64;
                let kind = SectionKind::ALL[(rng.next() % 8) as usize];
                let mut c = candidate(item, kind, (rng.next() % 1000) as f32 / 1000.0);
                c.document_id = format!("doc-{}", i);
                c
            })
            .collect();
        crate::ranking::sort_by_weighted_score(&mut out);
        out
    }

    #[test]
    fn test_caps_per_item_and_stops_at_k() {
        let selector = DiversitySelector::default();
        let input = vec![
            candidate(1, SectionKind::Themes, 0.9),
            candidate(1, SectionKind::PlotStructure, 0.8),
            candidate(1, SectionKind::Characters, 0.7),
            candidate(2, SectionKind::Themes, 0.6),
            candidate(3, SectionKind::Themes, 0.5),
        ];

        let out = selector.select(input.clone(), 3);
        let ids: Vec<i64> = out.iter().map(|c| c.item_id).collect();
        assert_eq!(ids, vec![1, 1, 2]);

        let out = selector.select(input, 10);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_returns_fewer_rather_than_padding() {
        let selector = DiversitySelector::new(2);
        let input = vec![
            candidate(7, SectionKind::Themes, 0.9),
            candidate(7, SectionKind::Legacy, 0.8),
            candidate(7, SectionKind::Reception, 0.7),
            candidate(7, SectionKind::Production, 0.6),
        ];
        assert_eq!(selector.select(input, 3).len(), 2);
        assert!(selector.select(Vec::new(), 3).is_empty());
    }

    #[test]
    fn test_cap_and_subsequence_properties() {
        let mut rng = Lcg(0x5eed);
        for round in 0..200 {
            let n = (rng.next() % 30) as usize;
            let k = (rng.next() % 12) as usize;
            let max_per_item = 1 + (rng.next() % 3) as usize;
            let input = random_candidates(&mut rng, n);

            let out = DiversitySelector::new(max_per_item).select(input.clone(), k);

            assert!(out.len() <= k, "round {}", round);

            let mut counts: HashMap<ItemId, usize> = HashMap::new();
            for c in &out {
                *counts.entry(c.item_id).or_default() += 1;
            }
            assert!(counts.values().all(|&n| n <= max_per_item), "round {}", round);

            // Output is a subsequence of the input.
            let mut cursor = input.iter();
            for c in &out {
                assert!(
                    cursor.any(|i| i.document_id == c.document_id),
                    "round {}",
                    round
                );
            }
        }
    }
}
