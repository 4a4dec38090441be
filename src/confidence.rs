//! ConfidenceScorer (C9): derives a single confidence value from reviewer
//! agreement, blending three signals the way
//! `consensus::confidence_scoring::ConfidenceScoringEngine` blends its
//! weighted score components — normalize the configured weights to sum
//! to 1.0, then combine.

use crate::types::{Aggregate, ConfidenceWeights, Ranking};

const RUBRIC_VARIANCE_MAX: f64 = 6.25;
const CONFIDENCE_MIN: f64 = 0.05;
const CONFIDENCE_MAX: f64 = 0.99;
const FALLBACK_CONFIDENCE: f64 = 0.50;

pub struct ConfidenceScorer;

impl ConfidenceScorer {
    /// Computes confidence ∈ [0.05, 0.99] from the surviving Rankings and
    /// Aggregate table, per §4.9. Falls back to 0.50 when fewer than two
    /// reviewers survived.
    pub fn score(rankings: &[Ranking], aggregate: &[Aggregate], weights: ConfidenceWeights) -> f64 {
        if rankings.len() < 2 {
            return FALLBACK_CONFIDENCE;
        }

        let c_rank = Self::rank_agreement(rankings);
        let c_rubric = Self::rubric_agreement(aggregate);
        let c_spread = Self::borda_spread(aggregate);

        let (wr, wb, ws) = Self::normalized(weights);
        let blended = wr * c_rank + wb * c_rubric + ws * c_spread;
        blended.clamp(CONFIDENCE_MIN, CONFIDENCE_MAX)
    }

    fn normalized(weights: ConfidenceWeights) -> (f64, f64, f64) {
        let sum = weights.rank + weights.rubric + weights.spread;
        if sum <= 0.0 {
            return (0.5, 0.3, 0.2);
        }
        (weights.rank / sum, weights.rubric / sum, weights.spread / sum)
    }

    /// `1 − (normalized mean pairwise Kendall-τ distance between reviewer
    /// orderings)`.
    fn rank_agreement(rankings: &[Ranking]) -> f64 {
        let mut distances = Vec::new();
        for i in 0..rankings.len() {
            for j in (i + 1)..rankings.len() {
                if let Some(d) = normalized_kendall_tau(&rankings[i].ordering, &rankings[j].ordering) {
                    distances.push(d);
                }
            }
        }

        if distances.is_empty() {
            return 1.0;
        }

        let mean_distance: f64 = distances.iter().sum::<f64>() / distances.len() as f64;
        1.0 - mean_distance
    }

    /// `1 − clamp(mean rubric variance / V_max, 0, 1)`.
    fn rubric_agreement(aggregate: &[Aggregate]) -> f64 {
        if aggregate.is_empty() {
            return 1.0;
        }

        let mean_variance: f64 = aggregate
            .iter()
            .map(|row| row.rubric_variance.as_array().iter().sum::<f64>() / 5.0)
            .sum::<f64>()
            / aggregate.len() as f64;

        1.0 - (mean_variance / RUBRIC_VARIANCE_MAX).clamp(0.0, 1.0)
    }

    /// `clamp((borda_top − borda_second) / borda_top, 0, 1)`, undefined
    /// (treated as 1.0) when only one responder exists.
    fn borda_spread(aggregate: &[Aggregate]) -> f64 {
        if aggregate.len() < 2 {
            return 1.0;
        }

        let top = aggregate[0].borda_points as f64;
        let second = aggregate[1].borda_points as f64;

        if top <= 0.0 {
            return 0.0;
        }

        ((top - second) / top).clamp(0.0, 1.0)
    }
}

/// Kendall-τ distance between two orderings over the same label set,
/// normalized by the number of pairs so the result lies in [0, 1].
/// Returns `None` if the orderings don't share the same label set.
fn normalized_kendall_tau(a: &[char], b: &[char]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }

    let rank_b: std::collections::HashMap<char, usize> =
        b.iter().enumerate().map(|(i, c)| (*c, i)).collect();

    let n = a.len();
    if n < 2 {
        return Some(0.0);
    }

    let mut discordant = 0usize;
    let mut pairs = 0usize;

    for i in 0..n {
        for j in (i + 1)..n {
            let (Some(&bi), Some(&bj)) = (rank_b.get(&a[i]), rank_b.get(&a[j])) else {
                return None;
            };
            pairs += 1;
            // a[i] precedes a[j] in `a`; discordant if that order is
            // reversed in `b`.
            if bi > bj {
                discordant += 1;
            }
        }
    }

    if pairs == 0 {
        Some(0.0)
    } else {
        Some(discordant as f64 / pairs as f64)
    }
}
