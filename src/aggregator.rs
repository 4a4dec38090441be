//! RankingAggregator (C7): de-anonymizes Stage 2 rankings, optionally
//! excludes self-votes, and computes Borda points plus rubric mean and
//! variance per responder.

use std::collections::HashMap;

use crate::types::{Aggregate, LabelMap, ModelId, Ranking, RubricScores};

/// Computes the Aggregate table from the raw (still-labeled) Rankings,
/// per §4.7. `responders` fixes the set of models eligible to appear in
/// the table (the models whose Stage 1 response succeeded).
pub fn aggregate(
    responders: &[ModelId],
    rankings: &[Ranking],
    label_map: &LabelMap,
    exclude_self_votes: bool,
) -> Vec<Aggregate> {
    let mut borda_points: HashMap<ModelId, i64> = responders.iter().cloned().map(|m| (m, 0)).collect();
    let mut rubric_samples: HashMap<ModelId, Vec<[f64; 5]>> =
        responders.iter().cloned().map(|m| (m, Vec::new())).collect();
    let mut reviewer_counts: HashMap<ModelId, usize> =
        responders.iter().cloned().map(|m| (m, 0)).collect();
    let mut self_excluded: HashMap<ModelId, bool> =
        responders.iter().cloned().map(|m| (m, false)).collect();

    for ranking in rankings {
        let k = ranking.ordering.len() as i64;

        for (idx, label) in ranking.ordering.iter().enumerate() {
            let Some(model) = label_map.model_of(*label) else {
                continue;
            };
            if !borda_points.contains_key(model) {
                continue;
            }

            let is_self_vote = *model == ranking.reviewer;
            if is_self_vote {
                self_excluded.insert(model.clone(), true);
                if exclude_self_votes {
                    continue;
                }
            }

            let position = idx as i64 + 1;
            let points = k - position + 1;
            *borda_points.get_mut(model).unwrap() += points;

            if let Some(scores) = ranking.rubric.get(label) {
                rubric_samples.get_mut(model).unwrap().push(scores.as_array());
                *reviewer_counts.get_mut(model).unwrap() += 1;
            }
        }
    }

    let mut rows: Vec<Aggregate> = responders
        .iter()
        .map(|model| {
            let samples = &rubric_samples[model];
            let (mean, variance) = mean_and_variance(samples);
            Aggregate {
                model: model.clone(),
                borda_points: borda_points[model],
                mean_rubric: RubricScores::from_array(mean),
                rubric_variance: RubricScores::from_array(variance),
                reviewer_count: reviewer_counts[model],
                self_excluded: self_excluded[model],
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.borda_points
            .cmp(&a.borda_points)
            .then_with(|| b.mean_rubric.accuracy.total_cmp(&a.mean_rubric.accuracy))
            .then_with(|| b.mean_rubric.relevance.total_cmp(&a.mean_rubric.relevance))
            .then_with(|| a.model.cmp(&b.model))
    });

    rows
}

fn mean_and_variance(samples: &[[f64; 5]]) -> ([f64; 5], [f64; 5]) {
    if samples.is_empty() {
        return ([0.0; 5], [0.0; 5]);
    }

    let n = samples.len() as f64;
    let mut mean = [0.0; 5];
    for sample in samples {
        for i in 0..5 {
            mean[i] += sample[i];
        }
    }
    for m in &mut mean {
        *m /= n;
    }

    let mut variance = [0.0; 5];
    for sample in samples {
        for i in 0..5 {
            let d = sample[i] - mean[i];
            variance[i] += d * d;
        }
    }
    for v in &mut variance {
        *v /= n;
    }

    (mean, variance)
}
