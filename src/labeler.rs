//! Anonymization labeling for Stage 2 peer review: council members are
//! shown to each other only as single letters, shuffled per request so
//! position in `council_models` never leaks identity across runs.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::types::{LabelMap, ModelId};

const LABELS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Assigns a random permutation of `A`, `B`, `C`, ... to `models`.
///
/// Panics if `models.len()` exceeds the 26-letter alphabet. Callers reach
/// this only after `CouncilConfig::validate` has already rejected an
/// over-sized council with `ConfigInvalid`, so this is an internal
/// invariant, not a user-facing failure path.
pub struct AnonymizationLabeler;

impl AnonymizationLabeler {
    pub fn label(models: &[ModelId]) -> LabelMap {
        assert!(
            models.len() <= LABELS.len(),
            "council of {} models exceeds the {}-letter label alphabet",
            models.len(),
            LABELS.len()
        );

        let mut letters: Vec<char> = LABELS.chars().take(models.len()).collect();
        letters.shuffle(&mut thread_rng());

        let model_to_label: BTreeMap<ModelId, char> = models
            .iter()
            .cloned()
            .zip(letters)
            .collect();

        LabelMap::new(model_to_label)
    }
}
