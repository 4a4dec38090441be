//! Core data model for one deliberation request.
//!
//! Mirrors the shape of `hive_ai::consensus::types`: plain `serde`-derived
//! structs, no behavior beyond small accessors, moved linearly through the
//! pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque model identifier, honoured only by the `ModelCaller` implementation.
pub type ModelId = String;

/// Deliberation mode requested for Stage 3 synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Consensus,
    Debate,
}

/// Whether the caller wants a structured pass/fail verdict extracted from
/// the chairman's synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictType {
    None,
    Binary,
}

/// A user query accepted by the orchestrator. Immutable once accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub prompt: String,
    pub mode: Mode,
    pub verdict_type: VerdictType,
    pub confidence_threshold: f64,
    pub include_details: bool,
}

impl Query {
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("prompt must not be empty".into());
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err("confidence_threshold must be in [0,1]".into());
        }
        Ok(())
    }
}

/// Per-stage wall-clock timeouts, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageTimeouts {
    pub s1: u64,
    pub s2: u64,
    pub s3: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            s1: 30_000,
            s2: 30_000,
            s3: 30_000,
        }
    }
}

/// Weights used by [`crate::confidence::ConfidenceScorer`] to blend the
/// three agreement signals. Normalized to sum to 1.0 before use, the way
/// `ConfidenceScoringEngine` normalizes `ScoringWeights` in the wider Hive
/// codebase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub rank: f64,
    pub rubric: f64,
    pub spread: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            rank: 0.5,
            rubric: 0.3,
            spread: 0.2,
        }
    }
}

/// Resolved council configuration handed to the orchestrator. The engine
/// never discovers this from a file or environment — that is the caller's
/// concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilConfig {
    pub council_models: Vec<ModelId>,
    pub chairman_model: ModelId,
    pub normalizer_model: Option<ModelId>,
    pub exclude_self_votes: bool,
    pub style_normalization: bool,
    pub max_reviewers: Option<usize>,
    pub per_stage_timeout_ms: StageTimeouts,
    #[serde(default)]
    pub confidence_weights: ConfidenceWeights,
    #[serde(default = "default_transcript_root")]
    pub transcript_root: std::path::PathBuf,
}

fn default_transcript_root() -> std::path::PathBuf {
    std::path::PathBuf::from(".council/logs")
}

impl CouncilConfig {
    /// Validates the invariants of §3: at least two unique council models,
    /// a chairman, and (if set) a sane `max_reviewers`.
    pub fn validate(&self) -> Result<(), String> {
        if self.council_models.len() < 2 {
            return Err("council_models must contain at least 2 models".into());
        }
        let mut seen = std::collections::HashSet::new();
        for m in &self.council_models {
            if !seen.insert(m) {
                return Err(format!("council_models contains duplicate: {m}"));
            }
        }
        if self.chairman_model.trim().is_empty() {
            return Err("chairman_model must not be empty".into());
        }
        if self.council_models.len() > 26 {
            return Err(format!(
                "council_models has {} entries, exceeding the 26-letter anonymization alphabet",
                self.council_models.len()
            ));
        }
        if let Some(k) = self.max_reviewers {
            if k == 0 {
                return Err("max_reviewers must be > 0 when set".into());
            }
        }
        Ok(())
    }
}

/// Kinds of recoverable-or-fatal error a single model call can produce,
/// per the `ModelCaller` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    Upstream4xx,
    Upstream5xx,
    Network,
    MalformedResponse,
}

/// The outcome of one model call within a stage. Exactly one of `value` /
/// `error` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult<T> {
    pub model: ModelId,
    pub value: Option<T>,
    pub error: Option<ErrorKind>,
    pub latency_ms: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl<T> StageResult<T> {
    pub fn ok(model: ModelId, value: T, latency_ms: u64, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        Self {
            model,
            value: Some(value),
            error: None,
            latency_ms,
            started_at,
            ended_at,
        }
    }

    pub fn err(model: ModelId, error: ErrorKind, latency_ms: u64, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        Self {
            model,
            value: None,
            error: Some(error),
            latency_ms,
            started_at,
            ended_at,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.value.is_some()
    }
}

/// A bijection between council models and single-letter labels for one
/// request. Backed by `BTreeMap` rather than `HashMap` so the transcript's
/// `request.json` serializes with sorted keys, per §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelMap {
    model_to_label: BTreeMap<ModelId, char>,
    label_to_model: BTreeMap<char, ModelId>,
}

impl LabelMap {
    pub fn new(model_to_label: BTreeMap<ModelId, char>) -> Self {
        let label_to_model = model_to_label.iter().map(|(m, l)| (*l, m.clone())).collect();
        Self {
            model_to_label,
            label_to_model,
        }
    }

    pub fn label_of(&self, model: &str) -> Option<char> {
        self.model_to_label.get(model).copied()
    }

    pub fn model_of(&self, label: char) -> Option<&ModelId> {
        self.label_to_model.get(&label)
    }

    pub fn labels(&self) -> impl Iterator<Item = char> + '_ {
        self.label_to_model.keys().copied()
    }
}

/// The five-dimensional rubric fixed by the specification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RubricScores {
    pub accuracy: f64,
    pub relevance: f64,
    pub completeness: f64,
    pub conciseness: f64,
    pub clarity: f64,
}

impl RubricScores {
    /// Clamp every dimension into [0, 10], per the Ranking invariant.
    pub fn clamped(self) -> Self {
        let c = |v: f64| v.clamp(0.0, 10.0);
        Self {
            accuracy: c(self.accuracy),
            relevance: c(self.relevance),
            completeness: c(self.completeness),
            conciseness: c(self.conciseness),
            clarity: c(self.clarity),
        }
    }

    pub fn as_array(&self) -> [f64; 5] {
        [
            self.accuracy,
            self.relevance,
            self.completeness,
            self.conciseness,
            self.clarity,
        ]
    }

    pub fn from_array(a: [f64; 5]) -> Self {
        Self {
            accuracy: a[0],
            relevance: a[1],
            completeness: a[2],
            conciseness: a[3],
            clarity: a[4],
        }
    }
}

/// One reviewer's parsed peer-ranking output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ranking {
    pub reviewer: ModelId,
    pub ordering: Vec<char>,
    pub rubric: BTreeMap<char, RubricScores>,
}

/// Aggregated standing of one responder after Borda scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    pub model: ModelId,
    pub borda_points: i64,
    pub mean_rubric: RubricScores,
    pub rubric_variance: RubricScores,
    pub reviewer_count: usize,
    pub self_excluded: bool,
}

/// The engine's PASS/FAIL/UNCLEAR classification in binary verdict mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Unclear,
}

/// Raw text extracted from the chairman's `FINAL_VERDICT:` line, before
/// mapping to a [`Verdict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExtractedVerdictRaw {
    Approved,
    Rejected,
}

/// Chairman's Stage 3 output, parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    pub chairman: ModelId,
    pub text: String,
    pub verdict: Option<Verdict>,
    pub confidence: Option<f64>,
    pub extracted_verdict_raw: Option<ExtractedVerdictRaw>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(n: usize) -> CouncilConfig {
        CouncilConfig {
            council_models: (0..n).map(|i| format!("m{i}")).collect(),
            chairman_model: "mc".into(),
            normalizer_model: None,
            exclude_self_votes: true,
            style_normalization: false,
            max_reviewers: None,
            per_stage_timeout_ms: StageTimeouts::default(),
            confidence_weights: ConfidenceWeights::default(),
            transcript_root: default_transcript_root(),
        }
    }

    #[test]
    fn council_at_the_26_letter_alphabet_limit_is_valid() {
        assert!(base_config(26).validate().is_ok());
    }

    #[test]
    fn council_over_the_26_letter_alphabet_limit_is_config_invalid() {
        let err = base_config(27).validate().unwrap_err();
        assert!(err.contains("26"));
    }
}
