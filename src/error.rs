//! Unified error type for the council deliberation engine.
//!
//! Every fallible operation across the pipeline (fan-out, ranking parse,
//! aggregation, synthesis, transcript I/O) resolves into a single
//! [`CouncilError`], the way `hive_ai::core::error::HiveError` gives the rest
//! of the Hive codebase one error surface to log and match on.

use std::path::PathBuf;
use thiserror::Error;

/// Errors the deliberation engine can produce.
#[derive(Error, Debug)]
pub enum CouncilError {
    /// The resolved `CouncilConfig` failed validation before Stage 1 ran.
    #[error("invalid council configuration: {message}")]
    ConfigInvalid { message: String },

    /// A model call did not return before its per-call timeout elapsed.
    #[error("model {model} timed out after {timeout_ms}ms")]
    ModelTimeout { model: String, timeout_ms: u64 },

    /// The `ModelCaller` returned a non-timeout error for a model.
    #[error("upstream error calling {model}: {message}")]
    UpstreamError { model: String, message: String },

    /// A reviewer's output could not be parsed into a valid `Ranking`
    /// after the single retry allowed by Stage 2.
    #[error("malformed ranking response from reviewer {reviewer}: {reason}")]
    MalformedResponse { reviewer: String, reason: String },

    /// Stage 1 collected fewer than two successful responses.
    #[error("only {succeeded} of {attempted} council models responded; at least 2 are required")]
    InsufficientResponders { succeeded: usize, attempted: usize },

    /// The chairman call failed on the initial attempt and its retry.
    #[error("synthesis failed: chairman {chairman} did not produce a response: {message}")]
    SynthesisFailed { chairman: String, message: String },

    /// The transcript could not be written to disk.
    #[error("failed to write transcript file {path}: {message}")]
    TranscriptWriteError { path: PathBuf, message: String },

    /// The request was cancelled before completion.
    #[error("deliberation cancelled: {reason}")]
    Cancelled { reason: String },
}

impl CouncilError {
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    pub fn insufficient_responders(succeeded: usize, attempted: usize) -> Self {
        Self::InsufficientResponders {
            succeeded,
            attempted,
        }
    }

    /// Whether this error terminates the whole deliberation (as opposed to
    /// being recorded against a single model and tolerated by the stage).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. }
                | Self::InsufficientResponders { .. }
                | Self::SynthesisFailed { .. }
                | Self::Cancelled { .. }
        )
    }

    /// Coarse category used for logging and metrics, mirroring
    /// `HiveError::category` in the wider Hive codebase.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigInvalid { .. } => ErrorCategory::Configuration,
            Self::ModelTimeout { .. } | Self::UpstreamError { .. } => ErrorCategory::Upstream,
            Self::MalformedResponse { .. } => ErrorCategory::Parsing,
            Self::InsufficientResponders { .. } | Self::SynthesisFailed { .. } => {
                ErrorCategory::Deliberation
            }
            Self::TranscriptWriteError { .. } => ErrorCategory::Transcript,
            Self::Cancelled { .. } => ErrorCategory::Cancellation,
        }
    }

    /// The stable `ErrorKind` string recorded in `StageResult` and
    /// `result.json`, per the on-disk transcript schema.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::ConfigInvalid { .. } => "ConfigInvalid",
            Self::ModelTimeout { .. } => "ModelTimeout",
            Self::UpstreamError { .. } => "UpstreamError",
            Self::MalformedResponse { .. } => "MalformedResponse",
            Self::InsufficientResponders { .. } => "InsufficientResponders",
            Self::SynthesisFailed { .. } => "SynthesisFailed",
            Self::TranscriptWriteError { .. } => "TranscriptWriteError",
            Self::Cancelled { .. } => "Cancelled",
        }
    }
}

/// Error category for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Upstream,
    Parsing,
    Deliberation,
    Transcript,
    Cancellation,
}

pub type Result<T> = std::result::Result<T, CouncilError>;
