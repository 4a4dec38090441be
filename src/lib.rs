//! Council: a multi-model deliberation engine.
//!
//! Fans a query out to a council of models, collects anonymized peer
//! rankings, aggregates them into a Borda consensus, and has a chairman
//! model synthesize a final answer with a reproducible on-disk transcript.
//!
//! The HTTP/SSE server, CLI, and upstream model gateways are collaborators
//! outside this crate; it depends on them only through [`ModelCaller`].

pub mod aggregator;
pub mod cancellation;
pub mod confidence;
pub mod error;
pub mod events;
pub mod labeler;
pub mod logging;
pub mod model_caller;
pub mod orchestrator;
pub mod stage_runner;
pub mod stages;
pub mod transcript;
pub mod types;

pub use cancellation::{CancellationReason, CancellationToken};
pub use error::{CouncilError, ErrorCategory, Result};
pub use events::{Event, EventBus, EventKind};
pub use model_caller::{ModelCallError, ModelCaller, ModelReply};
pub use orchestrator::{ErrorEnvelope, Orchestrator, ResultEnvelope};
pub use types::{
    Aggregate, ConfidenceWeights, CouncilConfig, ErrorKind, LabelMap, ModelId, Mode, Query,
    Ranking, RubricScores, StageResult, StageTimeouts, Synthesis, Verdict, VerdictType,
};

/// Crate version, for inclusion in transcripts or diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maps a completed deliberation to the verify-mode exit code of §6:
/// `0 = PASS, 1 = FAIL, 2 = UNCLEAR, 3 = engine error`. The CLI
/// collaborator owns actually exiting the process; the engine only owns
/// this classification so every driver agrees on it.
pub fn verify_exit_code(result: &std::result::Result<ResultEnvelope, ErrorEnvelope>) -> i32 {
    match result {
        Ok(envelope) => match envelope.verdict {
            Some(Verdict::Pass) => 0,
            Some(Verdict::Fail) => 1,
            Some(Verdict::Unclear) | None => 2,
        },
        Err(_) => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn envelope(verdict: Option<Verdict>) -> ResultEnvelope {
        let now = Utc::now();
        ResultEnvelope {
            request_id: "req-1".into(),
            mode: "consensus",
            final_response: "answer".into(),
            verdict,
            confidence: Some(0.8),
            council_models: vec!["m1".into(), "m2".into()],
            chairman: "mc".into(),
            stage1_count: 2,
            stage2_count: 2,
            aggregate: vec![],
            started_at: now,
            ended_at: now,
            stage1_details: None,
            stage2_details: None,
        }
    }

    #[test]
    fn maps_pass_fail_unclear_and_error_to_the_spec_exit_codes() {
        assert_eq!(verify_exit_code(&Ok(envelope(Some(Verdict::Pass)))), 0);
        assert_eq!(verify_exit_code(&Ok(envelope(Some(Verdict::Fail)))), 1);
        assert_eq!(verify_exit_code(&Ok(envelope(Some(Verdict::Unclear)))), 2);
        assert_eq!(verify_exit_code(&Ok(envelope(None))), 2);

        let err = ErrorEnvelope {
            error: "InsufficientResponders",
            request_id: "req-2".into(),
            partial_transcript_path: None,
        };
        assert_eq!(verify_exit_code(&Err(err)), 3);
    }
}
