//! Stage 3 — Synthesis. The chairman sees every Stage 1 response with
//! full attribution (no longer anonymized) plus the Aggregate table, and
//! produces the final answer — and, in verdict mode, a structured
//! PASS/FAIL line extracted from the tail of its text.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::CouncilError;
use crate::model_caller::ModelCaller;
use crate::types::{Aggregate, ExtractedVerdictRaw, Mode, ModelId, Query, StageResult, VerdictType};

const RETRY_BACKOFF_BASE_MS: u64 = 500;

fn mode_directive(mode: Mode, verdict_type: VerdictType) -> String {
    let mut directive = match mode {
        Mode::Consensus => {
            "Produce the single best synthesized answer, drawing on the strongest points of each response.".to_string()
        }
        Mode::Debate => {
            "Structure your answer as three sections: Points of agreement / Key disagreements / Recommended resolution.".to_string()
        }
    };

    if verdict_type == VerdictType::Binary {
        directive.push_str("\n\nOn the last line, output exactly: `FINAL_VERDICT: APPROVED` or `FINAL_VERDICT: REJECTED`.");
    }

    directive
}

fn build_prompt(
    query: &Query,
    stage1: &[StageResult<String>],
    aggregate: &[Aggregate],
) -> String {
    let mut body = String::new();
    body.push_str(&format!("Question:\n{}\n\n", query.prompt));
    body.push_str("Council responses:\n");
    for result in stage1 {
        if let Some(text) = &result.value {
            body.push_str(&format!("--- {} ---\n{}\n\n", result.model, text));
        }
    }

    if !aggregate.is_empty() {
        body.push_str("Peer review standings (Borda points, best first):\n");
        for row in aggregate {
            body.push_str(&format!(
                "- {}: {} points over {} reviewer(s)\n",
                row.model, row.borda_points, row.reviewer_count
            ));
        }
        body.push('\n');
    }

    body.push_str(&mode_directive(query.mode, query.verdict_type));
    body
}

/// Scans from the end of `text` for a line matching
/// `^FINAL_VERDICT:\s*(APPROVED|REJECTED)\s*$`.
pub fn extract_verdict_raw(text: &str) -> Option<ExtractedVerdictRaw> {
    for line in text.lines().rev() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("FINAL_VERDICT:") {
            return match rest.trim() {
                "APPROVED" => Some(ExtractedVerdictRaw::Approved),
                "REJECTED" => Some(ExtractedVerdictRaw::Rejected),
                _ => None,
            };
        }
    }
    None
}

/// Dispatches the synthesis prompt to the chairman, retrying once with
/// exponential backoff on failure before surfacing `SynthesisFailed`
/// (§4.8).
pub async fn run(
    query: &Query,
    chairman: &ModelId,
    stage1: &[StageResult<String>],
    aggregate: &[Aggregate],
    caller: Arc<dyn ModelCaller>,
    timeout: Duration,
) -> Result<(String, u64), CouncilError> {
    let prompt = build_prompt(query, stage1, aggregate);

    match caller.call(chairman, &prompt, timeout).await {
        Ok(reply) => return Ok((reply.text, reply.latency_ms)),
        Err(first_err) => {
            sleep(Duration::from_millis(RETRY_BACKOFF_BASE_MS)).await;
            match caller.call(chairman, &prompt, timeout).await {
                Ok(reply) => Ok((reply.text, reply.latency_ms)),
                Err(second_err) => Err(CouncilError::SynthesisFailed {
                    chairman: chairman.clone(),
                    message: format!(
                        "first attempt: {:?}; retry: {:?}",
                        first_err.message, second_err.message
                    ),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_approved_from_tail_line() {
        let text = "Some reasoning here.\n\nFINAL_VERDICT: APPROVED";
        assert_eq!(
            extract_verdict_raw(text),
            Some(ExtractedVerdictRaw::Approved)
        );
    }

    #[test]
    fn returns_none_when_missing() {
        let text = "No verdict line at all.";
        assert_eq!(extract_verdict_raw(text), None);
    }

    #[test]
    fn ignores_malformed_verdict_line() {
        let text = "FINAL_VERDICT: MAYBE";
        assert_eq!(extract_verdict_raw(text), None);
    }
}
