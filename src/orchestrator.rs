//! Orchestrator (C12): the top-level state machine tying every stage
//! together for one request, emitting lifecycle events at each
//! transition and writing the transcript as it goes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::aggregator;
use crate::cancellation::CancellationToken;
use crate::confidence::ConfidenceScorer;
use crate::error::CouncilError;
use crate::events::{Event, EventBus, EventKind};
use crate::labeler::AnonymizationLabeler;
use crate::model_caller::ModelCaller;
use crate::stages::{normalize, peer_rank, respond, synthesize};
use crate::transcript::TranscriptWriter;
use crate::types::{
    CouncilConfig, ExtractedVerdictRaw, ModelId, Query, Ranking, StageResult, Synthesis, Verdict,
};

/// Current state of one in-flight request, mirroring the state diagram
/// of §4.12.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Accepted,
    Stage1,
    Normalizing,
    Stage2,
    Aggregating,
    Stage3,
    Scoring,
    Writing,
    Done,
    Failed(&'static str),
}

/// The final user-facing envelope, matching the stable `result.json`
/// schema of §6.
#[derive(Debug, Clone, Serialize)]
pub struct ResultEnvelope {
    pub request_id: String,
    pub mode: &'static str,
    pub final_response: String,
    pub verdict: Option<Verdict>,
    pub confidence: Option<f64>,
    pub council_models: Vec<ModelId>,
    pub chairman: ModelId,
    pub stage1_count: usize,
    pub stage2_count: usize,
    pub aggregate: Vec<AggregateSummary>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage1_details: Option<Vec<StageResult<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage2_details: Option<Vec<StageResult<Ranking>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateSummary {
    pub model: ModelId,
    pub borda_points: i64,
    pub mean_rubric: crate::types::RubricScores,
    pub reviewer_count: usize,
}

/// Error surface returned to the caller on a fatal failure, per §7.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: &'static str,
    pub request_id: String,
    pub partial_transcript_path: Option<String>,
}

pub struct Orchestrator {
    caller: Arc<dyn ModelCaller>,
    events: EventBus,
}

impl Orchestrator {
    pub fn new(caller: Arc<dyn ModelCaller>, events: EventBus) -> Self {
        Self { caller, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Runs one deliberation end to end: `Accepted → Stage1 →
    /// [Normalizing] → Stage2 → Aggregating → Stage3 → Scoring → Writing
    /// → Done`, with cancellation reachable from any state.
    #[instrument(skip(self, query, config, cancellation), fields(request_id))]
    pub async fn deliberate(
        &self,
        query: Query,
        config: CouncilConfig,
        cancellation: CancellationToken,
    ) -> Result<ResultEnvelope, ErrorEnvelope> {
        let request_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("request_id", &request_id.as_str());

        let started_at = chrono::Utc::now();
        let state = State::Accepted;
        tracing::debug!(?state, "request accepted");

        if let Err(message) = config.validate().and_then(|_| query.validate()) {
            let err = CouncilError::config_invalid(message);
            return Err(self.fail(&request_id, None, err).await);
        }

        self.emit(
            EventKind::DeliberationStart,
            &request_id,
            json!({"mode": mode_str(query.mode)}),
        );

        let writer = match TranscriptWriter::create(&config.transcript_root, &short_id(&request_id)).await {
            Ok(w) => w,
            Err(e) => return Err(self.fail(&request_id, None, e).await),
        };

        if let Err(e) = writer
            .write_request(&json!({
                "request_id": request_id,
                "query": &query,
                "config": &config,
            }))
            .await
        {
            warn!(error = ?e, "failed to write request.json");
        }

        let mut state = State::Stage1;
        tracing::debug!(?state, "entering stage 1");
        let stage1_timeout = Duration::from_millis(config.per_stage_timeout_ms.s1 / 2);
        let stage1 = respond::run(
            &query,
            &config.council_models,
            Arc::clone(&self.caller),
            stage1_timeout,
            &cancellation,
        )
        .await;

        let _ = writer.write_stage1(&stage1).await;
        self.emit(
            EventKind::Stage1Complete,
            &request_id,
            json!({"succeeded": respond::succeeded_count(&stage1), "attempted": stage1.len()}),
        );

        let succeeded = respond::succeeded_count(&stage1);
        if succeeded < 2 {
            let err = CouncilError::insufficient_responders(succeeded, stage1.len());
            state = State::Failed(err.kind_str());
            tracing::debug!(?state, "deliberation failed");
            return Err(self
                .fail(&request_id, Some(writer.dir().display().to_string()), err)
                .await);
        }

        let responders: Vec<ModelId> = stage1
            .iter()
            .filter(|r| r.is_ok())
            .map(|r| r.model.clone())
            .collect();

        let raw_texts: HashMap<ModelId, String> = stage1
            .iter()
            .filter_map(|r| r.value.as_ref().map(|v| (r.model.clone(), v.clone())))
            .collect();

        // Optional style normalization (Stage 2 inputs only; Stage 3 always
        // sees raw text, per the resolved Open Question in §9).
        let stage2_texts = if config.style_normalization {
            state = State::Normalizing;
            tracing::debug!(?state, "entering style normalization");
            if let Some(normalizer) = &config.normalizer_model {
                let normalized = normalize::run(
                    &stage1,
                    normalizer,
                    Arc::clone(&self.caller),
                    stage1_timeout,
                )
                .await;
                normalized.into_iter().collect::<HashMap<_, _>>()
            } else {
                raw_texts.clone()
            }
        } else {
            raw_texts.clone()
        };

        let label_map = AnonymizationLabeler::label(&responders);

        state = State::Stage2;
        tracing::debug!(?state, "entering stage 2");
        let stage2_timeout = Duration::from_millis(config.per_stage_timeout_ms.s2 / 2);
        let stage2 = peer_rank::run(
            &query,
            &responders,
            &stage2_texts,
            &label_map,
            config.max_reviewers,
            Arc::clone(&self.caller),
            stage2_timeout,
            &cancellation,
        )
        .await;

        let valid_rankings: Vec<Ranking> = stage2.iter().filter_map(|r| r.value.clone()).collect();

        for result in &stage2 {
            if result.is_ok() {
                self.emit(
                    EventKind::VoteCast,
                    &request_id,
                    json!({"reviewer": result.model}),
                );
            }
        }

        state = State::Aggregating;
        tracing::debug!(?state, "aggregating rankings");
        let aggregate = aggregator::aggregate(&responders, &valid_rankings, &label_map, config.exclude_self_votes);

        // §4.5: the transcript records both raw and normalized text when
        // normalization ran, so a reviewer of the transcript can see what
        // Stage 2 actually read.
        let normalized_field = if config.style_normalization {
            json!(&stage2_texts)
        } else {
            serde_json::Value::Null
        };
        let _ = writer
            .write_stage2(&json!({
                "results": &stage2,
                "aggregate": &aggregate,
                "raw_texts": &raw_texts,
                "normalized_texts": normalized_field,
            }))
            .await;
        self.emit(
            EventKind::Stage2Complete,
            &request_id,
            json!({"valid_rankings": valid_rankings.len()}),
        );

        state = State::Stage3;
        tracing::debug!(?state, "entering stage 3");
        let stage3_timeout = Duration::from_millis(config.per_stage_timeout_ms.s3 / 2);
        let synthesis_result = synthesize::run(
            &query,
            &config.chairman_model,
            &stage1,
            &aggregate,
            Arc::clone(&self.caller),
            stage3_timeout,
        )
        .await;

        let (chairman_text, _latency_ms) = match synthesis_result {
            Ok(pair) => pair,
            Err(e) => {
                state = State::Failed(e.kind_str());
                tracing::debug!(?state, "deliberation failed");
                return Err(self
                    .fail(&request_id, Some(writer.dir().display().to_string()), e)
                    .await);
            }
        };

        state = State::Scoring;
        tracing::debug!(?state, "scoring confidence");
        let confidence = ConfidenceScorer::score(&valid_rankings, &aggregate, config.confidence_weights);

        let extracted_verdict_raw = if query.verdict_type == crate::types::VerdictType::Binary {
            synthesize::extract_verdict_raw(&chairman_text)
        } else {
            None
        };

        let (verdict, confidence) = map_verdict(query.verdict_type, extracted_verdict_raw, confidence, query.confidence_threshold);

        let synthesis = Synthesis {
            chairman: config.chairman_model.clone(),
            text: chairman_text.clone(),
            verdict,
            confidence,
            extracted_verdict_raw,
        };

        let _ = writer.write_stage3(&json!({"chairman_text": &chairman_text, "synthesis": &synthesis})).await;
        self.emit(
            EventKind::Stage3Complete,
            &request_id,
            json!({"verdict": verdict}),
        );

        let ended_at = chrono::Utc::now();

        let aggregate_summary: Vec<AggregateSummary> = aggregate
            .iter()
            .map(|row| AggregateSummary {
                model: row.model.clone(),
                borda_points: row.borda_points,
                mean_rubric: row.mean_rubric,
                reviewer_count: row.reviewer_count,
            })
            .collect();

        let envelope = ResultEnvelope {
            request_id: request_id.clone(),
            mode: mode_str(query.mode),
            final_response: chairman_text,
            verdict,
            confidence,
            council_models: config.council_models.clone(),
            chairman: config.chairman_model.clone(),
            stage1_count: stage1.len(),
            stage2_count: stage2.len(),
            aggregate: aggregate_summary,
            started_at,
            ended_at,
            stage1_details: if query.include_details { Some(stage1.clone()) } else { None },
            stage2_details: if query.include_details { Some(stage2.clone()) } else { None },
        };

        state = State::Writing;
        tracing::debug!(?state, "writing transcript");
        if let Err(e) = writer.write_result(&envelope).await {
            warn!(error = ?e, "failed to write result.json");
            self.emit(EventKind::Error, &request_id, json!({"kind": e.kind_str()}));
        }

        state = State::Done;
        self.emit(EventKind::Complete, &request_id, json!({}));
        info!(request_id = %request_id, ?state, "deliberation complete");

        Ok(envelope)
    }

    async fn fail(
        &self,
        request_id: &str,
        partial_transcript_path: Option<String>,
        err: CouncilError,
    ) -> ErrorEnvelope {
        self.emit(EventKind::Error, request_id, json!({"kind": err.kind_str()}));
        warn!(request_id = %request_id, error = ?err, "deliberation failed");
        ErrorEnvelope {
            error: err.kind_str(),
            request_id: request_id.to_string(),
            partial_transcript_path,
        }
    }

    fn emit(&self, kind: EventKind, request_id: &str, data: serde_json::Value) {
        self.events.publish(Event::new(kind, request_id, data));
    }
}

fn mode_str(mode: crate::types::Mode) -> &'static str {
    match mode {
        crate::types::Mode::Consensus => "consensus",
        crate::types::Mode::Debate => "debate",
    }
}

fn short_id(request_id: &str) -> String {
    request_id.chars().filter(|c| *c != '-').take(8).collect()
}

/// Maps the chairman's raw verdict text to a [`Verdict`] and final
/// confidence, per the table in §4.9.
fn map_verdict(
    verdict_type: crate::types::VerdictType,
    raw: Option<ExtractedVerdictRaw>,
    confidence: f64,
    threshold: f64,
) -> (Option<Verdict>, Option<f64>) {
    if verdict_type != crate::types::VerdictType::Binary {
        return (None, Some(confidence));
    }

    match raw {
        Some(ExtractedVerdictRaw::Approved) if confidence >= threshold => {
            (Some(Verdict::Pass), Some(confidence))
        }
        Some(ExtractedVerdictRaw::Approved) => (Some(Verdict::Unclear), Some(confidence)),
        Some(ExtractedVerdictRaw::Rejected) => (Some(Verdict::Fail), Some(confidence)),
        None => (Some(Verdict::Unclear), Some(0.50)),
    }
}
