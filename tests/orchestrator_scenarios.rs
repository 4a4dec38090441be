//! End-to-end deliberation scenarios against the full `Orchestrator`,
//! covering the happy path, partial timeouts, reviewer retry recovery,
//! verdict classification, and the insufficient-responders fatal path.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;

use hive_council::{
    CancellationToken, CouncilConfig, EventBus, ModelCallError, ModelCaller, ModelReply,
    Mode, Orchestrator, Query, StageTimeouts, Verdict, VerdictType,
};

/// A scripted reply queue per model: each call to a given model pops the
/// next entry, repeating the last entry once the queue is drained.
#[derive(Clone)]
enum Scripted {
    Text(String),
    Timeout,
    Fail,
}

struct ScriptedCaller {
    queues: Mutex<HashMap<String, VecDeque<Scripted>>>,
}

impl ScriptedCaller {
    fn new(scripts: Vec<(&str, Vec<Scripted>)>) -> Self {
        let queues = scripts
            .into_iter()
            .map(|(model, entries)| (model.to_string(), entries.into_iter().collect()))
            .collect();
        Self {
            queues: Mutex::new(queues),
        }
    }
}

#[async_trait]
impl ModelCaller for ScriptedCaller {
    async fn call(
        &self,
        model: &str,
        _prompt: &str,
        timeout: Duration,
    ) -> Result<ModelReply, ModelCallError> {
        let next = {
            let mut queues = self.queues.lock().unwrap();
            let queue = queues.entry(model.to_string()).or_default();
            queue.pop_front()
        };

        match next {
            Some(Scripted::Text(text)) => Ok(ModelReply {
                text,
                latency_ms: 5,
            }),
            Some(Scripted::Fail) => Err(ModelCallError::network("upstream failure")),
            Some(Scripted::Timeout) | None => {
                tokio::time::sleep(timeout + Duration::from_millis(50)).await;
                Err(ModelCallError::timeout("no script left"))
            }
        }
    }
}

fn fast_config(models: &[&str], chairman: &str, transcript_root: std::path::PathBuf) -> CouncilConfig {
    CouncilConfig {
        council_models: models.iter().map(|s| s.to_string()).collect(),
        chairman_model: chairman.to_string(),
        normalizer_model: None,
        exclude_self_votes: true,
        style_normalization: false,
        max_reviewers: None,
        per_stage_timeout_ms: StageTimeouts {
            s1: 200,
            s2: 200,
            s3: 200,
        },
        confidence_weights: Default::default(),
        transcript_root,
    }
}

fn base_query() -> Query {
    Query {
        prompt: "What is the capital of France?".into(),
        mode: Mode::Consensus,
        verdict_type: VerdictType::None,
        confidence_threshold: 0.7,
        include_details: true,
    }
}

fn ranking_json(best: char, mid: char, worst: char) -> String {
    format!(
        "{{\"ranking\":[\"{best}\",\"{mid}\",\"{worst}\"],\"scores\":{{\"{best}\":{{\"accuracy\":9,\"relevance\":9,\"completeness\":8,\"conciseness\":8,\"clarity\":9}},\"{mid}\":{{\"accuracy\":7,\"relevance\":7,\"completeness\":7,\"conciseness\":7,\"clarity\":7}},\"{worst}\":{{\"accuracy\":4,\"relevance\":4,\"completeness\":4,\"conciseness\":4,\"clarity\":4}}}}}}"
    )
}

fn two_way_ranking_json(best: char, worst: char) -> String {
    format!(
        "{{\"ranking\":[\"{best}\",\"{worst}\"],\"scores\":{{\"{best}\":{{\"accuracy\":9,\"relevance\":9,\"completeness\":8,\"conciseness\":8,\"clarity\":9}},\"{worst}\":{{\"accuracy\":5,\"relevance\":5,\"completeness\":5,\"conciseness\":5,\"clarity\":5}}}}}}"
    )
}

/// S1 — happy path: three responders, three reviewers, chairman
/// synthesizes. The exact label permutation is randomized per request, so
/// the test only asserts on structural properties that must hold
/// regardless of which letters landed on which model.
#[test_log::test(tokio::test)]
async fn s1_happy_path_produces_a_full_aggregate_and_result() {
    let dir = tempdir().unwrap();
    let config = fast_config(&["m1", "m2", "m3"], "mc", dir.path().to_path_buf());

    // Every model is both a responder and, when called again as a
    // reviewer, returns some consistent three-way ranking. Since labels are
    // randomized we can't pin an exact letter-to-model script, so every
    // reviewer call returns the same relative ordering pattern; the
    // pipeline only needs *a* valid Ranking to aggregate over.
    let caller = ScriptedCaller::new(vec![
        ("m1", vec![Scripted::Text("answer one".into()), Scripted::Text(ranking_json('A', 'B', 'C'))]),
        ("m2", vec![Scripted::Text("answer two".into()), Scripted::Text(ranking_json('B', 'A', 'C'))]),
        ("m3", vec![Scripted::Text("answer three".into()), Scripted::Text(ranking_json('C', 'A', 'B'))]),
        ("mc", vec![Scripted::Text("The capital of France is Paris.".into())]),
    ]);

    let orchestrator = Orchestrator::new(Arc::new(caller), EventBus::new());
    let result = orchestrator
        .deliberate(base_query(), config, CancellationToken::new())
        .await
        .expect("deliberation should succeed");

    assert_eq!(result.stage1_count, 3);
    assert!(result.aggregate.len() <= 3);
    assert!(result.final_response.contains("Paris"));
    assert!(tokio::fs::metadata(dir.path()).await.is_ok());
}

/// S2 — one model times out in Stage 1; the stage still succeeds with the
/// remaining two and Stage 2/3 proceed over them.
#[tokio::test]
async fn s2_one_model_timeout_still_yields_a_result() {
    let dir = tempdir().unwrap();
    let config = fast_config(&["m1", "m2", "m3"], "mc", dir.path().to_path_buf());

    let caller = ScriptedCaller::new(vec![
        ("m1", vec![Scripted::Text("answer one".into()), Scripted::Text(two_way_ranking_json('A', 'B'))]),
        ("m2", vec![Scripted::Timeout]),
        ("m3", vec![Scripted::Text("answer three".into()), Scripted::Text(two_way_ranking_json('B', 'A'))]),
        ("mc", vec![Scripted::Text("Synthesized answer.".into())]),
    ]);

    let orchestrator = Orchestrator::new(Arc::new(caller), EventBus::new());
    let result = orchestrator
        .deliberate(base_query(), config, CancellationToken::new())
        .await
        .expect("two successful responders is enough");

    assert_eq!(result.stage1_count, 3);
    let stage1_details = result.stage1_details.as_ref().unwrap();
    let timed_out = stage1_details.iter().find(|r| r.model == "m2").unwrap();
    assert!(timed_out.error.is_some());
}

/// S6 — only one model responds in Stage 1: fatal `InsufficientResponders`,
/// no Stage 2/3 files written.
#[tokio::test]
async fn s6_insufficient_responders_is_fatal() {
    let dir = tempdir().unwrap();
    let config = fast_config(&["m1", "m2"], "mc", dir.path().to_path_buf());

    let caller = ScriptedCaller::new(vec![
        ("m1", vec![Scripted::Text("only answer".into())]),
        ("m2", vec![Scripted::Timeout]),
    ]);

    let orchestrator = Orchestrator::new(Arc::new(caller), EventBus::new());
    let err = orchestrator
        .deliberate(base_query(), config, CancellationToken::new())
        .await
        .expect_err("fewer than 2 responders must be fatal");

    assert_eq!(err.error, "InsufficientResponders");
    assert!(err.partial_transcript_path.is_some());

    let transcript_dir = err.partial_transcript_path.unwrap();
    assert!(tokio::fs::metadata(format!("{transcript_dir}/stage1.json")).await.is_ok());
    assert!(tokio::fs::metadata(format!("{transcript_dir}/stage2.json")).await.is_err());
}

/// S4/S5 — verdict mode end to end: an APPROVED verdict with a high
/// agreement across two identical reviewer rankings should clear a modest
/// threshold and classify as `Pass`.
#[tokio::test]
async fn verdict_mode_approved_with_strong_agreement_passes() {
    let dir = tempdir().unwrap();
    let config = fast_config(&["m1", "m2"], "mc", dir.path().to_path_buf());

    let caller = ScriptedCaller::new(vec![
        (
            "m1",
            vec![
                Scripted::Text("yes, this works".into()),
                Scripted::Text(
                    "{\"ranking\":[\"A\",\"B\"],\"scores\":{\"A\":{\"accuracy\":9,\"relevance\":9,\"completeness\":9,\"conciseness\":9,\"clarity\":9},\"B\":{\"accuracy\":8,\"relevance\":8,\"completeness\":8,\"conciseness\":8,\"clarity\":8}}}".into(),
                ),
            ],
        ),
        (
            "m2",
            vec![
                Scripted::Text("agreed, this works".into()),
                Scripted::Text(
                    "{\"ranking\":[\"A\",\"B\"],\"scores\":{\"A\":{\"accuracy\":9,\"relevance\":9,\"completeness\":9,\"conciseness\":9,\"clarity\":9},\"B\":{\"accuracy\":8,\"relevance\":8,\"completeness\":8,\"conciseness\":8,\"clarity\":8}}}".into(),
                ),
            ],
        ),
        (
            "mc",
            vec![Scripted::Text(
                "The change looks correct.\nFINAL_VERDICT: APPROVED".into(),
            )],
        ),
    ]);

    let mut query = base_query();
    query.verdict_type = VerdictType::Binary;
    query.confidence_threshold = 0.5;

    let orchestrator = Orchestrator::new(Arc::new(caller), EventBus::new());
    let result = orchestrator
        .deliberate(query, config, CancellationToken::new())
        .await
        .expect("deliberation should succeed");

    assert_eq!(result.verdict, Some(Verdict::Pass));
    assert!(result.confidence.unwrap() >= 0.5);
}

/// A chairman that always fails is fatal (`SynthesisFailed`) even though
/// Stage 1 and Stage 2 both succeeded.
#[tokio::test]
async fn chairman_failure_after_retry_is_fatal() {
    let dir = tempdir().unwrap();
    let config = fast_config(&["m1", "m2"], "mc", dir.path().to_path_buf());

    let caller = ScriptedCaller::new(vec![
        ("m1", vec![Scripted::Text("answer one".into()), Scripted::Text(two_way_ranking_json('A', 'B'))]),
        ("m2", vec![Scripted::Text("answer two".into()), Scripted::Text(two_way_ranking_json('B', 'A'))]),
        ("mc", vec![Scripted::Fail, Scripted::Fail]),
    ]);

    let orchestrator = Orchestrator::new(Arc::new(caller), EventBus::new());
    let err = orchestrator
        .deliberate(base_query(), config, CancellationToken::new())
        .await
        .expect_err("chairman failing twice must be fatal");

    assert_eq!(err.error, "SynthesisFailed");
}
