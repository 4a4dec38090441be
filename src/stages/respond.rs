//! Stage 1 — Independent Responses. Every council model sees the same
//! plain prompt and answers without knowledge of its peers.

use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::model_caller::ModelCaller;
use crate::stage_runner::StageRunner;
use crate::types::{ModelId, Query, StageResult};

const SYSTEM_PROMPT: &str = "You are one member of a council of models. Answer the user's question directly and completely, in your own voice.";

fn build_prompt(query: &Query) -> String {
    format!("{SYSTEM_PROMPT}\n\nQuestion:\n{}", query.prompt)
}

/// Dispatches `query` to every model in `council_models` concurrently.
/// Succeeds (per §4.4) as long as the caller checks the returned count of
/// `is_ok()` results against the ≥2 threshold afterwards.
pub async fn run(
    query: &Query,
    council_models: &[ModelId],
    caller: Arc<dyn ModelCaller>,
    timeout: Duration,
    cancellation: &CancellationToken,
) -> Vec<StageResult<String>> {
    let prompt = build_prompt(query);

    StageRunner::run(council_models, timeout, cancellation, move |model| {
        let caller = Arc::clone(&caller);
        let prompt = prompt.clone();
        async move {
            caller
                .call(&model, &prompt, timeout)
                .await
                .map(|reply| reply.text)
                .map_err(|e| e.kind)
        }
    })
    .await
}

pub fn succeeded_count<T>(results: &[StageResult<T>]) -> usize {
    results.iter().filter(|r| r.is_ok()).count()
}
