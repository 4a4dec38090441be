//! Optional style normalizer (C5): rewrites each successful Stage 1 text
//! through the configured normalizer model before it reaches Stage 2.
//! Per the Open Question resolution in §9, normalized text is used only
//! for the Stage 2 peer-review prompt — Stage 3's chairman always sees
//! the raw Stage 1 text.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::model_caller::ModelCaller;
use crate::types::{ModelId, StageResult};

const NORMALIZER_SYSTEM_PROMPT: &str = "Rewrite the following response in a neutral, third-person style. Remove first-person preambles such as \"I think\" or \"In my opinion\". Preserve all factual and semantic content exactly; do not add or remove claims.";

/// Re-dispatches every successful Stage 1 response to `normalizer_model`.
/// A normalization failure falls back to the original text (non-fatal,
/// per §4.5) and is logged.
pub async fn run(
    stage1: &[StageResult<String>],
    normalizer_model: &ModelId,
    caller: Arc<dyn ModelCaller>,
    timeout: Duration,
) -> Vec<(ModelId, String)> {
    let mut normalized = Vec::with_capacity(stage1.len());

    for result in stage1 {
        let Some(original) = result.value.as_ref() else {
            continue;
        };

        let prompt = format!("{NORMALIZER_SYSTEM_PROMPT}\n\nResponse:\n{original}");
        match caller.call(normalizer_model, &prompt, timeout).await {
            Ok(reply) => normalized.push((result.model.clone(), reply.text)),
            Err(err) => {
                warn!(
                    model = %result.model,
                    error = ?err.kind,
                    "style normalization failed, falling back to raw text"
                );
                normalized.push((result.model.clone(), original.clone()));
            }
        }
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_caller::{ModelCallError, ModelReply};
    use crate::types::ErrorKind;
    use async_trait::async_trait;
    use chrono::Utc;

    struct FlakyNormalizer;

    #[async_trait]
    impl ModelCaller for FlakyNormalizer {
        async fn call(
            &self,
            model: &str,
            _prompt: &str,
            _timeout: Duration,
        ) -> Result<ModelReply, ModelCallError> {
            if model == "fail-normalizer" {
                Err(ModelCallError::new(ErrorKind::Network, "boom"))
            } else {
                Ok(ModelReply {
                    text: "normalized".into(),
                    latency_ms: 1,
                })
            }
        }
    }

    #[tokio::test]
    async fn falls_back_to_raw_text_on_failure() {
        let now = Utc::now();
        let stage1 = vec![StageResult::ok(
            "m1".to_string(),
            "raw text".to_string(),
            1,
            now,
            now,
        )];

        let out = run(
            &stage1,
            &"fail-normalizer".to_string(),
            Arc::new(FlakyNormalizer),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(out[0].1, "raw text");
    }

    #[tokio::test]
    async fn uses_normalized_text_on_success() {
        let now = Utc::now();
        let stage1 = vec![StageResult::ok(
            "m1".to_string(),
            "raw text".to_string(),
            1,
            now,
            now,
        )];

        let out = run(
            &stage1,
            &"normalizer".to_string(),
            Arc::new(FlakyNormalizer),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(out[0].1, "normalized");
    }
}
