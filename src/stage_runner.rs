//! Generic concurrent fan-out used by every pipeline stage: call a set of
//! models in parallel, enforce a per-call timeout, and return one
//! `StageResult` per model in the original council order regardless of
//! completion order. A slow or failing model never holds up, nor cancels,
//! its peers.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;

use crate::cancellation::CancellationToken;
use crate::types::{ErrorKind, ModelId, StageResult};

/// Runs `call` against every model in `models` concurrently, each bounded
/// by `timeout`. `call` receives the model id and must resolve to either
/// the parsed stage value or the `ErrorKind` to record.
pub struct StageRunner;

impl StageRunner {
    pub async fn run<T, F, Fut>(
        models: &[ModelId],
        timeout: Duration,
        cancellation: &CancellationToken,
        call: F,
    ) -> Vec<StageResult<T>>
    where
        T: Send + 'static,
        F: Fn(ModelId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ErrorKind>> + Send + 'static,
    {
        let call = Arc::new(call);
        let tasks = models.iter().cloned().map(|model| {
            let call = Arc::clone(&call);
            let cancellation = cancellation.clone();
            async move {
                let started_at = Utc::now();
                let start = Instant::now();

                if cancellation.is_cancelled() {
                    let ended_at = Utc::now();
                    return StageResult::err(
                        model,
                        ErrorKind::Network,
                        start.elapsed().as_millis() as u64,
                        started_at,
                        ended_at,
                    );
                }

                let outcome = tokio::time::timeout(timeout, call(model.clone())).await;
                let ended_at = Utc::now();
                let latency_ms = start.elapsed().as_millis() as u64;

                match outcome {
                    Ok(Ok(value)) => StageResult::ok(model, value, latency_ms, started_at, ended_at),
                    Ok(Err(kind)) => StageResult::err(model, kind, latency_ms, started_at, ended_at),
                    Err(_elapsed) => {
                        StageResult::err(model, ErrorKind::Timeout, latency_ms, started_at, ended_at)
                    }
                }
            }
        });

        join_all(tasks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preserves_council_order_regardless_of_completion_order() {
        let models: Vec<ModelId> = vec!["slow".into(), "fast".into()];
        let cancellation = CancellationToken::new();

        let results = StageRunner::run(&models, Duration::from_millis(200), &cancellation, |model| async move {
            if model == "slow" {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Ok::<String, ErrorKind>(format!("reply from {model}"))
        })
        .await;

        assert_eq!(results[0].model, "slow");
        assert_eq!(results[1].model, "fast");
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn records_timeout_without_cancelling_peers() {
        let models: Vec<ModelId> = vec!["timeout".into(), "ok".into()];
        let cancellation = CancellationToken::new();

        let results = StageRunner::run(&models, Duration::from_millis(10), &cancellation, |model| async move {
            if model == "timeout" {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok::<String, ErrorKind>(format!("reply from {model}"))
        })
        .await;

        assert_eq!(results[0].error, Some(ErrorKind::Timeout));
        assert!(results[1].is_ok());
    }
}
