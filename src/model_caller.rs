//! The boundary trait between the orchestrator and whatever model gateway
//! the caller wires in. The engine never constructs HTTP clients itself —
//! it only calls through this trait, the way `LazyModule` in
//! `hive_ai::startup::fast_boot` lets the boot sequence stay agnostic of
//! what each module actually does to initialize.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::ErrorKind;

/// A single model's reply plus the latency observed by the caller.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub latency_ms: u64,
}

/// Failure returned by a `ModelCaller` implementation for one call.
#[derive(Debug, Clone)]
pub struct ModelCallError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ModelCallError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }
}

/// The single point of contact with model endpoints. Implementations own
/// retries below the call level (e.g. connection retries); the stage
/// runner owns the timeout-and-drop policy above it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelCaller: Send + Sync {
    /// Issue one prompt to `model` and await its reply, honouring
    /// `timeout` as a soft budget — implementations are expected to race
    /// their own I/O against it, but the stage runner enforces the hard
    /// cutoff independently.
    async fn call(
        &self,
        model: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<ModelReply, ModelCallError>;
}
