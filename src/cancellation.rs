//! Request-scoped cancellation, adapted from
//! `hive_ai::consensus::cancellation`: an `AtomicBool` flag paired with a
//! broadcast channel so every task racing the deliberation can both poll
//! and await cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::CouncilError;

/// Why a deliberation was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationReason {
    UserRequested,
    Timeout,
    Error(String),
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserRequested => write!(f, "user requested"),
            Self::Timeout => write!(f, "timeout"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// A cheaply-cloneable handle shared across every task spawned for one
/// deliberation request.
#[derive(Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    sender: broadcast::Sender<CancellationReason>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(8);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            sender,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Mark the token cancelled and notify every subscriber. Idempotent.
    pub fn cancel(&self, reason: CancellationReason) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            let _ = self.sender.send(reason);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CancellationReason> {
        self.sender.subscribe()
    }

    /// Returns an error if already cancelled, otherwise `Ok(())`.
    pub fn throw_if_cancelled(&self) -> Result<(), CouncilError> {
        if self.is_cancelled() {
            Err(CouncilError::Cancelled {
                reason: "request was cancelled".into(),
            })
        } else {
            Ok(())
        }
    }

    /// Await until this token is cancelled, blocking forever if it never is.
    pub async fn cancelled(&self) -> CancellationReason {
        let mut rx = self.subscribe();
        if self.is_cancelled() {
            return CancellationReason::UserRequested;
        }
        match rx.recv().await {
            Ok(reason) => reason,
            Err(_) => CancellationReason::UserRequested,
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
