//! EventBus (C11): in-process pub/sub for deliberation lifecycle events,
//! generalized from the single-consumer
//! `consensus::streaming::StreamingCallbacks` trait into a many-subscriber
//! broadcast model so SSE and webhook collaborators can both listen.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_BUFFER: usize = 64;

/// The seven event kinds named in §4.11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[serde(rename = "council.deliberation_start")]
    DeliberationStart,
    #[serde(rename = "council.stage1.complete")]
    Stage1Complete,
    #[serde(rename = "model.vote_cast")]
    VoteCast,
    #[serde(rename = "council.stage2.complete")]
    Stage2Complete,
    #[serde(rename = "council.stage3.complete")]
    Stage3Complete,
    #[serde(rename = "council.complete")]
    Complete,
    #[serde(rename = "council.error")]
    Error,
}

/// The event envelope defined in §6: kind, request id, timestamp, and a
/// kind-specific JSON payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event: EventKind,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl Event {
    pub fn new(event: EventKind, request_id: impl Into<String>, data: Value) -> Self {
        Self {
            event,
            request_id: request_id.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Publishes events for one request to every subscriber in emission
/// order. Subscribers that fall behind a bounded buffer are dropped with
/// a logged `SubscriberLagged` diagnostic rather than slowing the
/// publisher down.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publishes `event`. Non-blocking: a subscriber with no receivers
    /// (or a full buffer that has already lagged and will re-sync on its
    /// next `recv`) never slows this call down.
    pub fn publish(&self, event: Event) {
        if self.sender.send(event).is_err() {
            // No active subscribers; nothing to deliver.
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains a subscriber's receiver, logging a `SubscriberLagged`
/// diagnostic whenever the bounded buffer drops events out from under it.
pub async fn recv_with_lag_diagnostic(rx: &mut broadcast::Receiver<Event>) -> Option<Event> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "SubscriberLagged: subscriber fell behind event bus buffer");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
