//! Progress reporting over a chat transport.
//!
//! Long multi-stage workflows run detached from the triggering request; the
//! user watches progress through edits to a previously sent status message.
//! Delivery failures are logged and never retried — a missed edit is not
//! worth a retry storm against a messenger API.

use async_trait::async_trait;
use deskhand_core::history::UserId;
use deskhand_core::interfaces::{ChatTransport, MessageId, ProgressSink, StageStatus};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// A `ProgressSink` that renders stage statuses into one chat message and
/// keeps editing it in place.
pub struct TransportProgress {
    transport: Arc<dyn ChatTransport>,
    user_id: UserId,
    state: Mutex<ProgressState>,
}

#[derive(Default)]
struct ProgressState {
    /// Stage statuses in first-seen order.
    stages: Vec<(String, StageStatus)>,
    /// The delivered status message, once sent.
    message_id: Option<MessageId>,
}

impl TransportProgress {
    pub fn new(transport: Arc<dyn ChatTransport>, user_id: UserId) -> Self {
        Self {
            transport,
            user_id,
            state: Mutex::new(ProgressState::default()),
        }
    }

    fn render(stages: &[(String, StageStatus)]) -> String {
        let mut text = String::from("Workflow progress:\n");
        for (key, status) in stages {
            let marker = match status {
                StageStatus::Pending => "○",
                StageStatus::InProgress => "◐",
                StageStatus::Completed => "●",
                StageStatus::Error => "✗",
            };
            text.push_str(&format!("{marker} {key} — {status}\n"));
        }
        text
    }
}

#[async_trait]
impl ProgressSink for TransportProgress {
    async fn update(&self, stage_key: &str, status: StageStatus) {
        let mut state = self.state.lock().await;

        match state.stages.iter_mut().find(|(key, _)| key == stage_key) {
            Some(entry) => entry.1 = status,
            None => state.stages.push((stage_key.to_string(), status)),
        }

        let text = Self::render(&state.stages);

        match &state.message_id {
            Some(id) => {
                if let Err(e) = self.transport.edit(id, &text).await {
                    warn!(error = %e, "Progress edit failed");
                }
            }
            None => match self.transport.send(&self.user_id, &text).await {
                Ok(id) => state.message_id = Some(id),
                Err(e) => warn!(error = %e, "Progress message delivery failed"),
            },
        }
    }
}
