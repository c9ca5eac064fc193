//! Context compaction.
//!
//! When a producer's structured answer carries `compressed_context`, the
//! compactor swaps the user's memory representation: the condensed summary
//! is folded into the per-user system-prompt override, and every existing
//! history event is disabled. On the next turn, prompt assembly sees no
//! prior turns but the system prompt carries a condensed memory of them.
//! The raw log stays available for audit via `get_all` — compaction never
//! deletes data.

use deskhand_core::history::UserId;
use deskhand_history::InteractionLog;
use std::sync::Arc;
use tracing::info;

use crate::output::StructuredAgentOutput;
use crate::session::SessionStore;

/// Applies compaction signals from structured output.
pub struct ContextCompactor {
    log: Arc<InteractionLog>,
    sessions: Arc<SessionStore>,
}

impl ContextCompactor {
    pub fn new(log: Arc<InteractionLog>, sessions: Arc<SessionStore>) -> Self {
        Self { log, sessions }
    }

    /// Fold the output's compressed context into the user's prompt override
    /// and disable all existing history. Returns whether compaction ran.
    ///
    /// A repeated identical summary is not appended twice, but the history
    /// disable still happens — the producer asked for compaction either way.
    pub async fn apply(&self, user_id: &UserId, output: &StructuredAgentOutput) -> bool {
        let Some(context) = output.compressed_context.as_deref() else {
            return false;
        };
        if context.trim().is_empty() {
            return false;
        }

        let appended = self.sessions.append_override(user_id, context).await;
        self.log.disable_all(user_id).await;

        info!(
            user_id = %user_id,
            appended,
            "Context compacted: history disabled, summary folded into prompt"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskhand_core::history::{Direction, InteractionEvent};

    fn output_with_context(ctx: Option<&str>) -> StructuredAgentOutput {
        StructuredAgentOutput {
            answer: "answer".into(),
            compressed_context: ctx.map(str::to_string),
            ..Default::default()
        }
    }

    async fn seeded(user: &UserId) -> (Arc<InteractionLog>, Arc<SessionStore>, ContextCompactor) {
        let log = Arc::new(InteractionLog::new());
        let sessions = Arc::new(SessionStore::new(15, 2));
        log.append(InteractionEvent::new(user.clone(), Direction::User, "q1"))
            .await;
        log.append(InteractionEvent::new(user.clone(), Direction::Assistant, "a1"))
            .await;
        let compactor = ContextCompactor::new(log.clone(), sessions.clone());
        (log, sessions, compactor)
    }

    #[tokio::test]
    async fn compaction_swaps_memory_representation() {
        let user = UserId::new("u1");
        let (log, sessions, compactor) = seeded(&user).await;

        let ran = compactor
            .apply(&user, &output_with_context(Some("user is building a CLI")))
            .await;

        assert!(ran);
        assert!(log.get_active(&user).await.is_empty());
        assert_eq!(log.get_all(&user).await.len(), 2);
        assert_eq!(
            sessions.prompt_override(&user).await.unwrap(),
            "user is building a CLI"
        );
    }

    #[tokio::test]
    async fn absent_context_means_no_compaction() {
        let user = UserId::new("u1");
        let (log, sessions, compactor) = seeded(&user).await;

        assert!(!compactor.apply(&user, &output_with_context(None)).await);
        assert!(!compactor.apply(&user, &output_with_context(Some("  "))).await);

        assert_eq!(log.get_active(&user).await.len(), 2);
        assert!(sessions.prompt_override(&user).await.is_none());
    }

    #[tokio::test]
    async fn repeated_summary_disables_history_but_appends_once() {
        let user = UserId::new("u1");
        let (log, sessions, compactor) = seeded(&user).await;

        compactor
            .apply(&user, &output_with_context(Some("summary")))
            .await;

        // New turn lands, identical summary arrives again.
        log.append(InteractionEvent::new(user.clone(), Direction::User, "q2"))
            .await;
        compactor
            .apply(&user, &output_with_context(Some("summary")))
            .await;

        assert!(log.get_active(&user).await.is_empty());
        assert_eq!(
            sessions.prompt_override(&user).await.unwrap(),
            "summary"
        );
    }
}
