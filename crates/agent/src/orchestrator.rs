//! The per-turn chat flow.
//!
//! A user turn arrives → the interaction log records it → the turn-budget
//! state machine decides whether this turn must finalize → prompt assembly
//! folds the prompt override and active history together → the primary
//! producer runs inside the retry engine → the result is appended back to
//! the log, compaction is applied if signaled, and the reply is handed to
//! the caller for delivery.
//!
//! Turns for one user are processed in arrival order: a new message waits
//! until the prior turn for the same user has finished validating. Turns for
//! different users run fully in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use deskhand_core::client::{Completion, TokenUsage};
use deskhand_core::error::UpstreamError;
use deskhand_core::history::{Direction, InteractionEvent, UserId};
use deskhand_core::message::ChatMessage;
use deskhand_history::InteractionLog;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::compactor::ContextCompactor;
use crate::engine::{CandidateSource, RetryEngine, RuleJudge, Verdict};
use crate::output::{parse_or_reformat, parse_structured, StructuredAgentOutput, TurnStatus};
use crate::producer::Producer;
use crate::session::{SessionStore, TurnDirective, TurnTransition};

/// Reply shown on total upstream failure. Never a stack trace, never raw
/// JSON.
const APOLOGY: &str =
    "Sorry — I couldn't produce a reliable answer right now. Please try again in a moment.";

/// The outcome of one handled turn.
#[derive(Debug, Clone)]
pub struct TurnReply {
    /// Text to deliver to the user.
    pub text: String,
    /// Delivered with a "final" marker (organic or forced).
    pub finalized: bool,
    /// Whether the answer came from structured output (false = degraded
    /// free-text mode).
    pub structured: bool,
    /// Token usage accumulated across this turn's model calls.
    pub usage: TokenUsage,
}

/// Produces one chat turn; correction feedback lands as an extra system
/// message on retry.
struct TurnSource<'a> {
    producer: &'a Producer,
    messages: Vec<ChatMessage>,
}

#[async_trait]
impl CandidateSource<Completion> for TurnSource<'_> {
    async fn produce(
        &self,
        prior_feedback: Option<&str>,
    ) -> std::result::Result<Completion, UpstreamError> {
        let mut messages = self.messages.clone();
        if let Some(feedback) = prior_feedback {
            messages.push(ChatMessage::system(format!(
                "Your previous answer was rejected: {feedback}. Produce a corrected answer."
            )));
        }
        self.producer.generate(messages).await
    }
}

/// Drives the full per-turn flow for every user.
pub struct ChatOrchestrator {
    primary: Arc<Producer>,
    log: Arc<InteractionLog>,
    sessions: Arc<SessionStore>,
    compactor: ContextCompactor,
    engine: RetryEngine,
    base_prompt: String,
    /// Per-user turn locks; guarantees arrival-order processing per user.
    turn_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl ChatOrchestrator {
    pub fn new(
        primary: Arc<Producer>,
        log: Arc<InteractionLog>,
        sessions: Arc<SessionStore>,
        engine: RetryEngine,
        base_prompt: impl Into<String>,
    ) -> Self {
        let compactor = ContextCompactor::new(log.clone(), sessions.clone());
        Self {
            primary,
            log,
            sessions,
            compactor,
            engine,
            base_prompt: base_prompt.into(),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Enter elicitation mode for a user. Returns the armed turn budget.
    pub async fn begin_elicitation(&self, user_id: &UserId, task: &str) -> u32 {
        let budget = self.sessions.begin_elicitation(user_id, task).await;
        self.log
            .append(InteractionEvent::new(
                user_id.clone(),
                Direction::SystemNote,
                format!("Entered elicitation mode: {task}"),
            ))
            .await;
        budget
    }

    /// Hard reset: forget session state and history for a user.
    /// Distinct from compaction — nothing is retained.
    pub async fn reset(&self, user_id: &UserId) {
        self.sessions.clear(user_id).await;
        self.log.reset(user_id).await;
        info!(user_id = %user_id, "User state reset");
    }

    /// Handle one inbound user message and produce the reply.
    pub async fn handle_message(&self, user_id: &UserId, text: &str) -> TurnReply {
        // Serialize turns per user; other users proceed in parallel.
        let lock = self.user_lock(user_id).await;
        let _turn = lock.lock().await;

        self.log
            .append(InteractionEvent::new(
                user_id.clone(),
                Direction::User,
                text,
            ))
            .await;

        let directive = self.sessions.directive(user_id).await;
        let mut usage = TokenUsage::default();

        let messages = self.assemble_prompt(user_id, &directive).await;
        let completion = self.produce_turn(messages, &mut usage).await;

        let (answer, status, structured, compacted_output) = match &directive {
            TurnDirective::Eliciting { .. } => {
                match parse_or_reformat(&completion.text, &self.primary).await {
                    Ok(output) => (
                        render_answer(&output),
                        output.status,
                        true,
                        Some(output),
                    ),
                    // Degraded mode: the raw text is the answer, verbatim.
                    Err(raw) => (raw, TurnStatus::Continue, false, None),
                }
            }
            TurnDirective::Plain => {
                // Plain chat answers are usually prose; only a strict parse
                // is attempted so compaction requests are still honored.
                match parse_structured(&completion.text) {
                    Some(output) => (render_answer(&output), output.status, true, Some(output)),
                    None => (completion.text.clone(), TurnStatus::Continue, false, None),
                }
            }
        };

        if let Some(output) = &compacted_output {
            self.compactor.apply(user_id, output).await;
        }

        let transition = self.sessions.record_turn(user_id, status).await;
        debug!(user_id = %user_id, ?transition, "Turn recorded");

        self.log
            .append(InteractionEvent::new(
                user_id.clone(),
                Direction::Assistant,
                answer.clone(),
            ))
            .await;

        match transition {
            TurnTransition::ForceFinalize => {
                let reply = self
                    .force_finalize(user_id, &directive, &mut usage)
                    .await;
                TurnReply { usage, ..reply }
            }
            TurnTransition::Finalized => TurnReply {
                text: answer,
                finalized: true,
                structured,
                usage,
            },
            TurnTransition::Continue { .. } | TurnTransition::NotEliciting => TurnReply {
                text: answer,
                finalized: false,
                structured,
                usage,
            },
        }
    }

    /// One additional producer call with an explicit finalize-now
    /// instruction. Its result is treated as final regardless of the
    /// model's own reported status.
    async fn force_finalize(
        &self,
        user_id: &UserId,
        directive: &TurnDirective,
        usage: &mut TokenUsage,
    ) -> TurnReply {
        let mut messages = self.assemble_prompt(user_id, directive).await;
        messages.push(ChatMessage::system(
            "The dialogue budget is exhausted. Finalize now: produce the complete \
             terminal answer from everything gathered so far, with status \"final\".",
        ));

        let completion = self.produce_turn(messages, usage).await;

        let (text, structured) = match parse_or_reformat(&completion.text, &self.primary).await {
            Ok(output) => {
                // A closing summary still lands in the prompt override.
                self.compactor.apply(user_id, &output).await;
                (render_answer(&output), true)
            }
            Err(raw) => (raw, false),
        };

        self.log
            .append(InteractionEvent::new(
                user_id.clone(),
                Direction::Assistant,
                text.clone(),
            ))
            .await;

        TurnReply {
            text,
            finalized: true,
            structured,
            usage: *usage,
        }
    }

    /// Run the primary producer inside the retry engine for one turn.
    /// An empty answer is rejected with feedback; total failure falls back
    /// to a human-readable apology.
    async fn produce_turn(&self, messages: Vec<ChatMessage>, usage: &mut TokenUsage) -> Completion {
        let source = TurnSource {
            producer: &self.primary,
            messages,
        };
        let judge = RuleJudge(|c: &Completion| {
            if c.text.trim().is_empty() {
                Verdict::fail("the answer was empty")
            } else {
                Verdict::pass()
            }
        });

        let outcome = self
            .engine
            .run(&source, &judge, || Completion {
                text: APOLOGY.into(),
                usage: None,
                model: "fallback".into(),
            })
            .await;

        if let Some(u) = outcome.value.usage {
            usage.add(u);
        }
        outcome.value
    }

    /// Build the effective prompt: base system prompt, elicitation framing,
    /// accelerate hint, compacted-context override, then active history.
    async fn assemble_prompt(
        &self,
        user_id: &UserId,
        directive: &TurnDirective,
    ) -> Vec<ChatMessage> {
        let mut system = self.base_prompt.clone();

        if let TurnDirective::Eliciting {
            task, accelerate, ..
        } = directive
        {
            system.push_str(&format!(
                "\n\nYou are eliciting the details needed to complete this task: {task}\n\
                 Ask for what is still missing, one focused question at a time. Respond with a \
                 single JSON object: {{\"title\": string, \"answer\": string, \
                 \"compressed_context\": string (optional), \"status\": \"continue\"|\"final\"}}. \
                 Report status \"final\" once the task is fully specified."
            ));
            if *accelerate {
                system.push_str(
                    "\n\nFew turns remain. Accelerate: combine remaining questions and prefer \
                     closing with a final answer.",
                );
            }
        }

        if let Some(override_text) = self.sessions.prompt_override(user_id).await {
            system.push_str(&format!(
                "\n\nCondensed context from earlier in this conversation:\n{override_text}"
            ));
        }

        let mut messages = vec![ChatMessage::system(system)];
        for event in self.log.get_active(user_id).await {
            let message = match event.direction {
                Direction::User => ChatMessage::user(event.content),
                Direction::Assistant => ChatMessage::assistant(event.content),
                Direction::SystemNote => ChatMessage::system(event.content),
            };
            messages.push(message);
        }
        messages
    }

    async fn user_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Render a structured output for delivery.
fn render_answer(output: &StructuredAgentOutput) -> String {
    if output.title.trim().is_empty() {
        output.answer.clone()
    } else {
        format!("{}\n\n{}", output.title.trim(), output.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskhand_providers::mock::{FailingClient, ScriptedClient};

    fn orchestrator_with(
        client: Arc<ScriptedClient>,
        budget: u32,
        max_attempts: u32,
    ) -> (ChatOrchestrator, Arc<InteractionLog>, Arc<SessionStore>) {
        let log = Arc::new(InteractionLog::new());
        let sessions = Arc::new(SessionStore::new(budget, 2));
        let primary = Arc::new(Producer::new("primary", client, "mock-model"));
        let orch = ChatOrchestrator::new(
            primary,
            log.clone(),
            sessions.clone(),
            RetryEngine::new(max_attempts),
            "You are deskhand, a careful assistant.",
        );
        (orch, log, sessions)
    }

    #[tokio::test]
    async fn plain_chat_turn() {
        let client = Arc::new(ScriptedClient::new(vec!["Hello! How can I help?"]));
        let (orch, log, _) = orchestrator_with(client.clone(), 15, 3);
        let user = UserId::new("u1");

        let reply = orch.handle_message(&user, "Hi there").await;

        assert_eq!(reply.text, "Hello! How can I help?");
        assert!(!reply.finalized);
        assert!(!reply.structured);
        assert_eq!(reply.usage.total_tokens, 15);

        let all = log.get_all(&user).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].direction, Direction::User);
        assert_eq!(all[1].direction, Direction::Assistant);
    }

    #[tokio::test]
    async fn history_flows_into_later_prompts() {
        let client = Arc::new(ScriptedClient::new(vec!["first reply", "second reply"]));
        let (orch, _, _) = orchestrator_with(client.clone(), 15, 3);
        let user = UserId::new("u1");

        orch.handle_message(&user, "first question").await;
        orch.handle_message(&user, "second question").await;

        let second_request = &client.requests()[1];
        let contents: Vec<&str> = second_request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert!(contents.contains(&"first question"));
        assert!(contents.contains(&"first reply"));
        assert!(contents.contains(&"second question"));
    }

    #[tokio::test]
    async fn budget_two_elicitation_forces_final_on_third_call() {
        let client = Arc::new(ScriptedClient::new(vec![
            r#"{"title": "Q1", "answer": "What platform?", "status": "continue"}"#,
            r#"{"title": "Q2", "answer": "What deadline?", "status": "continue"}"#,
            r#"{"title": "Spec", "answer": "Final specification.", "status": "continue"}"#,
        ]));
        let (orch, _, sessions) = orchestrator_with(client.clone(), 2, 3);
        let user = UserId::new("u1");

        orch.begin_elicitation(&user, "spec a web scraper").await;

        let first = orch.handle_message(&user, "I need a scraper").await;
        assert!(!first.finalized);

        let second = orch.handle_message(&user, "for product pages").await;
        // Budget exhausted: the forced call's result is final even though the
        // model itself reported "continue".
        assert!(second.finalized);
        assert!(second.text.contains("Final specification."));

        // Exactly 2 organic + 1 forced producer calls.
        assert_eq!(client.call_count(), 3);
        // Session cleared back to plain chat.
        assert!(!sessions.is_eliciting(&user).await);
    }

    #[tokio::test]
    async fn organic_final_ends_session() {
        let client = Arc::new(ScriptedClient::new(vec![
            r#"{"title": "Done", "answer": "Here is the full spec.", "status": "final"}"#,
        ]));
        let (orch, _, sessions) = orchestrator_with(client.clone(), 15, 3);
        let user = UserId::new("u1");

        orch.begin_elicitation(&user, "spec something").await;
        let reply = orch.handle_message(&user, "all the details up front").await;

        assert!(reply.finalized);
        assert!(reply.structured);
        assert_eq!(client.call_count(), 1);
        assert!(!sessions.is_eliciting(&user).await);
    }

    #[tokio::test]
    async fn forced_final_prompt_carries_finalize_instruction() {
        let client = Arc::new(ScriptedClient::new(vec![
            r#"{"answer": "q", "status": "continue"}"#,
            r#"{"answer": "done", "status": "final"}"#,
        ]));
        let (orch, _, _) = orchestrator_with(client.clone(), 1, 3);
        let user = UserId::new("u1");

        orch.begin_elicitation(&user, "task").await;
        orch.handle_message(&user, "go").await;

        let forced_request = &client.requests()[1];
        assert!(forced_request
            .messages
            .iter()
            .any(|m| m.content.contains("Finalize now")));
    }

    #[tokio::test]
    async fn compaction_signal_swaps_history_for_override() {
        let client = Arc::new(ScriptedClient::new(vec![
            r#"{"answer": "noted", "compressed_context": "user wants a rust cli", "status": "continue"}"#,
            r#"{"answer": "next", "status": "continue"}"#,
        ]));
        let (orch, log, sessions) = orchestrator_with(client.clone(), 15, 3);
        let user = UserId::new("u1");

        orch.begin_elicitation(&user, "task").await;
        orch.handle_message(&user, "long preamble").await;

        // History disabled except the assistant answer appended afterwards.
        let active = log.get_active(&user).await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].direction, Direction::Assistant);
        assert!(sessions.prompt_override(&user).await.unwrap().contains("rust cli"));

        // Next prompt carries the condensed context.
        orch.handle_message(&user, "continue").await;
        let system = &client.requests()[1].messages[0].content;
        assert!(system.contains("user wants a rust cli"));
    }

    #[tokio::test]
    async fn malformed_elicitation_output_degrades_to_raw_text() {
        let client = Arc::new(ScriptedClient::new(vec![
            "plain prose, not json",
            "reformat attempt, still not json",
        ]));
        let (orch, _, _) = orchestrator_with(client.clone(), 15, 3);
        let user = UserId::new("u1");

        orch.begin_elicitation(&user, "task").await;
        let reply = orch.handle_message(&user, "hello").await;

        // One organic call + one reformat pass, then the raw text verbatim.
        assert_eq!(client.call_count(), 2);
        assert!(!reply.structured);
        assert_eq!(reply.text, "plain prose, not json");
        assert!(!reply.finalized);
    }

    #[tokio::test]
    async fn empty_answer_is_retried_with_feedback() {
        let client = Arc::new(ScriptedClient::new(vec!["", "a real answer"]));
        let (orch, _, _) = orchestrator_with(client.clone(), 15, 3);
        let user = UserId::new("u1");

        let reply = orch.handle_message(&user, "hi").await;

        assert_eq!(reply.text, "a real answer");
        assert_eq!(client.call_count(), 2);
        let retry_request = &client.requests()[1];
        assert!(retry_request
            .messages
            .iter()
            .any(|m| m.content.contains("rejected")));
    }

    #[tokio::test]
    async fn total_upstream_failure_yields_apology() {
        let client = Arc::new(FailingClient::new(UpstreamError::Network("down".into())));
        let log = Arc::new(InteractionLog::new());
        let sessions = Arc::new(SessionStore::new(15, 2));
        let primary = Arc::new(Producer::new("primary", client.clone(), "mock-model"));
        let orch = ChatOrchestrator::new(
            primary,
            log,
            sessions,
            RetryEngine::new(3),
            "base prompt",
        );
        let user = UserId::new("u1");

        let reply = orch.handle_message(&user, "hi").await;

        assert_eq!(reply.text, APOLOGY);
        assert!(!reply.structured);
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn reset_forgets_history_and_session() {
        let client = Arc::new(ScriptedClient::new(vec![
            r#"{"answer": "noted", "compressed_context": "ctx", "status": "continue"}"#,
        ]));
        let (orch, log, sessions) = orchestrator_with(client, 15, 3);
        let user = UserId::new("u1");

        orch.begin_elicitation(&user, "task").await;
        orch.handle_message(&user, "hello").await;
        orch.reset(&user).await;

        assert!(log.get_all(&user).await.is_empty());
        assert!(sessions.prompt_override(&user).await.is_none());
        assert!(!sessions.is_eliciting(&user).await);
    }

    #[tokio::test]
    async fn accelerate_hint_lands_in_prompt_near_budget_end() {
        let client = Arc::new(ScriptedClient::new(vec![
            r#"{"answer": "q1", "status": "continue"}"#,
        ]));
        let (orch, _, _) = orchestrator_with(client.clone(), 2, 3);
        let user = UserId::new("u1");

        orch.begin_elicitation(&user, "task").await;
        orch.handle_message(&user, "go").await;

        // remaining == 2 at prompt time, threshold is 2.
        let system = &client.requests()[0].messages[0].content;
        assert!(system.contains("prefer closing"));
    }
}
