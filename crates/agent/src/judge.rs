//! LLM-backed candidate judging.
//!
//! An `LlmJudge` routes validation to a checker producer and parses its
//! reply into a `Verdict`. Fail-safe throughout: a checker reply that cannot
//! be parsed, and a checker call that fails upstream, both reject the
//! candidate — unparseable judgement is never approval.

use async_trait::async_trait;
use deskhand_core::message::ChatMessage;
use deskhand_core::value::FieldValue;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::engine::{CandidateJudge, Verdict};
use crate::output::extract_json;
use crate::producer::Producer;

/// The reply shape expected from a checker model. `feedback` and `issues`
/// arrive as a string one call and a list the next; `FieldValue` absorbs
/// both.
#[derive(Debug, Deserialize)]
struct CheckerReply {
    valid: bool,
    #[serde(default)]
    feedback: Option<FieldValue>,
    #[serde(default)]
    issues: Option<FieldValue>,
}

/// A judge backed by a checker producer.
pub struct LlmJudge<T> {
    checker: Arc<Producer>,
    /// What counts as valid, stated for the checker model.
    criteria: String,
    /// Renders a candidate into text the checker can inspect.
    render: Box<dyn Fn(&T) -> String + Send + Sync>,
}

impl<T> LlmJudge<T> {
    pub fn new(
        checker: Arc<Producer>,
        criteria: impl Into<String>,
        render: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            checker,
            criteria: criteria.into(),
            render: Box::new(render),
        }
    }

    fn prompt(&self, candidate_text: &str) -> Vec<ChatMessage> {
        let system = format!(
            "You are a strict validator. Criteria:\n{}\n\n\
             Respond with a single JSON object: \
             {{\"valid\": true|false, \"feedback\": \"what must change\"}}. \
             Output only the JSON object.",
            self.criteria
        );
        vec![
            ChatMessage::system(system),
            ChatMessage::user(format!("Candidate to validate:\n{candidate_text}")),
        ]
    }
}

#[async_trait]
impl<T: Send + Sync> CandidateJudge<T> for LlmJudge<T> {
    async fn validate(&self, candidate: &T) -> Verdict {
        let candidate_text = (self.render)(candidate);

        let completion = match self.checker.generate(self.prompt(&candidate_text)).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Checker call failed, rejecting candidate");
                return Verdict::fail(format!("validator unavailable: {e}"));
            }
        };

        let Some(json) = extract_json(&completion.text) else {
            return Verdict::malformed();
        };

        match serde_json::from_str::<CheckerReply>(json) {
            Ok(reply) if reply.valid => Verdict::pass(),
            Ok(reply) => {
                let feedback = reply
                    .feedback
                    .filter(|f| !f.is_empty())
                    .or(reply.issues)
                    .filter(|f| !f.is_empty())
                    .map(|f| f.to_display_string())
                    .unwrap_or_else(|| "candidate rejected without detail".into());
                Verdict::fail(feedback)
            }
            Err(_) => Verdict::malformed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskhand_core::error::UpstreamError;
    use deskhand_providers::mock::{FailingClient, ScriptedClient};

    fn judge_with(client: Arc<ScriptedClient>) -> LlmJudge<String> {
        let checker = Arc::new(Producer::new("checker", client, "mock-checker"));
        LlmJudge::new(checker, "query must name a time range", |c: &String| c.clone())
    }

    #[tokio::test]
    async fn valid_reply_passes() {
        let client = Arc::new(ScriptedClient::new(vec![r#"{"valid": true}"#]));
        let judge = judge_with(client);

        let verdict = judge.validate(&"last 7 days of invoices".to_string()).await;
        assert!(verdict.valid);
    }

    #[tokio::test]
    async fn invalid_reply_carries_feedback() {
        let client = Arc::new(ScriptedClient::new(vec![
            r#"{"valid": false, "feedback": "missing time range"}"#,
        ]));
        let judge = judge_with(client);

        let verdict = judge.validate(&"all invoices".to_string()).await;
        assert!(!verdict.valid);
        assert_eq!(verdict.feedback, "missing time range");
    }

    #[tokio::test]
    async fn list_feedback_is_joined() {
        let client = Arc::new(ScriptedClient::new(vec![
            r#"{"valid": false, "issues": ["no sender", "no date"]}"#,
        ]));
        let judge = judge_with(client);

        let verdict = judge.validate(&"query".to_string()).await;
        assert_eq!(verdict.feedback, "no sender; no date");
    }

    #[tokio::test]
    async fn unparseable_reply_is_rejection_not_approval() {
        let client = Arc::new(ScriptedClient::new(vec!["looks fine to me!"]));
        let judge = judge_with(client);

        let verdict = judge.validate(&"query".to_string()).await;
        assert!(!verdict.valid);
        assert!(verdict.feedback.contains("malformed"));
    }

    #[tokio::test]
    async fn checker_upstream_failure_rejects() {
        let client = Arc::new(FailingClient::new(UpstreamError::Timeout("slow".into())));
        let checker = Arc::new(Producer::new("checker", client, "mock-checker"));
        let judge: LlmJudge<String> =
            LlmJudge::new(checker, "criteria", |c: &String| c.clone());

        let verdict = judge.validate(&"query".to_string()).await;
        assert!(!verdict.valid);
        assert!(verdict.feedback.contains("validator unavailable"));
    }

    #[tokio::test]
    async fn checker_sees_criteria_and_candidate() {
        let client = Arc::new(ScriptedClient::new(vec![r#"{"valid": true}"#]));
        let judge = judge_with(client.clone());

        judge.validate(&"the candidate text".to_string()).await;

        let req = &client.requests()[0];
        assert!(req.messages[0].content.contains("time range"));
        assert!(req.messages[1].content.contains("the candidate text"));
    }
}
