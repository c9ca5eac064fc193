//! Structured agent output and the parse-or-reformat pipeline.
//!
//! Producers answer in free text that is *supposed* to be a JSON document.
//! Parsing is a two-stage pipeline: a strict parse of the raw text, then one
//! model-backed reformat attempt. Only after both fail does the output
//! degrade to unstructured free text — and that branch is explicit in the
//! return type, so callers handle it deliberately instead of silently
//! coercing.

use deskhand_core::value::FieldValue;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::producer::Producer;
use deskhand_core::message::ChatMessage;

/// Whether a multi-turn elicitation should keep going or conclude.
/// Only meaningful while elicitation mode is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    #[default]
    Continue,
    Final,
}

/// The structured form of a producer's answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredAgentOutput {
    /// Short heading for the answer
    #[serde(default)]
    pub title: String,

    /// The answer body delivered to the user
    pub answer: String,

    /// When present and non-empty, the producer is asking for compaction:
    /// replace active history with this condensed summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_context: Option<String>,

    /// Continue/final signal for the elicitation state machine
    #[serde(default)]
    pub status: TurnStatus,

    /// Validator metadata: problems found with a prior candidate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<FieldValue>,

    /// Validator metadata: what the producer should change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction_request: Option<FieldValue>,
}

impl StructuredAgentOutput {
    /// Whether this output signals compaction.
    pub fn wants_compaction(&self) -> bool {
        self.compressed_context
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }
}

/// Pull a JSON object out of model text: tolerate code fences and
/// surrounding prose, but require one top-level object.
pub(crate) fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();

    // Strip a ```json … ``` fence if present
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    let start = inner.find('{')?;
    let end = inner.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&inner[start..=end])
}

/// Strict parse of raw model text into `StructuredAgentOutput`.
pub fn parse_structured(raw: &str) -> Option<StructuredAgentOutput> {
    let json = extract_json(raw)?;
    serde_json::from_str(json).ok()
}

/// Two-stage parse: strict parse first, then one reformat pass through the
/// given producer, then give up and hand back the raw text.
///
/// The `Err` branch carries the original raw text verbatim — callers surface
/// it as a degraded-mode answer rather than discarding it.
pub async fn parse_or_reformat(
    raw: &str,
    reformatter: &Producer,
) -> std::result::Result<StructuredAgentOutput, String> {
    if let Some(parsed) = parse_structured(raw) {
        return Ok(parsed);
    }

    debug!("Strict parse failed, attempting one reformat pass");

    let prompt = format!(
        "Reformat the following answer as a single JSON object with fields \
         \"title\", \"answer\", \"compressed_context\" (optional), and \
         \"status\" (\"continue\" or \"final\"). Output only the JSON object.\n\n{raw}"
    );

    match reformatter.generate(vec![ChatMessage::system(prompt)]).await {
        Ok(completion) => match parse_structured(&completion.text) {
            Some(parsed) => Ok(parsed),
            None => Err(raw.to_string()),
        },
        // Reformat is best-effort; an upstream hiccup degrades to raw text.
        Err(_) => Err(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskhand_providers::mock::ScriptedClient;
    use std::sync::Arc;

    #[test]
    fn parses_plain_json() {
        let raw = r#"{"title": "Spec", "answer": "Looks good", "status": "final"}"#;
        let out = parse_structured(raw).unwrap();
        assert_eq!(out.title, "Spec");
        assert_eq!(out.status, TurnStatus::Final);
        assert!(!out.wants_compaction());
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let raw = "Here is the result:\n```json\n{\"answer\": \"ok\"}\n```";
        let out = parse_structured(raw).unwrap();
        assert_eq!(out.answer, "ok");
        assert_eq!(out.status, TurnStatus::Continue);
    }

    #[test]
    fn missing_status_defaults_to_continue() {
        let out = parse_structured(r#"{"answer": "partial"}"#).unwrap();
        assert_eq!(out.status, TurnStatus::Continue);
    }

    #[test]
    fn compaction_requires_nonempty_context() {
        let out = parse_structured(
            r#"{"answer": "a", "compressed_context": "   "}"#,
        )
        .unwrap();
        assert!(!out.wants_compaction());

        let out = parse_structured(
            r#"{"answer": "a", "compressed_context": "user wants a CLI tool"}"#,
        )
        .unwrap();
        assert!(out.wants_compaction());
    }

    #[test]
    fn issues_absorb_string_or_list() {
        let out = parse_structured(
            r#"{"answer": "a", "issues": ["no deadline", "no budget"]}"#,
        )
        .unwrap();
        assert_eq!(out.issues.unwrap().to_display_string(), "no deadline; no budget");

        let out = parse_structured(r#"{"answer": "a", "issues": "no deadline"}"#).unwrap();
        assert_eq!(out.issues.unwrap().to_display_string(), "no deadline");
    }

    #[tokio::test]
    async fn reformat_pass_recovers_structure() {
        let client = Arc::new(ScriptedClient::new(vec![
            r#"{"title": "T", "answer": "recovered", "status": "continue"}"#,
        ]));
        let reformatter = Producer::new("primary", client.clone(), "mock-model");

        let out = parse_or_reformat("not json at all", &reformatter)
            .await
            .unwrap();
        assert_eq!(out.answer, "recovered");
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn double_failure_degrades_to_raw_text() {
        let client = Arc::new(ScriptedClient::new(vec!["still not json"]));
        let reformatter = Producer::new("primary", client, "mock-model");

        let err = parse_or_reformat("the original prose answer", &reformatter)
            .await
            .unwrap_err();
        assert_eq!(err, "the original prose answer");
    }

    #[tokio::test]
    async fn structured_input_skips_reformat_call() {
        // Script is empty: any call would panic.
        let client = Arc::new(ScriptedClient::new(Vec::<String>::new()));
        let reformatter = Producer::new("primary", client.clone(), "mock-model");

        let out = parse_or_reformat(r#"{"answer": "direct"}"#, &reformatter)
            .await
            .unwrap();
        assert_eq!(out.answer, "direct");
        assert_eq!(client.call_count(), 0);
    }
}
