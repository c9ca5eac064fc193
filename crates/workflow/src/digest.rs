//! The document-summary ("digest") pipeline.
//!
//! Collect → summarize → publish, with a query-generation stage up front.
//! Every stage runs inside its own retry/validate loop: queries and
//! summaries are judged by the checker producer, collection and publishing
//! by structural checks. Publishing is the only non-recoverable stage — a
//! digest that cannot land in the document store fails the run, while an
//! empty collection or a rejected summary degrades to a safe fallback and
//! the run carries on.

use async_trait::async_trait;
use deskhand_agent::engine::{CandidateSource, RetryEngine, RetryOutcome, RuleJudge, Verdict};
use deskhand_agent::judge::LlmJudge;
use deskhand_agent::producer::Producer;
use deskhand_core::error::UpstreamError;
use deskhand_core::interfaces::{
    ExternalDataSource, ExternalSink, PageDraft, ProgressSink, SourceItem, TimeRange,
};
use deskhand_core::message::ChatMessage;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::coordinator::{Stage, WorkflowCoordinator};

/// Settings shared by the digest stages.
#[derive(Debug, Clone)]
pub struct DigestSettings {
    /// Retry budget per stage.
    pub max_attempts: u32,
    /// Maximum items fetched by the collect stage.
    pub collect_limit: usize,
    /// Initial lookback window in days; widened when collection comes back
    /// empty.
    pub lookback_days: i64,
    /// Parent page for published digests.
    pub publish_parent_id: Option<String>,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            collect_limit: 50,
            lookback_days: 7,
            publish_parent_id: None,
        }
    }
}

/// Wire the four digest stages into a coordinator.
pub fn digest_pipeline(
    primary: Arc<Producer>,
    checker: Arc<Producer>,
    source: Arc<dyn ExternalDataSource>,
    sink: Arc<dyn ExternalSink>,
    progress: Arc<dyn ProgressSink>,
    settings: DigestSettings,
) -> WorkflowCoordinator {
    let engine = RetryEngine::new(settings.max_attempts);
    WorkflowCoordinator::new(progress)
        .add_stage(Arc::new(QueryStage {
            engine,
            primary: primary.clone(),
            checker: checker.clone(),
        }))
        .add_stage(Arc::new(CollectStage {
            engine,
            source,
            limit: settings.collect_limit,
            lookback_days: settings.lookback_days,
        }))
        .add_stage(Arc::new(SummarizeStage {
            engine,
            primary,
            checker,
        }))
        .add_stage(Arc::new(PublishStage {
            engine,
            sink,
            parent_id: settings.publish_parent_id,
        }))
}

fn map_value<T>(outcome: RetryOutcome<T>, f: impl FnOnce(&T) -> Value) -> RetryOutcome<Value> {
    RetryOutcome {
        value: f(&outcome.value),
        attempts_used: outcome.attempts_used,
        succeeded: outcome.succeeded,
        last_validator_feedback: outcome.last_validator_feedback,
    }
}

fn topic_of(input: &Value) -> String {
    input
        .get("topic")
        .and_then(Value::as_str)
        .unwrap_or("recent items")
        .to_string()
}

// ── Query generation ────────────────────────────────────────────────────────

/// Generates the search query for the collect stage, judged by the checker.
pub struct QueryStage {
    pub(crate) engine: RetryEngine,
    pub(crate) primary: Arc<Producer>,
    pub(crate) checker: Arc<Producer>,
}

struct QuerySource<'a> {
    producer: &'a Producer,
    topic: &'a str,
}

#[async_trait]
impl CandidateSource<String> for QuerySource<'_> {
    async fn produce(&self, prior_feedback: Option<&str>) -> Result<String, UpstreamError> {
        let mut messages = vec![ChatMessage::system(format!(
            "Write one search query for a mailbox search. Topic: {}. \
             Use concrete terms and restrict the time window. \
             Output only the query.",
            self.topic
        ))];
        if let Some(feedback) = prior_feedback {
            messages.push(ChatMessage::system(format!(
                "The previous query was rejected: {feedback}. Write a corrected query."
            )));
        }
        let completion = self.producer.generate(messages).await?;
        Ok(completion.text.trim().to_string())
    }
}

#[async_trait]
impl Stage for QueryStage {
    fn key(&self) -> &str {
        "query"
    }

    async fn run(&self, input: &Value) -> RetryOutcome<Value> {
        let topic = topic_of(input);
        let source = QuerySource {
            producer: &self.primary,
            topic: &topic,
        };
        let judge = LlmJudge::new(
            self.checker.clone(),
            "the query must contain concrete search terms and restrict the time window",
            |q: &String| q.clone(),
        );

        let outcome = self
            .engine
            .run(&source, &judge, || format!("{topic} newer_than:7d"))
            .await;

        map_value(outcome, |query| json!({ "topic": topic, "query": query }))
    }
}

// ── Collection ──────────────────────────────────────────────────────────────

/// Fetches items from the external data source, widening the time window on
/// every rejected (empty) attempt.
pub struct CollectStage {
    pub(crate) engine: RetryEngine,
    pub(crate) source: Arc<dyn ExternalDataSource>,
    pub(crate) limit: usize,
    pub(crate) lookback_days: i64,
}

struct SearchSource<'a> {
    inner: &'a dyn ExternalDataSource,
    query: &'a str,
    limit: usize,
    base_days: i64,
    widenings: AtomicU32,
}

#[async_trait]
impl CandidateSource<Vec<SourceItem>> for SearchSource<'_> {
    async fn produce(
        &self,
        prior_feedback: Option<&str>,
    ) -> Result<Vec<SourceItem>, UpstreamError> {
        let factor = if prior_feedback.is_some() {
            self.widenings.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            0
        };
        let days = self.base_days << factor.min(6);
        let range = TimeRange::last_days(days);

        self.inner
            .search(self.query, self.limit, &range)
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))
    }
}

#[async_trait]
impl Stage for CollectStage {
    fn key(&self) -> &str {
        "collect"
    }

    async fn run(&self, input: &Value) -> RetryOutcome<Value> {
        let topic = topic_of(input);
        let query = input
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or(&topic)
            .to_string();

        let source = SearchSource {
            inner: self.source.as_ref(),
            query: &query,
            limit: self.limit,
            base_days: self.lookback_days.max(1),
            widenings: AtomicU32::new(0),
        };
        let judge = RuleJudge(|items: &Vec<SourceItem>| {
            if items.is_empty() {
                Verdict::fail("no items in the window; widen the time range")
            } else {
                Verdict::pass()
            }
        });

        let outcome = self.engine.run(&source, &judge, Vec::new).await;

        map_value(outcome, |items| {
            json!({ "topic": topic, "query": query, "items": items })
        })
    }
}

// ── Summarization ───────────────────────────────────────────────────────────

/// Turns collected items into a digest, judged by the checker. Falls back to
/// a plain listing when no acceptable summary emerges.
pub struct SummarizeStage {
    pub(crate) engine: RetryEngine,
    pub(crate) primary: Arc<Producer>,
    pub(crate) checker: Arc<Producer>,
}

struct SummarySource<'a> {
    producer: &'a Producer,
    topic: &'a str,
    items_text: &'a str,
}

#[async_trait]
impl CandidateSource<String> for SummarySource<'_> {
    async fn produce(&self, prior_feedback: Option<&str>) -> Result<String, UpstreamError> {
        let mut messages = vec![
            ChatMessage::system(format!(
                "Summarize the collected items below into a concise digest about \
                 \"{}\". Cover every item; do not invent facts.",
                self.topic
            )),
            ChatMessage::user(self.items_text.to_string()),
        ];
        if let Some(feedback) = prior_feedback {
            messages.push(ChatMessage::system(format!(
                "The previous summary was rejected: {feedback}. Write a corrected summary."
            )));
        }
        let completion = self.producer.generate(messages).await?;
        Ok(completion.text.trim().to_string())
    }
}

fn fallback_listing(items: &[SourceItem]) -> String {
    if items.is_empty() {
        return "No items were found for this digest.".into();
    }
    items
        .iter()
        .map(|i| format!("- {} ({})", i.title, i.received_at.format("%Y-%m-%d")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Stage for SummarizeStage {
    fn key(&self) -> &str {
        "summarize"
    }

    async fn run(&self, input: &Value) -> RetryOutcome<Value> {
        let topic = topic_of(input);
        let items: Vec<SourceItem> = input
            .get("items")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let items_text = items
            .iter()
            .map(|i| format!("## {} ({})\n{}", i.title, i.received_at, i.body))
            .collect::<Vec<_>>()
            .join("\n\n");

        let source = SummarySource {
            producer: &self.primary,
            topic: &topic,
            items_text: &items_text,
        };
        let judge = LlmJudge::new(
            self.checker.clone(),
            "the summary must be concise, cover the collected items, and contain \
             no fabricated facts",
            |s: &String| s.clone(),
        );

        let outcome = self
            .engine
            .run(&source, &judge, || fallback_listing(&items))
            .await;

        map_value(outcome, |summary| {
            json!({
                "topic": topic,
                "title": format!("Digest: {topic}"),
                "summary": summary,
                "item_count": items.len(),
            })
        })
    }
}

// ── Publishing ──────────────────────────────────────────────────────────────

/// Writes the digest to the external sink. Non-recoverable: a digest that
/// cannot be published fails the run.
pub struct PublishStage {
    pub(crate) engine: RetryEngine,
    pub(crate) sink: Arc<dyn ExternalSink>,
    pub(crate) parent_id: Option<String>,
}

struct PublishSource<'a> {
    sink: &'a dyn ExternalSink,
    draft: &'a PageDraft,
}

#[async_trait]
impl CandidateSource<String> for PublishSource<'_> {
    async fn produce(&self, _prior_feedback: Option<&str>) -> Result<String, UpstreamError> {
        self.sink
            .create_page(self.draft)
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))
    }
}

#[async_trait]
impl Stage for PublishStage {
    fn key(&self) -> &str {
        "publish"
    }

    fn recoverable(&self) -> bool {
        false
    }

    async fn run(&self, input: &Value) -> RetryOutcome<Value> {
        let title = input
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Digest")
            .to_string();
        let content = input
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let draft = PageDraft {
            title: title.clone(),
            content,
            parent_id: self.parent_id.clone(),
            tags: vec!["digest".into()],
        };

        let source = PublishSource {
            sink: self.sink.as_ref(),
            draft: &draft,
        };
        let judge = RuleJudge(|page_id: &String| {
            if page_id.trim().is_empty() {
                Verdict::fail("sink returned an empty page id")
            } else {
                Verdict::pass()
            }
        });

        let outcome = self.engine.run(&source, &judge, String::new).await;

        map_value(outcome, |page_id| {
            json!({ "page_id": page_id, "title": title })
        })
    }
}
