//! Capability traits for external collaborators.
//!
//! The core never talks to a concrete messenger, mailbox, or document store.
//! It calls these traits; implementations handle platform-specific connection
//! logic, formatting, and authentication. Test and headless deployments plug
//! in the no-op / in-memory implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IntegrationError, TransportError};
use crate::history::UserId;

/// Identifier of a delivered chat message, used for later edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound chat delivery.
///
/// Failures are logged by callers, not retried — a missed progress edit is
/// not worth a retry storm against a messenger API.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Deliver a message to a user. Returns an id usable with `edit`.
    async fn send(
        &self,
        user_id: &UserId,
        text: &str,
    ) -> std::result::Result<MessageId, TransportError>;

    /// Edit a previously delivered message in place.
    async fn edit(
        &self,
        message_id: &MessageId,
        text: &str,
    ) -> std::result::Result<(), TransportError>;
}

/// Lifecycle status of one workflow stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::Completed => "completed",
            StageStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Receives stage-level progress from the workflow coordinator.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Called after every stage transition.
    async fn update(&self, stage_key: &str, status: StageStatus);
}

/// A `ProgressSink` that discards all updates, for headless/test use.
#[derive(Debug, Default, Clone)]
pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn update(&self, _stage_key: &str, _status: StageStatus) {}
}

/// A half-open time window for data-source queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub since: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Window covering the last `days` days up to now.
    pub fn last_days(days: i64) -> Self {
        Self {
            since: Utc::now() - chrono::Duration::days(days),
            until: None,
        }
    }
}

/// One item returned by an external data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// An opaque searchable capability (e.g., mailbox search).
/// Consumed only inside a collect stage.
#[async_trait]
pub trait ExternalDataSource: Send + Sync {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        range: &TimeRange,
    ) -> std::result::Result<Vec<SourceItem>, IntegrationError>;
}

/// A page to be written to an external document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDraft {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// An opaque publishing capability (e.g., document-store write).
/// Consumed only inside a publish stage.
#[async_trait]
pub trait ExternalSink: Send + Sync {
    /// Create a page, returning its id.
    async fn create_page(
        &self,
        draft: &PageDraft,
    ) -> std::result::Result<String, IntegrationError>;
}
