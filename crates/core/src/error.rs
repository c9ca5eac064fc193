//! Error types for the deskhand domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. LLM-shaped failures
//! (upstream hiccups, malformed output, failed validation) are recoverable by
//! the retry engine; only genuinely unexpected conditions propagate.

use thiserror::Error;

/// The top-level error type for all deskhand operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Upstream model errors ---
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    // --- Agent output errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Interaction history errors ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Chat transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- External source/sink errors ---
    #[error("Integration error: {0}")]
    Integration(#[from] IntegrationError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures calling an upstream model backend.
///
/// All variants are retryable inside the engine's attempt budget. The
/// `EmptyResponse` case (zero usable choices) is its own variant but consumes
/// an attempt exactly like a transport failure.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by upstream, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned no usable choices")]
    EmptyResponse,
}

/// Failures shaping or judging agent output.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// Output could not be parsed into the expected structured schema, even
    /// after one reformat attempt. The raw text travels with the error so
    /// callers can surface it as a degraded-mode answer.
    #[error("Malformed output: could not parse structured response")]
    MalformedOutput { raw_text: String },

    /// A validator explicitly rejected a candidate. Non-exceptional: drives
    /// the correction branch of the retry engine.
    #[error("Validation failed: {feedback}")]
    ValidationFailure { feedback: String },

    /// All attempts consumed without a valid candidate. Resolved via the
    /// configured fallback for user-facing flows.
    #[error("Retry budget exhausted after {attempts} attempts")]
    BudgetExhausted { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Replay failed: {0}")]
    ReplayFailed(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {user_id}: {reason}")]
    DeliveryFailed { user_id: String, reason: String },

    #[error("Message edit failed for {message_id}: {reason}")]
    EditFailed { message_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),
}

impl UpstreamError {
    /// Whether the retry engine may spend another attempt on this failure.
    /// Currently every upstream failure is retryable; authentication errors
    /// will keep failing but the attempt budget bounds the damage.
    pub fn is_retryable(&self) -> bool {
        true
    }
}
