//! Role-labeled producers.
//!
//! A `Producer` wraps one model-calling client with a role label and fixed
//! sampling settings. Two producers are distinguished by role only — the
//! orchestrator routes validator calls to a "checker" producer backed by a
//! typically cheaper or stricter model, while "primary" generates candidates.

use std::sync::Arc;

use deskhand_core::client::{Completion, GenerateRequest, ModelClient};
use deskhand_core::error::UpstreamError;
use deskhand_core::message::ChatMessage;
use tracing::debug;

/// A named wrapper around one underlying model-calling client.
pub struct Producer {
    /// Routing label ("primary", "checker"). Naming convention only.
    role: String,

    /// The model backend.
    client: Arc<dyn ModelClient>,

    /// Model requested on every call.
    model: String,

    /// Sampling temperature.
    temperature: f32,

    /// Default max tokens per response.
    max_tokens: Option<u32>,
}

impl Producer {
    /// Create a producer with default sampling settings.
    pub fn new(
        role: impl Into<String>,
        client: Arc<dyn ModelClient>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            client,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// The routing label for this producer.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Generate a completion from role-tagged messages.
    ///
    /// Fails with `UpstreamError` on transport/auth/rate-limit trouble and
    /// with `UpstreamError::EmptyResponse` when the upstream returns zero
    /// usable choices. The caller (usually the retry engine) decides whether
    /// to spend another attempt.
    pub async fn generate(
        &self,
        messages: Vec<ChatMessage>,
    ) -> std::result::Result<Completion, UpstreamError> {
        debug!(
            role = %self.role,
            model = %self.model,
            messages = messages.len(),
            "Producer call"
        );

        let mut request = GenerateRequest::new(&self.model, messages);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        self.client.generate(request).await
    }
}
