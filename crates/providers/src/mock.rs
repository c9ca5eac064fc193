//! Scripted model clients for tests.
//!
//! Used across the workspace wherever a deterministic model backend is
//! needed: each call pops the next scripted outcome, and every request is
//! recorded so tests can assert on the prompts that were actually sent
//! (e.g., that correction feedback was threaded into the next attempt).

use async_trait::async_trait;
use deskhand_core::client::{Completion, GenerateRequest, ModelClient, TokenUsage};
use deskhand_core::error::UpstreamError;
use std::sync::Mutex;

/// A mock client that returns a sequence of scripted outcomes.
///
/// Each call to `generate` returns the next outcome in the script.
/// Panics if more calls are made than outcomes provided.
pub struct ScriptedClient {
    script: Mutex<Vec<Result<String, UpstreamError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedClient {
    /// Script of plain text responses.
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self::from_results(responses.into_iter().map(|s| Ok(s.into())).collect())
    }

    /// Script mixing successes and upstream failures.
    pub fn from_results(script: Vec<Result<String, UpstreamError>>) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Client that returns a single text response.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![text])
    }

    /// How many calls have been made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// All requests received, in call order.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<Completion, UpstreamError> {
        let mut requests = self.requests.lock().unwrap();
        let mut script = self.script.lock().unwrap();

        if requests.len() >= script.len() {
            panic!(
                "ScriptedClient: no more outcomes (call #{}, have {})",
                requests.len() + 1,
                script.len()
            );
        }

        let outcome = script[requests.len()].clone();
        requests.push(request);
        drop(script);

        outcome.map(|text| Completion {
            text,
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        })
    }
}

/// A client that fails every call with the same upstream error.
pub struct FailingClient {
    error: UpstreamError,
    calls: Mutex<usize>,
}

impl FailingClient {
    pub fn new(error: UpstreamError) -> Self {
        Self {
            error,
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ModelClient for FailingClient {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn generate(
        &self,
        _request: GenerateRequest,
    ) -> std::result::Result<Completion, UpstreamError> {
        *self.calls.lock().unwrap() += 1;
        Err(self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskhand_core::message::ChatMessage;

    #[tokio::test]
    async fn scripted_client_pops_in_order() {
        let client = ScriptedClient::new(vec!["first", "second"]);

        let req = GenerateRequest::new("m", vec![ChatMessage::user("q")]);
        let a = client.generate(req.clone()).await.unwrap();
        let b = client.generate(req).await.unwrap();

        assert_eq!(a.text, "first");
        assert_eq!(b.text, "second");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn scripted_client_records_requests() {
        let client = ScriptedClient::single_text("ok");
        let req = GenerateRequest::new("m", vec![ChatMessage::user("the question")]);
        client.generate(req).await.unwrap();

        let seen = client.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].messages[0].content, "the question");
    }

    #[tokio::test]
    async fn scripted_client_yields_errors() {
        let client = ScriptedClient::from_results(vec![
            Err(UpstreamError::EmptyResponse),
            Ok("recovered".into()),
        ]);
        let req = GenerateRequest::new("m", vec![ChatMessage::user("q")]);

        assert!(client.generate(req.clone()).await.is_err());
        assert_eq!(client.generate(req).await.unwrap().text, "recovered");
    }

    #[tokio::test]
    async fn failing_client_counts_calls() {
        let client = FailingClient::new(UpstreamError::Network("down".into()));
        let req = GenerateRequest::new("m", vec![ChatMessage::user("q")]);

        assert!(client.generate(req.clone()).await.is_err());
        assert!(client.generate(req).await.is_err());
        assert_eq!(client.call_count(), 2);
    }
}
