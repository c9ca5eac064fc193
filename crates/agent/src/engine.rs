//! The bounded retry–validate–correct engine.
//!
//! Every LLM-facing call site in the system has the same shape: try, check,
//! explain what's wrong, retry with that explanation folded into the next
//! prompt, and after a bounded number of attempts settle for a safe
//! fallback. Centralizing the loop here removes the ad-hoc retry code each
//! call site would otherwise grow, and makes the termination guarantee
//! (≤ `max_attempts` produce calls, always) hold in exactly one place.
//!
//! What differs per call site — what counts as valid, and what the safe
//! fallback is — comes in through the `CandidateSource` / `CandidateJudge`
//! traits and the fallback closure.

use async_trait::async_trait;
use deskhand_core::error::UpstreamError;
use tracing::{debug, warn};

/// A validator's judgement of one candidate.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub valid: bool,
    /// Actionable feedback when invalid; folded into the next produce call.
    pub feedback: String,
}

impl Verdict {
    /// The candidate is acceptable.
    pub fn pass() -> Self {
        Self {
            valid: true,
            feedback: String::new(),
        }
    }

    /// The candidate is rejected with actionable feedback.
    pub fn fail(feedback: impl Into<String>) -> Self {
        Self {
            valid: false,
            feedback: feedback.into(),
        }
    }

    /// The validator's own response could not be understood. Never treated
    /// as approval — unparseable judgement means the candidate is rejected.
    pub fn malformed() -> Self {
        Self::fail("malformed validator response")
    }
}

/// Produces one candidate per attempt. `prior_feedback` is the most recent
/// validator feedback, absent on the first attempt.
#[async_trait]
pub trait CandidateSource<T>: Send + Sync {
    async fn produce(
        &self,
        prior_feedback: Option<&str>,
    ) -> std::result::Result<T, UpstreamError>;
}

/// Judges one candidate. Infallible by construction: an LLM-backed judge
/// converts its own upstream or parse trouble into a failing `Verdict`.
#[async_trait]
pub trait CandidateJudge<T>: Send + Sync {
    async fn validate(&self, candidate: &T) -> Verdict;
}

/// A rule-based judge from a synchronous predicate.
pub struct RuleJudge<F>(pub F);

#[async_trait]
impl<T, F> CandidateJudge<T> for RuleJudge<F>
where
    T: Send + Sync,
    F: Fn(&T) -> Verdict + Send + Sync,
{
    async fn validate(&self, candidate: &T) -> Verdict {
        (self.0)(candidate)
    }
}

/// The result of one engine invocation. Transient — produced and consumed
/// within a single call, never persisted.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    /// The accepted candidate, or the fallback when `succeeded` is false.
    pub value: T,
    /// Produce calls actually made.
    pub attempts_used: u32,
    /// Whether a candidate passed validation within the budget.
    pub succeeded: bool,
    /// The most recent validator feedback, empty if none was ever given.
    pub last_validator_feedback: String,
}

/// The bounded retry loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryEngine {
    max_attempts: u32,
}

impl RetryEngine {
    /// Create an engine with the given attempt budget (min 1).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run the produce → validate → correct loop.
    ///
    /// - A produce-side `UpstreamError` consumes the attempt without new
    ///   feedback; the engine keeps retrying up to the budget.
    /// - A failing verdict's feedback is handed to the next produce call.
    /// - When the budget is exhausted, the configured fallback is returned
    ///   instead of propagating an error, so user-facing flows degrade
    ///   gracefully.
    pub async fn run<T, S, J, F>(&self, source: &S, judge: &J, fallback: F) -> RetryOutcome<T>
    where
        S: CandidateSource<T> + ?Sized,
        J: CandidateJudge<T> + ?Sized,
        F: FnOnce() -> T,
        T: Send + Sync,
    {
        let mut feedback = String::new();

        for attempt in 1..=self.max_attempts {
            let prior = if feedback.is_empty() {
                None
            } else {
                Some(feedback.as_str())
            };

            match source.produce(prior).await {
                Ok(candidate) => {
                    let verdict = judge.validate(&candidate).await;
                    if verdict.valid {
                        debug!(attempt, "Candidate accepted");
                        return RetryOutcome {
                            value: candidate,
                            attempts_used: attempt,
                            succeeded: true,
                            last_validator_feedback: feedback,
                        };
                    }
                    debug!(attempt, feedback = %verdict.feedback, "Candidate rejected");
                    feedback = verdict.feedback;
                }
                Err(e) => {
                    // Failed without feedback; the previous correction (if
                    // any) still stands for the next attempt.
                    warn!(attempt, error = %e, "Produce call failed");
                }
            }
        }

        warn!(
            attempts = self.max_attempts,
            "Retry budget exhausted, returning fallback"
        );
        RetryOutcome {
            value: fallback(),
            attempts_used: self.max_attempts,
            succeeded: false,
            last_validator_feedback: feedback,
        }
    }
}
