//! # Deskhand Agent
//!
//! The validated-generation core: role-labeled producers over a model
//! backend, the bounded retry–validate–correct engine every call site shares,
//! the turn-budgeted elicitation state machine, and the context compactor
//! that swaps raw history for a condensed summary.
//!
//! The `orchestrator` module ties these together into the per-turn chat flow.

pub mod compactor;
pub mod engine;
pub mod judge;
pub mod orchestrator;
pub mod output;
pub mod producer;
pub mod session;

pub use compactor::ContextCompactor;
pub use engine::{CandidateJudge, CandidateSource, RetryEngine, RetryOutcome, RuleJudge, Verdict};
pub use judge::LlmJudge;
pub use orchestrator::{ChatOrchestrator, TurnReply};
pub use output::{parse_or_reformat, StructuredAgentOutput, TurnStatus};
pub use producer::Producer;
pub use session::{SessionStore, TurnDirective, TurnTransition};
