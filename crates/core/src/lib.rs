//! # Deskhand Core
//!
//! Domain types, traits, and error definitions for the deskhand assistant
//! runtime. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model backend, chat transport, data source,
//! publish sink, progress reporting) is defined as a trait here.
//! Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod client;
pub mod error;
pub mod history;
pub mod interfaces;
pub mod message;
pub mod value;

// Re-export key types at crate root for ergonomics
pub use client::{Completion, GenerateRequest, ModelClient, TokenUsage};
pub use error::{Error, Result, UpstreamError};
pub use history::{Direction, InteractionEvent, UserId};
pub use interfaces::{
    ChatTransport, ExternalDataSource, ExternalSink, MessageId, NoopProgress, PageDraft,
    ProgressSink, SourceItem, StageStatus, TimeRange,
};
pub use message::{ChatMessage, MessageRole};
pub use value::FieldValue;
