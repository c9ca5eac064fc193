//! Model backend implementations for deskhand.
//!
//! `OpenAiCompatClient` speaks the OpenAI `/v1/chat/completions` dialect,
//! which covers OpenAI itself plus the long tail of compatible endpoints
//! (OpenRouter, Ollama, vLLM, and friends). The `mock` module provides
//! scripted clients used by tests throughout the workspace.

mod openai_compat;
pub mod mock;

pub use openai_compat::OpenAiCompatClient;
