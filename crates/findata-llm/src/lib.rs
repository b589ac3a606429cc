//! Chat-completion client abstraction for findata-rs
//!
//! This crate provides provider-agnostic abstractions for the text-completion
//! service that authors the data-fetch scripts. It includes:
//!
//! - Message types for chat-style turns
//! - Completion request/response types (with chunked streaming)
//! - Provider trait for completion backends
//! - An OpenAI-compatible HTTP provider (DeepSeek, OpenAI, local gateways)

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;
pub mod providers;

// Re-export main types
pub use completion::{
    CompletionChunk, CompletionRequest, CompletionResponse, TokenUsage,
};
pub use error::{LLMError, Result};
pub use messages::{Message, Role};
pub use provider::{ChunkStream, LLMProvider};
pub use providers::{OpenAIConfig, OpenAIProvider};
